//! Provider call abstraction.
//!
//! The resilient executor never talks to a provider SDK directly. Each
//! provider is reached through an [`Executor`] registered under its name, and
//! every failure is reduced to an [`ErrorKind`].

use crate::registry::ModelDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Failure taxonomy shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid registry or policy data
    Config,
    /// Bad input to the call
    Validation,
    /// Credential failure
    Auth,
    RateLimit,
    Timeout,
    Transient,
    /// Unclassified failure, treated as non-retryable
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Config,
        ErrorKind::Validation,
        ErrorKind::Auth,
        ErrorKind::RateLimit,
        ErrorKind::Timeout,
        ErrorKind::Transient,
        ErrorKind::Unknown,
    ];

    /// Whether a failure of this kind may ever be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Timeout | ErrorKind::Transient
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// What is sent to a provider for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Output token cap, already clamped to the model's limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whether extended thinking should be enabled
    #[serde(default)]
    pub thinking: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Successful provider output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: TokenUsage,
}

impl ProviderResponse {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// A failed provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-suggested wait before the next attempt (rate limits)
    pub retry_after: Option<Duration>,
    /// Tokens consumed before the failure, if the provider reported any
    pub usage: Option<TokenUsage>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            usage: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ErrorKind::RateLimit, message)
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Performs a single call against one provider.
///
/// Implementations map their transport failures onto [`ErrorKind`]. A call
/// that exceeds its own deadline should return [`ErrorKind::Timeout`].
///
/// # Object Safety
///
/// Used as `Arc<dyn Executor>`, keyed by provider name.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn call(
        &self,
        model: &ModelDescriptor,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError>;
}
