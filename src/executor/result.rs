//! Execution outcome types.

use super::provider::{ErrorKind, TokenUsage};
use crate::classifier::TaskRequirements;
use crate::registry::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a fallback step was passed over without calling the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The circuit for (provider, tier) is open
    CircuitOpen,
    /// No executor is registered for the provider
    NoExecutor,
    /// The registry no longer has a model for (provider, tier)
    ModelUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::CircuitOpen => f.write_str("circuit open"),
            SkipReason::NoExecutor => f.write_str("no executor"),
            SkipReason::ModelUnavailable => f.write_str("model unavailable"),
        }
    }
}

/// One attempt (or skipped step) within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttemptRecord {
    pub execution_id: Uuid,
    pub provider: String,
    pub tier: Tier,
    pub model_id: String,
    /// Position of the step in the fallback chain (0 = primary)
    pub step_index: usize,
    /// 1-based call number within the step (0 for skipped steps)
    pub attempt_number: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub is_fallback: bool,
    pub latency_ms: u64,
    pub usage: TokenUsage,
    /// Estimated USD cost at this model's prices
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionAttemptRecord {
    /// Whether the provider was actually called.
    pub fn was_called(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Why an execution produced no output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionError {
    /// Every step was skipped; no provider was called
    #[error("no available providers for chain {chain}")]
    NoAvailableProviders { chain: String },

    /// Every step that was called failed
    #[error("all fallback steps failed; last error from {provider}:{tier}: {kind} error: {message}")]
    Exhausted {
        provider: String,
        tier: Tier,
        kind: ErrorKind,
        message: String,
    },

    /// No fallback policy could be resolved for the request
    #[error("no fallback policy: {message}")]
    Policy { message: String },

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution deadline exceeded")]
    DeadlineExceeded,
}

impl ExecutionError {
    /// Error kind of the last provider failure, if one was observed.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionError::Exhausted { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// The single structured outcome of `ResilientExecutor::execute`.
///
/// Failure is a normal outcome: check `success` rather than expecting an
/// `Err` for an exhausted chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub task_type: String,
    pub requirements: TaskRequirements,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub attempts: Vec<ExecutionAttemptRecord>,
    /// Sum of every attempt's cost, failed ones included
    pub total_cost: f64,
    pub total_usage: TokenUsage,
    pub fallback_used: bool,
    /// Name of the policy that was followed
    pub policy: String,
    /// Chain as `provider:tier -> provider:tier`
    pub fallback_chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Number of underlying provider calls made.
    pub fn calls(&self) -> usize {
        self.attempts.iter().filter(|a| a.was_called()).count()
    }

    /// Attempts that called a provider and failed.
    pub fn failed_attempts(&self) -> impl Iterator<Item = &ExecutionAttemptRecord> {
        self.attempts
            .iter()
            .filter(|a| a.was_called() && !a.success)
    }
}
