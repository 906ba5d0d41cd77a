//! Intra-step retry configuration.

use super::PolicyError;
use crate::executor::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Relative jitter applied to each backoff delay (±20%).
const JITTER_FRACTION: f64 = 0.2;

/// How `max_retries` is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrySemantics {
    /// `max_retries` additional attempts after the first (1 means 2 calls)
    #[default]
    AdditionalAttempts,
    /// `max_retries` is the total number of calls per step
    TotalAttempts,
}

/// Retry behavior within a single fallback step.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 1
/// initial_delay_ms = 500
/// exponential_backoff = true
/// retry_on_errors = ["transient", "rate_limit", "timeout"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub semantics: RetrySemantics,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    pub exponential_backoff: bool,
    /// Growth factor per retry when `exponential_backoff` is set
    pub backoff_multiplier: f64,
    /// Upper bound on a computed delay (0 disables the cap)
    pub max_delay_ms: u64,
    /// Randomize each delay by ±20%
    pub jitter: bool,
    /// Error kinds that trigger a retry on the same step
    pub retry_on_errors: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            semantics: RetrySemantics::AdditionalAttempts,
            initial_delay_ms: 500,
            exponential_backoff: true,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
            retry_on_errors: [ErrorKind::Transient, ErrorKind::RateLimit, ErrorKind::Timeout]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one call per step.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Underlying calls allowed per fallback step.
    pub fn attempts_per_step(&self) -> u32 {
        match self.semantics {
            RetrySemantics::AdditionalAttempts => self.max_retries.saturating_add(1),
            RetrySemantics::TotalAttempts => self.max_retries.max(1),
        }
    }

    /// Whether a failure of `kind` should be retried on the same step.
    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        kind.is_retryable() && self.retry_on_errors.contains(&kind)
    }

    /// Un-jittered delay before retry `n` (0-based): `initial * multiplier^n`
    /// when exponential, `initial` otherwise, capped at `max_delay_ms`.
    pub fn base_delay(&self, n: u32) -> Duration {
        let initial = self.initial_delay_ms as f64;
        let raw = if self.exponential_backoff {
            initial * self.backoff_multiplier.powi(n.min(i32::MAX as u32) as i32)
        } else {
            initial
        };
        let capped = if self.max_delay_ms > 0 {
            raw.min(self.max_delay_ms as f64)
        } else {
            raw
        };
        Duration::from_millis(capped.max(0.0).min(u64::MAX as f64) as u64)
    }

    /// Delay before retry `n`, jittered when enabled. A server `retry_after`
    /// hint is a floor.
    pub fn delay(&self, n: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.base_delay(n);
        let delay = if self.jitter {
            apply_jitter(base, &mut rand::thread_rng())
        } else {
            base
        };
        match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        }
    }

    /// Check the policy for values that can never work.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(kind) = self.retry_on_errors.iter().find(|k| !k.is_retryable()) {
            return Err(PolicyError::NonRetryableKind { kind: *kind });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidRetry {
                message: format!(
                    "backoff_multiplier must be a finite value >= 1.0, got {}",
                    self.backoff_multiplier
                ),
            });
        }
        if self.semantics == RetrySemantics::TotalAttempts && self.max_retries == 0 {
            return Err(PolicyError::InvalidRetry {
                message: "max_retries must be at least 1 when counting total attempts".to_string(),
            });
        }
        Ok(())
    }
}

/// Scale `base` by a uniform factor in [0.8, 1.2].
pub(crate) fn apply_jitter<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    if base.is_zero() {
        return base;
    }
    let factor = rng.gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
    base.mul_f64(factor)
}
