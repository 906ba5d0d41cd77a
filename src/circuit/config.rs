//! Configuration for circuit breaking.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Longest accepted cool-down or failure window: ten years.
pub const MAX_INTERVAL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the per-(provider, tier) circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false, `allow()` always admits calls (state is still tracked)
    pub enabled: bool,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds an open circuit rejects calls before admitting a trial
    pub cooldown_seconds: u64,
    /// Failures further apart than this no longer count as consecutive
    pub failure_window_seconds: u64,
}

impl CircuitBreakerConfig {
    pub(crate) fn cooldown(&self) -> Duration {
        bounded_seconds(self.cooldown_seconds)
    }

    pub(crate) fn failure_window(&self) -> Duration {
        bounded_seconds(self.failure_window_seconds)
    }
}

/// Values past [`MAX_INTERVAL_SECONDS`] saturate to it.
fn bounded_seconds(seconds: u64) -> Duration {
    let seconds = seconds.min(MAX_INTERVAL_SECONDS) as i64;
    Duration::try_seconds(seconds).unwrap_or_else(Duration::zero)
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            cooldown_seconds: 60,
            failure_window_seconds: 300,
        }
    }
}
