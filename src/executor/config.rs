//! Executor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the resilient executor.
///
/// ```toml
/// [executor]
/// default_provider = "anthropic"
/// attempt_timeout_ms = 60000
/// adaptive_tiers = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Provider preferred as primary when no named policy applies
    pub default_provider: Option<String>,

    /// Per-attempt timeout in milliseconds (0 disables).
    ///
    /// Default: 0. An attempt that runs past this is treated as a TIMEOUT.
    pub attempt_timeout_ms: u64,

    /// Follow quality-store tier recommendations when picking the tier for
    /// requests that carry a workflow and stage.
    pub adaptive_tiers: bool,

    /// Minimum recommendation confidence before the tier is adjusted.
    ///
    /// Default: 0.5
    pub adaptive_min_confidence: f64,
}

impl ExecutorConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_ms > 0).then(|| Duration::from_millis(self.attempt_timeout_ms))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            attempt_timeout_ms: 0,
            adaptive_tiers: false,
            adaptive_min_confidence: 0.5,
        }
    }
}
