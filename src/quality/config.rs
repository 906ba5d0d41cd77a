//! Quality feedback configuration

use serde::{Deserialize, Serialize};

/// Longest accepted retention period: ten years.
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Configuration for the quality feedback loop.
///
/// Controls the rolling window used to average quality scores and the
/// thresholds that turn an average into a tier recommendation.
///
/// # Example
///
/// ```toml
/// [quality]
/// window_size = 20
/// retention_days = 7
/// min_samples = 5
/// upgrade_threshold = 0.7
/// downgrade_threshold = 0.9
/// lower_tier_threshold = 0.85
/// cleanup_interval_seconds = 3600
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Most recent records considered per (workflow, stage, tier).
    ///
    /// Default: 20. Also the sample count at which confidence reaches 1.0.
    pub window_size: usize,

    /// Records older than this many days are excluded and later purged.
    ///
    /// Default: 7
    pub retention_days: u32,

    /// Below this many samples the recommendation is "insufficient data".
    ///
    /// Default: 5
    pub min_samples: usize,

    /// Average below which the next tier up is recommended.
    ///
    /// Default: 0.7
    pub upgrade_threshold: f64,

    /// Average above which a downgrade is considered.
    ///
    /// Default: 0.9
    pub downgrade_threshold: f64,

    /// Average the tier below must exceed before a downgrade is recommended.
    ///
    /// Default: 0.85
    pub lower_tier_threshold: f64,

    /// Interval between retention cleanup passes in seconds.
    ///
    /// Default: 3600 (1 hour)
    pub cleanup_interval_seconds: u64,
}

impl QualityConfig {
    pub(crate) fn retention(&self) -> chrono::Duration {
        let days = self.retention_days.min(MAX_RETENTION_DAYS);
        chrono::Duration::try_days(i64::from(days)).unwrap_or_else(chrono::Duration::zero)
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            retention_days: 7,
            min_samples: 5,
            upgrade_threshold: 0.7,
            downgrade_threshold: 0.9,
            lower_tier_threshold: 0.85,
            cleanup_interval_seconds: 3600,
        }
    }
}
