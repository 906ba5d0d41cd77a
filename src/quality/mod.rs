//! Quality feedback store.
//!
//! Records quality scores per (workflow, stage, tier) and turns rolling
//! averages into tier recommendations. Records older than the retention
//! window are ignored on read and removed by a periodic cleanup pass.

mod config;
mod error;


pub use config::*;
pub use error::*;

use crate::clock::{Clock, SystemClock};
use crate::registry::Tier;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Maximum records kept per (workflow, stage, tier) between cleanup passes.
const MAX_RECORDS_PER_KEY: usize = 10_000;

/// A single quality observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    pub workflow: String,
    pub stage: String,
    pub tier: Tier,
    /// Score in [0.0, 1.0]
    pub quality_score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QualityKey {
    workflow: String,
    stage: String,
    tier: Tier,
}

impl QualityKey {
    fn new(workflow: &str, stage: &str, tier: Tier) -> Self {
        Self {
            workflow: workflow.to_string(),
            stage: stage.to_string(),
            tier,
        }
    }
}

/// What the recommendation asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Upgrade,
    Downgrade,
    Keep,
    InsufficientData,
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendationKind::Upgrade => "upgrade",
            RecommendationKind::Downgrade => "downgrade",
            RecommendationKind::Keep => "keep",
            RecommendationKind::InsufficientData => "insufficient_data",
        };
        f.write_str(s)
    }
}

/// Tier recommendation for a (workflow, stage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub current_tier: Tier,
    pub recommended_tier: Tier,
    pub kind: RecommendationKind,
    pub reason: String,
    /// 0.0 to 1.0, scaled by sample count
    pub confidence: f64,
    /// Samples behind the current tier's average
    pub sample_count: usize,
    /// Rolling average for the current tier, if any samples exist
    pub average: Option<f64>,
}

/// Rolling-window statistics for one tier of a (workflow, stage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierQualityStats {
    pub tier: Tier,
    pub sample_count: usize,
    pub average: Option<f64>,
}

/// Thread-safe store of quality records.
///
/// Each key owns its own `RwLock`, so appends to different (workflow, stage,
/// tier) keys never contend.
pub struct QualityFeedbackStore {
    records: DashMap<QualityKey, RwLock<VecDeque<QualityRecord>>>,
    config: QualityConfig,
    clock: Arc<dyn Clock>,
}

impl QualityFeedbackStore {
    /// Create an empty store driven by the system clock.
    pub fn new(config: QualityConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QualityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Record a quality score.
    ///
    /// Fails with [`QualityError::ScoreOutOfRange`] when the score is outside
    /// `[0.0, 1.0]` (NaN included). Both bounds are accepted.
    pub fn record(
        &self,
        workflow: &str,
        stage: &str,
        tier: Tier,
        quality_score: f64,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), QualityError> {
        if !(0.0..=1.0).contains(&quality_score) {
            return Err(QualityError::ScoreOutOfRange {
                score: quality_score,
            });
        }
        if workflow.trim().is_empty() {
            return Err(QualityError::EmptyField { field: "workflow" });
        }
        if stage.trim().is_empty() {
            return Err(QualityError::EmptyField { field: "stage" });
        }

        let record = QualityRecord {
            workflow: workflow.to_string(),
            stage: stage.to_string(),
            tier,
            quality_score,
            timestamp: self.clock.now(),
            metadata,
        };

        let entry = self
            .records
            .entry(QualityKey::new(workflow, stage, tier))
            .or_insert_with(|| RwLock::new(VecDeque::new()));

        let mut queue = match entry.value().write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(workflow, stage, %tier, "RwLock poisoned in record, recovering");
                poisoned.into_inner()
            }
        };
        queue.push_back(record);
        while queue.len() > MAX_RECORDS_PER_KEY {
            queue.pop_front();
        }

        tracing::trace!(workflow, stage, %tier, quality_score, "Quality score recorded");
        Ok(())
    }

    /// Oldest timestamp still inside the retention period.
    fn retention_cutoff(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(self.config.retention())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Scores inside the rolling window: the most recent `window_size`
    /// records that are also within the retention period.
    fn window_scores(&self, workflow: &str, stage: &str, tier: Tier) -> Vec<f64> {
        let Some(entry) = self.records.get(&QualityKey::new(workflow, stage, tier)) else {
            return Vec::new();
        };
        let queue = match entry.value().read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(workflow, stage, %tier, "RwLock poisoned in window_scores, recovering");
                poisoned.into_inner()
            }
        };

        let cutoff = self.retention_cutoff();
        let scores = queue
            .iter()
            .rev()
            .filter(|r| r.timestamp >= cutoff)
            .take(self.config.window_size)
            .map(|r| r.quality_score)
            .collect();
        scores
    }

    /// Rolling-window stats for one tier.
    pub fn tier_stats(&self, workflow: &str, stage: &str, tier: Tier) -> TierQualityStats {
        let scores = self.window_scores(workflow, stage, tier);
        let average = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };
        TierQualityStats {
            tier,
            sample_count: scores.len(),
            average,
        }
    }

    /// Rolling-window stats for every tier of a (workflow, stage).
    pub fn stats(&self, workflow: &str, stage: &str) -> Vec<TierQualityStats> {
        Tier::ALL
            .iter()
            .map(|tier| self.tier_stats(workflow, stage, *tier))
            .collect()
    }

    fn confidence(&self, samples: usize) -> f64 {
        if self.config.window_size == 0 {
            return 1.0;
        }
        (samples as f64 / self.config.window_size as f64).min(1.0)
    }

    /// Recommend a tier for a (workflow, stage) currently running on
    /// `current_tier`.
    pub fn recommend_tier(&self, workflow: &str, stage: &str, current_tier: Tier) -> Recommendation {
        let current = self.tier_stats(workflow, stage, current_tier);
        let keep = |kind, reason: &str, confidence| Recommendation {
            current_tier,
            recommended_tier: current_tier,
            kind,
            reason: reason.to_string(),
            confidence,
            sample_count: current.sample_count,
            average: current.average,
        };

        let avg = match current.average {
            Some(avg) if current.sample_count >= self.config.min_samples => avg,
            _ => return keep(RecommendationKind::InsufficientData, "insufficient data", 0.0),
        };
        let confidence = self.confidence(current.sample_count);

        if avg < self.config.upgrade_threshold {
            return match current_tier.next_up() {
                Some(up) => Recommendation {
                    recommended_tier: up,
                    ..keep(RecommendationKind::Upgrade, "quality below threshold", confidence)
                },
                None => keep(
                    RecommendationKind::Keep,
                    "quality below threshold, already at highest tier",
                    confidence,
                ),
            };
        }

        if avg > self.config.downgrade_threshold {
            if let Some(down) = current_tier.next_down() {
                let lower = self.tier_stats(workflow, stage, down);
                let lower_ok = lower.sample_count >= self.config.min_samples
                    && lower
                        .average
                        .is_some_and(|a| a > self.config.lower_tier_threshold);
                if lower_ok {
                    return Recommendation {
                        recommended_tier: down,
                        ..keep(
                            RecommendationKind::Downgrade,
                            "excess quality margin, cost savings available",
                            self.confidence(current.sample_count.min(lower.sample_count)),
                        )
                    };
                }
            }
        }

        keep(RecommendationKind::Keep, "quality within target range", confidence)
    }

    /// Remove records older than the retention window. Returns the number
    /// of records removed.
    pub fn purge_expired(&self) -> usize {
        let cutoff = self.retention_cutoff();
        let mut removed = 0;

        self.records.retain(|_, lock| {
            let queue = match lock.get_mut() {
                Ok(queue) => queue,
                Err(poisoned) => {
                    tracing::warn!("RwLock poisoned in purge_expired, recovering");
                    poisoned.into_inner()
                }
            };
            // Concurrent appends can land slightly out of timestamp order
            let before = queue.len();
            queue.retain(|r| r.timestamp >= cutoff);
            removed += before - queue.len();
            !queue.is_empty()
        });

        tracing::debug!(removed, "Expired quality records purged");
        removed
    }

    /// Total records currently held, expired or not.
    pub fn total_records(&self) -> usize {
        self.records
            .iter()
            .map(|entry| match entry.value().read() {
                Ok(queue) => queue.len(),
                Err(poisoned) => poisoned.into_inner().len(),
            })
            .sum()
    }
}

impl Default for QualityFeedbackStore {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

/// Run the retention cleanup loop as a background task.
pub async fn retention_cleanup_loop(
    store: Arc<QualityFeedbackStore>,
    cancel_token: tokio_util::sync::CancellationToken,
) {
    let interval_secs = store.config().cleanup_interval_seconds.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    tracing::info!(interval_secs, "Quality retention cleanup loop started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Quality retention cleanup loop stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = store.total_records(), "Quality retention pass complete");
                }
            }
        }
    }
}
