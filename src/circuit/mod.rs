//! Circuit breaking per (provider, tier).
//!
//! Each key owns its own mutex, so calls against different keys never contend
//! and calls against the same key serialize only the state transition. The
//! OPEN -> HALF_OPEN transition is evaluated lazily on the next `allow()`;
//! there is no background timer.

mod config;
mod state;

#[cfg(test)]
mod tests;

pub use config::*;
pub use state::*;

use crate::clock::{Clock, SystemClock};
use crate::registry::{ProviderTier, Tier};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type CircuitCell = Arc<Mutex<CircuitState>>;

/// Failure-tracking state machine for every (provider, tier) in use.
///
/// State is created lazily on first use and kept for the lifetime of the
/// breaker. Share one instance between executors via `Arc`.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    circuits: DashMap<ProviderTier, CircuitCell>,
}

impl CircuitBreaker {
    /// Create a breaker driven by the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a breaker with an injected clock (for tests).
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            circuits: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or create the cell for a key. The map shard lock is released
    /// before the caller locks the cell.
    fn cell(&self, provider: &str, tier: Tier) -> CircuitCell {
        let key = ProviderTier::new(provider, tier);
        if let Some(existing) = self.circuits.get(&key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.circuits.entry(key).or_default().value())
    }

    fn lock<'a>(cell: &'a CircuitCell, provider: &str, tier: Tier) -> MutexGuard<'a, CircuitState> {
        match cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(provider, %tier, "Circuit mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Whether a call to (provider, tier) may proceed.
    ///
    /// True when CLOSED, or when this caller is admitted as the HALF_OPEN
    /// trial. False while OPEN and cooling down; the caller should skip to
    /// the next fallback step.
    pub fn allow(&self, provider: &str, tier: Tier) -> bool {
        if !self.config.enabled {
            return true;
        }

        let cell = self.cell(provider, tier);
        let mut state = Self::lock(&cell, provider, tier);
        let (admitted, transition) = state.admit(self.clock.now(), &self.config);
        drop(state);

        if let Some(to) = transition {
            self.on_transition(provider, tier, to);
        }

        if !admitted {
            tracing::debug!(provider, %tier, "Circuit open, call rejected");
        }
        admitted
    }

    /// Record a successful call.
    pub fn record_success(&self, provider: &str, tier: Tier) {
        let cell = self.cell(provider, tier);
        let transition = Self::lock(&cell, provider, tier).on_success();

        if let Some(to) = transition {
            self.on_transition(provider, tier, to);
        }
    }

    /// Record a terminal failure for a call.
    pub fn record_failure(&self, provider: &str, tier: Tier) {
        let cell = self.cell(provider, tier);
        let now = self.clock.now();
        let mut state = Self::lock(&cell, provider, tier);
        let transition = state.on_failure(now, &self.config);
        let failures = state.consecutive_failures;
        drop(state);

        tracing::debug!(
            provider,
            %tier,
            consecutive_failures = failures,
            threshold = self.config.failure_threshold,
            "Circuit failure recorded"
        );

        if let Some(to) = transition {
            self.on_transition(provider, tier, to);
        }
    }

    /// Current state of one key. Unused keys report a fresh CLOSED state.
    pub fn state(&self, provider: &str, tier: Tier) -> CircuitState {
        let key = ProviderTier::new(provider, tier);
        match self.circuits.get(&key) {
            Some(entry) => {
                let cell = Arc::clone(entry.value());
                drop(entry);
                let state = Self::lock(&cell, provider, tier).clone();
                state
            }
            None => CircuitState::default(),
        }
    }

    /// Snapshot of every tracked key.
    ///
    /// Status is as last stored: an OPEN circuit whose cool-down has elapsed
    /// still reports OPEN until the next `allow()`.
    pub fn get_status(&self) -> BTreeMap<ProviderTier, CircuitState> {
        let cells: Vec<(ProviderTier, CircuitCell)> = self
            .circuits
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        cells
            .into_iter()
            .map(|(key, cell)| {
                let state = Self::lock(&cell, &key.provider, key.tier).clone();
                (key, state)
            })
            .collect()
    }

    /// Return one key to a fresh CLOSED state. Returns false if it was never used.
    pub fn reset(&self, provider: &str, tier: Tier) -> bool {
        let key = ProviderTier::new(provider, tier);
        let Some(cell) = self.circuits.get(&key).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        *Self::lock(&cell, provider, tier) = CircuitState::default();
        tracing::info!(provider, %tier, "Circuit reset");
        true
    }

    /// Return every key to CLOSED.
    pub fn reset_all(&self) {
        for (key, _) in self.get_status() {
            self.reset(&key.provider, key.tier);
        }
    }

    fn on_transition(&self, provider: &str, tier: Tier, to: CircuitStatus) {
        match to {
            CircuitStatus::Open => tracing::warn!(
                provider,
                %tier,
                cooldown_seconds = self.config.cooldown_seconds,
                "Circuit opened"
            ),
            CircuitStatus::HalfOpen => {
                tracing::info!(provider, %tier, "Circuit half-open, admitting trial call")
            }
            CircuitStatus::Closed => tracing::info!(provider, %tier, "Circuit closed"),
        }

        metrics::counter!(
            "tierline_circuit_transitions_total",
            "provider" => provider.to_string(),
            "tier" => tier.to_string(),
            "state" => to.to_string(),
        )
        .increment(1);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
