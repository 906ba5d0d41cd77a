//! Per-(provider, tier) circuit state.

use super::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Calls flow normally
    #[default]
    Closed,
    /// Calls are rejected until the cool-down elapses
    Open,
    /// A single trial call is admitted
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitStatus::Closed => f.write_str("closed"),
            CircuitStatus::Open => f.write_str("open"),
            CircuitStatus::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Failure-tracking state for one (provider, tier).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    /// Failures since the last success (restarts after the failure window)
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// When the circuit last opened
    pub opened_at: Option<DateTime<Utc>>,
    /// When the current half-open trial was admitted
    pub trial_started_at: Option<DateTime<Utc>>,
    pub total_failures: u64,
    pub total_successes: u64,
}

impl CircuitState {
    /// Decide whether a call may proceed, transitioning OPEN -> HALF_OPEN
    /// once the cool-down has elapsed.
    ///
    /// Returns `(admitted, Some(new_status))` when a transition occurred.
    pub fn admit(
        &mut self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
    ) -> (bool, Option<CircuitStatus>) {
        match self.status {
            CircuitStatus::Closed => (true, None),
            CircuitStatus::Open => {
                let cooled = self
                    .opened_at
                    .map(|opened| now - opened >= config.cooldown())
                    .unwrap_or(true);
                if cooled {
                    self.status = CircuitStatus::HalfOpen;
                    self.trial_started_at = Some(now);
                    (true, Some(CircuitStatus::HalfOpen))
                } else {
                    (false, None)
                }
            }
            CircuitStatus::HalfOpen => {
                // A trial that never reported back is abandoned after one cool-down
                let trial_free = self
                    .trial_started_at
                    .map(|started| now - started >= config.cooldown())
                    .unwrap_or(true);
                if trial_free {
                    self.trial_started_at = Some(now);
                }
                (trial_free, None)
            }
        }
    }

    /// Apply a successful call. Returns the new status on transition.
    pub fn on_success(&mut self) -> Option<CircuitStatus> {
        self.total_successes += 1;

        match self.status {
            CircuitStatus::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitStatus::HalfOpen => {
                self.status = CircuitStatus::Closed;
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.trial_started_at = None;
                Some(CircuitStatus::Closed)
            }
            // A call admitted before the circuit opened; only a trial may close it
            CircuitStatus::Open => None,
        }
    }

    /// Apply a failed call. Returns the new status on transition.
    pub fn on_failure(
        &mut self,
        now: DateTime<Utc>,
        config: &CircuitBreakerConfig,
    ) -> Option<CircuitStatus> {
        self.total_failures += 1;

        if let Some(last) = self.last_failure_at {
            if self.status == CircuitStatus::Closed && now - last > config.failure_window() {
                self.consecutive_failures = 0;
            }
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(now);

        match self.status {
            CircuitStatus::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.status = CircuitStatus::Open;
                self.opened_at = Some(now);
                Some(CircuitStatus::Open)
            }
            CircuitStatus::HalfOpen => {
                self.status = CircuitStatus::Open;
                self.opened_at = Some(now);
                self.trial_started_at = None;
                Some(CircuitStatus::Open)
            }
            _ => None,
        }
    }
}
