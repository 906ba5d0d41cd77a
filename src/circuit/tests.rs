//! Unit tests for the circuit module.

use super::*;
use crate::clock::ManualClock;
use chrono::Utc;
use std::sync::Arc;

fn config(threshold: u32, cooldown: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        enabled: true,
        failure_threshold: threshold,
        cooldown_seconds: cooldown,
        failure_window_seconds: 300,
    }
}

fn breaker(threshold: u32, cooldown: u64) -> (CircuitBreaker, ManualClock) {
    let clock = ManualClock::new();
    let breaker = CircuitBreaker::with_clock(config(threshold, cooldown), Arc::new(clock.clone()));
    (breaker, clock)
}

// ============================================================================
// CircuitBreakerConfig
// ============================================================================

#[test]
fn test_config_default_values() {
    let config = CircuitBreakerConfig::default();
    assert!(config.enabled);
    assert_eq!(config.failure_threshold, 5);
    assert_eq!(config.cooldown_seconds, 60);
    assert_eq!(config.failure_window_seconds, 300);
}

#[test]
fn test_config_partial_toml() {
    let toml = r#"
        failure_threshold = 2
    "#;
    let config: CircuitBreakerConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.failure_threshold, 2);
    assert_eq!(config.cooldown_seconds, 60); // default
}

// ============================================================================
// CircuitState transitions
// ============================================================================

#[test]
fn test_state_default_is_closed() {
    let state = CircuitState::default();
    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.opened_at.is_none());
}

#[test]
fn test_closed_stays_closed_under_threshold() {
    let mut state = CircuitState::default();
    let config = config(3, 60);
    let now = Utc::now();

    assert_eq!(state.on_failure(now, &config), None);
    assert_eq!(state.on_failure(now, &config), None);
    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.consecutive_failures, 2);
}

#[test]
fn test_closed_to_open_at_threshold() {
    let mut state = CircuitState::default();
    let config = config(3, 60);
    let now = Utc::now();

    state.on_failure(now, &config);
    state.on_failure(now, &config);
    let transition = state.on_failure(now, &config);

    assert_eq!(transition, Some(CircuitStatus::Open));
    assert_eq!(state.opened_at, Some(now));
}

#[test]
fn test_success_resets_consecutive_failures() {
    let mut state = CircuitState::default();
    let config = config(3, 60);
    let now = Utc::now();

    state.on_failure(now, &config);
    state.on_failure(now, &config);
    state.on_success();
    state.on_failure(now, &config);

    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.consecutive_failures, 1);
    assert_eq!(state.total_failures, 3);
}

#[test]
fn test_failures_outside_window_are_not_consecutive() {
    let mut state = CircuitState::default();
    let config = config(2, 60);
    let start = Utc::now();

    state.on_failure(start, &config);
    let later = start + chrono::Duration::seconds(301);
    assert_eq!(state.on_failure(later, &config), None);
    assert_eq!(state.consecutive_failures, 1);
}

#[test]
fn test_half_open_success_closes() {
    let mut state = CircuitState {
        status: CircuitStatus::HalfOpen,
        consecutive_failures: 3,
        ..Default::default()
    };

    assert_eq!(state.on_success(), Some(CircuitStatus::Closed));
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.trial_started_at.is_none());
}

#[test]
fn test_half_open_failure_reopens() {
    let mut state = CircuitState {
        status: CircuitStatus::HalfOpen,
        ..Default::default()
    };
    let now = Utc::now();

    assert_eq!(state.on_failure(now, &config(5, 60)), Some(CircuitStatus::Open));
    assert_eq!(state.opened_at, Some(now));
}

#[test]
fn test_late_success_does_not_close_open_circuit() {
    let mut state = CircuitState {
        status: CircuitStatus::Open,
        opened_at: Some(Utc::now()),
        ..Default::default()
    };
    assert_eq!(state.on_success(), None);
    assert_eq!(state.status, CircuitStatus::Open);
}

// ============================================================================
// CircuitBreaker
// ============================================================================

#[test]
fn test_unused_key_is_allowed() {
    let (breaker, _) = breaker(3, 60);
    assert!(breaker.allow("anthropic", Tier::Capable));
    assert_eq!(breaker.state("openai", Tier::Cheap).status, CircuitStatus::Closed);
}

#[test]
fn test_opens_after_threshold_and_rejects() {
    let (breaker, _) = breaker(3, 60);
    for _ in 0..3 {
        breaker.record_failure("openai", Tier::Capable);
    }

    assert!(!breaker.allow("openai", Tier::Capable));
    assert_eq!(breaker.state("openai", Tier::Capable).status, CircuitStatus::Open);
}

#[test]
fn test_keys_are_independent() {
    let (breaker, _) = breaker(1, 60);
    breaker.record_failure("openai", Tier::Capable);

    assert!(!breaker.allow("openai", Tier::Capable));
    assert!(breaker.allow("openai", Tier::Premium));
    assert!(breaker.allow("anthropic", Tier::Capable));
}

#[test]
fn test_cooldown_admits_single_trial() {
    let (breaker, clock) = breaker(1, 60);
    breaker.record_failure("openai", Tier::Capable);

    clock.advance_secs(59);
    assert!(!breaker.allow("openai", Tier::Capable));

    clock.advance_secs(1);
    assert!(breaker.allow("openai", Tier::Capable));
    assert_eq!(breaker.state("openai", Tier::Capable).status, CircuitStatus::HalfOpen);

    // Trial in flight: no second caller
    assert!(!breaker.allow("openai", Tier::Capable));
}

#[test]
fn test_oversized_intervals_saturate() {
    let clock = ManualClock::new();
    let breaker = CircuitBreaker::with_clock(
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 1,
            cooldown_seconds: 100_000_000_000_000_000,
            failure_window_seconds: u64::MAX,
        },
        Arc::new(clock.clone()),
    );
    breaker.record_failure("openai", Tier::Capable);
    assert!(!breaker.allow("openai", Tier::Capable));

    clock.advance_secs(MAX_INTERVAL_SECONDS as i64 - 1);
    assert!(!breaker.allow("openai", Tier::Capable));
    clock.advance_secs(1);
    assert!(breaker.allow("openai", Tier::Capable));
}

#[test]
fn test_trial_success_closes_circuit() {
    let (breaker, clock) = breaker(1, 10);
    breaker.record_failure("openai", Tier::Capable);
    clock.advance_secs(10);

    assert!(breaker.allow("openai", Tier::Capable));
    breaker.record_success("openai", Tier::Capable);

    let state = breaker.state("openai", Tier::Capable);
    assert_eq!(state.status, CircuitStatus::Closed);
    assert_eq!(state.consecutive_failures, 0);
    assert!(breaker.allow("openai", Tier::Capable));
    assert!(breaker.allow("openai", Tier::Capable));
}

#[test]
fn test_trial_failure_reopens_with_fresh_cooldown() {
    let (breaker, clock) = breaker(1, 10);
    breaker.record_failure("openai", Tier::Capable);
    clock.advance_secs(10);
    assert!(breaker.allow("openai", Tier::Capable));

    clock.advance_secs(3);
    breaker.record_failure("openai", Tier::Capable);
    let state = breaker.state("openai", Tier::Capable);
    assert_eq!(state.status, CircuitStatus::Open);

    // Cool-down restarts from the trial failure
    clock.advance_secs(9);
    assert!(!breaker.allow("openai", Tier::Capable));
    clock.advance_secs(1);
    assert!(breaker.allow("openai", Tier::Capable));
}

#[test]
fn test_abandoned_trial_is_replaced_after_cooldown() {
    let (breaker, clock) = breaker(1, 10);
    breaker.record_failure("google", Tier::Cheap);
    clock.advance_secs(10);
    assert!(breaker.allow("google", Tier::Cheap));

    // Trial never reports back
    clock.advance_secs(10);
    assert!(breaker.allow("google", Tier::Cheap));
}

#[test]
fn test_disabled_breaker_always_allows() {
    let clock = ManualClock::new();
    let config = CircuitBreakerConfig {
        enabled: false,
        failure_threshold: 1,
        ..Default::default()
    };
    let breaker = CircuitBreaker::with_clock(config, Arc::new(clock));
    breaker.record_failure("openai", Tier::Cheap);

    assert!(breaker.allow("openai", Tier::Cheap));
    assert_eq!(breaker.state("openai", Tier::Cheap).consecutive_failures, 1);
}

#[test]
fn test_get_status_and_reset() {
    let (breaker, _) = breaker(1, 60);
    breaker.record_failure("openai", Tier::Capable);
    breaker.record_success("anthropic", Tier::Cheap);

    let status = breaker.get_status();
    assert_eq!(status.len(), 2);
    assert_eq!(
        status[&ProviderTier::new("openai", Tier::Capable)].status,
        CircuitStatus::Open
    );

    assert!(breaker.reset("openai", Tier::Capable));
    assert!(breaker.allow("openai", Tier::Capable));
    assert!(!breaker.reset("never", Tier::Premium));
}

#[test]
fn test_reset_all() {
    let (breaker, _) = breaker(1, 60);
    breaker.record_failure("a", Tier::Cheap);
    breaker.record_failure("b", Tier::Premium);

    breaker.reset_all();

    assert!(breaker
        .get_status()
        .values()
        .all(|s| s.status == CircuitStatus::Closed && s.consecutive_failures == 0));
}

#[test]
fn test_concurrent_failures_counted_exactly() {
    let (breaker, _) = breaker(1000, 60);
    let breaker = Arc::new(breaker);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let b = Arc::clone(&breaker);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    b.record_failure("openai", Tier::Capable);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(breaker.state("openai", Tier::Capable).total_failures, 400);
}

#[test]
fn test_status_serializes_snake_case() {
    let json = serde_json::to_string(&CircuitStatus::HalfOpen).unwrap();
    assert_eq!(json, "\"half_open\"");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Exactly `threshold` failures open the circuit; a cool-down
        /// advance lets the next call through as a trial.
        #[test]
        fn prop_threshold_then_cooldown(
            threshold in 1u32..20,
            cooldown in 1u64..600,
            provider in "[a-z]{3,10}",
        ) {
            let (breaker, clock) = breaker(threshold, cooldown);

            for _ in 0..threshold - 1 {
                breaker.record_failure(&provider, Tier::Capable);
            }
            prop_assert!(breaker.allow(&provider, Tier::Capable));

            breaker.record_failure(&provider, Tier::Capable);
            prop_assert!(!breaker.allow(&provider, Tier::Capable));

            clock.advance_secs(cooldown as i64);
            prop_assert!(breaker.allow(&provider, Tier::Capable));
            prop_assert_eq!(
                breaker.state(&provider, Tier::Capable).status,
                CircuitStatus::HalfOpen
            );
        }
    }
}
