//! End-to-end execution tests: classification, fallback chains, circuit
//! breaking across executions, and configuration-driven setup.

mod common;

use common::{chain, fast_retry, two_provider_registry, MockExecutor};
use std::sync::Arc;
use tierline::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};
use tierline::clock::ManualClock;
use tierline::config::TierlineConfig;
use tierline::executor::{
    ErrorKind, ExecutionError, ExecutionRequest, ProviderError, ResilientExecutor, SkipReason,
};
use tierline::registry::Tier;

#[tokio::test]
async fn test_circuit_lifecycle_across_executions() {
    let registry = two_provider_registry();
    let clock = ManualClock::new();
    let breaker = Arc::new(CircuitBreaker::with_clock(
        CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown_seconds: 60,
            ..CircuitBreakerConfig::default()
        },
        Arc::new(clock.clone()),
    ));

    let alpha = Arc::new(MockExecutor::ok().script(
        Tier::Capable,
        vec![
            Err(ProviderError::transient("down")),
            Err(ProviderError::transient("still down")),
        ],
    ));
    let beta = Arc::new(MockExecutor::ok());
    let executor = ResilientExecutor::builder()
        .registry(Arc::clone(&registry))
        .circuit_breaker(Arc::clone(&breaker))
        .executor("alpha", alpha.clone())
        .executor("beta", beta.clone())
        .build();

    let policy = chain(&registry, &[("alpha", Tier::Capable), ("beta", Tier::Capable)], 0);
    let request = || ExecutionRequest::new("write_code", "x").with_policy(Arc::clone(&policy));

    // Two failing executions open the circuit
    for _ in 0..2 {
        let result = executor.execute(request()).await;
        assert!(result.success);
        assert_eq!(result.final_provider.as_deref(), Some("beta"));
    }
    assert_eq!(breaker.state("alpha", Tier::Capable).status, CircuitStatus::Open);

    // While open, alpha is skipped without a call
    let result = executor.execute(request()).await;
    assert!(result.success);
    assert_eq!(result.attempts[0].skipped, Some(SkipReason::CircuitOpen));
    assert_eq!(alpha.calls(), 2);

    // After the cool-down a trial call goes through and closes the circuit
    clock.advance_secs(61);
    let result = executor.execute(request()).await;
    assert!(result.success);
    assert!(!result.fallback_used);
    assert_eq!(result.final_provider.as_deref(), Some("alpha"));
    assert_eq!(alpha.calls(), 3);
    assert_eq!(breaker.state("alpha", Tier::Capable).status, CircuitStatus::Closed);
    assert_eq!(beta.calls(), 3);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let registry = two_provider_registry();
    let clock = ManualClock::new();
    let breaker = Arc::new(CircuitBreaker::with_clock(
        CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        },
        Arc::new(clock.clone()),
    ));

    let alpha = Arc::new(MockExecutor::failing(ErrorKind::Timeout));
    let executor = ResilientExecutor::builder()
        .registry(Arc::clone(&registry))
        .circuit_breaker(Arc::clone(&breaker))
        .executor("alpha", alpha.clone())
        .build();
    let policy = chain(&registry, &[("alpha", Tier::Premium)], 0);

    executor
        .execute(ExecutionRequest::new("x", "x").with_policy(Arc::clone(&policy)))
        .await;
    assert_eq!(breaker.state("alpha", Tier::Premium).status, CircuitStatus::Open);

    clock.advance_secs(60);
    let result = executor
        .execute(ExecutionRequest::new("x", "x").with_policy(Arc::clone(&policy)))
        .await;
    assert!(matches!(result.error, Some(ExecutionError::Exhausted { .. })));
    assert_eq!(alpha.calls(), 2);
    assert_eq!(breaker.state("alpha", Tier::Premium).status, CircuitStatus::Open);

    // Reopened with a fresh cool-down
    let result = executor
        .execute(ExecutionRequest::new("x", "x").with_policy(policy))
        .await;
    assert!(matches!(result.error, Some(ExecutionError::NoAvailableProviders { .. })));
    assert_eq!(alpha.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_executions_share_breaker() {
    let registry = two_provider_registry();
    let alpha = Arc::new(MockExecutor::failing(ErrorKind::Transient));
    let beta = Arc::new(MockExecutor::ok());
    let executor = Arc::new(
        ResilientExecutor::builder()
            .registry(Arc::clone(&registry))
            .default_retry(fast_retry(0))
            .executor("alpha", alpha.clone())
            .executor("beta", beta.clone())
            .build(),
    );
    let policy = chain(&registry, &[("alpha", Tier::Capable), ("beta", Tier::Capable)], 0);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let policy = Arc::clone(&policy);
            tokio::spawn(async move {
                executor
                    .execute(ExecutionRequest::new("write_code", "x").with_policy(policy))
                    .await
            })
        })
        .collect();
    let results = futures::future::join_all(handles).await;

    for result in results {
        let result = result.unwrap();
        assert!(result.success);
        assert_eq!(result.final_provider.as_deref(), Some("beta"));
    }

    let state = executor.circuit_breaker().state("alpha", Tier::Capable);
    assert_eq!(state.status, CircuitStatus::Open);
    assert_eq!(state.total_failures as usize, alpha.calls());
    assert!(alpha.calls() >= 5);
    assert_eq!(beta.calls(), 20);
}

#[tokio::test]
async fn test_executor_from_config() {
    let config: TierlineConfig = toml::from_str(
        r#"
        [[models]]
        provider = "alpha"
        tier = "cheap"
        model_id = "alpha-small"
        input_price_per_million = 0.5
        output_price_per_million = 1.0
        max_output_tokens = 4096

        [[models]]
        provider = "alpha"
        tier = "capable"
        model_id = "alpha-medium"
        input_price_per_million = 2.0
        output_price_per_million = 8.0
        max_output_tokens = 16384

        [[models]]
        provider = "beta"
        tier = "capable"
        model_id = "beta-medium"
        input_price_per_million = 1.0
        output_price_per_million = 4.0
        max_output_tokens = 8192

        [retry]
        max_retries = 2
        initial_delay_ms = 1
        jitter = false

        [[policies]]
        name = "bulk"
        primary_provider = "alpha"
        primary_tier = "cheap"
        strategies = ["next_tier_up", "same_tier_other_provider"]

        [task_policies]
        summarize = "bulk"
        "#,
    )
    .unwrap();

    let alpha = Arc::new(MockExecutor::failing(ErrorKind::RateLimit));
    let beta = Arc::new(MockExecutor::ok());
    let executor = config
        .executor_builder()
        .unwrap()
        .executor("alpha", alpha.clone())
        .executor("beta", beta.clone())
        .build();

    let result = executor.execute(ExecutionRequest::new("summarize", "x")).await;

    // Other providers are only tried at the primary tier, where beta has no model
    assert_eq!(result.policy, "bulk");
    assert_eq!(result.fallback_chain, "alpha:cheap -> alpha:capable");
    assert!(!result.success);
    assert_eq!(alpha.calls(), 6);
    assert_eq!(beta.calls(), 0);
    assert!(matches!(
        result.error,
        Some(ExecutionError::Exhausted { kind: ErrorKind::RateLimit, .. })
    ));
}

#[tokio::test]
async fn test_default_chain_crosses_providers_then_tiers() {
    let registry = two_provider_registry();
    let alpha = Arc::new(MockExecutor::failing(ErrorKind::Transient));
    let beta = Arc::new(MockExecutor::ok().script(
        Tier::Capable,
        vec![Err(ProviderError::auth("bad key"))],
    ));
    let executor = ResilientExecutor::builder()
        .registry(registry)
        .default_retry(fast_retry(1))
        .executor("alpha", alpha.clone())
        .executor("beta", beta.clone())
        .build();

    let result = executor.execute(ExecutionRequest::new("write_code", "x")).await;

    assert_eq!(result.requirements.tier, Tier::Capable);
    assert_eq!(
        result.fallback_chain,
        "alpha:capable -> beta:capable -> alpha:premium"
    );
    assert!(!result.success);
    // 2 calls on alpha:capable, 1 on beta:capable (auth), 2 on alpha:premium
    assert_eq!(alpha.calls(), 4);
    assert_eq!(beta.calls(), 1);
    assert_eq!(result.calls(), 5);
}
