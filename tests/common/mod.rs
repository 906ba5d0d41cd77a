//! Shared test utilities for Tierline integration tests.
//!
//! Provides a scripted provider executor, registry fixtures, and policy
//! helpers so each test file only states the scenario it checks.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tierline::executor::{
    ErrorKind, Executor, ProviderError, ProviderRequest, ProviderResponse, TokenUsage,
};
use tierline::policy::{FallbackPolicy, RetryPolicy};
use tierline::registry::{ModelCapabilities, ModelDescriptor, ModelRegistry, Tier};

// =============================================================================
// Registry Fixtures
// =============================================================================

pub fn caps(tools: bool, vision: bool, thinking: bool) -> ModelCapabilities {
    ModelCapabilities {
        supports_tools: tools,
        supports_vision: vision,
        supports_thinking: thinking,
    }
}

/// Two providers: `alpha` on every tier, `beta` on capable and premium.
pub fn two_provider_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("alpha", Tier::Cheap, "alpha-small", 0.5, 1.0, 4_096, caps(true, false, false)),
        ModelDescriptor::new("alpha", Tier::Capable, "alpha-medium", 2.0, 8.0, 16_384, caps(true, true, true)),
        ModelDescriptor::new("alpha", Tier::Premium, "alpha-large", 10.0, 40.0, 32_768, caps(true, true, true)),
        ModelDescriptor::new("beta", Tier::Capable, "beta-medium", 1.0, 4.0, 8_192, caps(true, false, false)),
        ModelDescriptor::new("beta", Tier::Premium, "beta-large", 8.0, 24.0, 16_384, caps(true, true, true)),
    ]
}

pub fn two_provider_registry() -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::from_models(two_provider_models()).unwrap())
}

// =============================================================================
// Policies
// =============================================================================

/// Retry policy with millisecond delays and no jitter.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay_ms: 1,
        jitter: false,
        ..RetryPolicy::default()
    }
}

pub fn chain(registry: &ModelRegistry, steps: &[(&str, Tier)], max_retries: u32) -> Arc<FallbackPolicy> {
    let (provider, tier) = steps[0];
    let mut builder = FallbackPolicy::builder(provider, tier).retry(fast_retry(max_retries));
    for (provider, tier) in &steps[1..] {
        builder = builder.step(*provider, *tier, "");
    }
    Arc::new(builder.build(registry).unwrap())
}

// =============================================================================
// Mock Executor
// =============================================================================

pub type Outcome = Result<ProviderResponse, ProviderError>;

/// Provider executor that replays scripted outcomes per tier, then
/// succeeds (or fails with `fail_with`) for every further call.
pub struct MockExecutor {
    script: Mutex<HashMap<Tier, VecDeque<Outcome>>>,
    fail_with: Option<ErrorKind>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockExecutor {
    pub fn ok() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            fail_with: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::ok()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(self, tier: Tier, outcomes: Vec<Outcome>) -> Self {
        self.script.lock().unwrap().insert(tier, outcomes.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn call(
        &self,
        model: &ModelDescriptor,
        _request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&model.tier)
            .and_then(|queue| queue.pop_front());
        if let Some(outcome) = scripted {
            return outcome;
        }

        match self.fail_with {
            Some(kind) => Err(ProviderError::new(kind, format!("{} failed", model.model_id))),
            None => Ok(ProviderResponse::new(
                format!("response from {}", model.model_id),
                TokenUsage::new(1_000, 1_000),
            )),
        }
    }
}
