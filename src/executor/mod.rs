//! Resilient execution.
//!
//! [`ResilientExecutor`] runs one task through classification, policy
//! resolution, and the fallback chain. Each step is gated by the circuit
//! breaker and retried per the policy's [`RetryPolicy`](crate::policy::RetryPolicy).
//! The outcome is always a structured [`ExecutionResult`]. Telemetry and
//! quality feedback are recorded after the result is built and never
//! change it.
//!
//! The backoff sleep is the only intentional suspension point besides the
//! provider call itself, and no lock is held across either.

mod config;
mod provider;
mod request;
mod result;


pub use config::*;
pub use provider::*;
pub use request::*;
pub use result::*;

use crate::circuit::CircuitBreaker;
use crate::classifier::{TaskClassifier, TaskRequirements};
use crate::policy::{FallbackPolicy, FallbackStep, PolicySet, RetryPolicy};
use crate::quality::{QualityFeedbackStore, RecommendationKind};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::telemetry::{TelemetryEvent, TelemetryStore};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Computes a quality score for a successful result when the request did
/// not carry one.
pub trait QualityScorer: Send + Sync + 'static {
    /// Return a score in [0.0, 1.0], or `None` to skip recording.
    fn score(&self, request: &ExecutionRequest, output: &str) -> Option<f64>;
}

/// Executes tasks across a fallback chain with retry and circuit breaking.
///
/// All collaborators are injected; two executors built separately share no
/// state unless handed the same `Arc`s.
pub struct ResilientExecutor {
    registry: Arc<ModelRegistry>,
    classifier: TaskClassifier,
    circuit_breaker: Arc<CircuitBreaker>,
    quality: Arc<QualityFeedbackStore>,
    policies: PolicySet,
    default_retry: RetryPolicy,
    executors: HashMap<String, Arc<dyn Executor>>,
    telemetry: Option<Arc<dyn TelemetryStore>>,
    scorer: Option<Arc<dyn QualityScorer>>,
    config: ExecutorConfig,
}

struct StepSuccess {
    step_index: usize,
    model: Arc<ModelDescriptor>,
    response: ProviderResponse,
}

impl ResilientExecutor {
    pub fn builder() -> ResilientExecutorBuilder {
        ResilientExecutorBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn classifier(&self) -> &TaskClassifier {
        &self.classifier
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn quality_store(&self) -> &Arc<QualityFeedbackStore> {
        &self.quality
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Providers with a registered executor, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Execute a task.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute a task, stopping early when `cancel` fires or the request
    /// deadline passes. Both are checked before every attempt and raced
    /// against every provider call and backoff sleep.
    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let started_at = Utc::now();
        let execution_id = Uuid::new_v4();
        let deadline = request
            .deadline
            .map(|budget| tokio::time::Instant::now() + budget);

        let mut requirements = self
            .classifier
            .classify(&request.task_type, Some(&request.context));
        let mut attempts = AttemptLog::new(execution_id);

        let (policy_name, chain, outcome) = match self.resolve_policy(&request, &mut requirements) {
            Ok(policy) => {
                tracing::debug!(
                    %execution_id,
                    task = %requirements.task_type,
                    tier = %requirements.tier,
                    policy = policy.name(),
                    chain = %policy.describe(),
                    "Executing task"
                );
                let outcome = self
                    .run_chain(&request, &requirements, &policy, &cancel, deadline, &mut attempts)
                    .await;
                (policy.name().to_string(), policy.describe(), outcome)
            }
            Err(message) => {
                tracing::warn!(%execution_id, task = %requirements.task_type, error = %message, "No fallback policy");
                (String::new(), String::new(), Err(ExecutionError::Policy { message }))
            }
        };

        let records = attempts.into_records();
        let total_cost = records.iter().map(|a| a.cost).sum();
        let total_usage = records.iter().fold(TokenUsage::default(), |acc, a| {
            TokenUsage::new(
                acc.input_tokens + a.usage.input_tokens,
                acc.output_tokens + a.usage.output_tokens,
            )
        });
        let fallback_used = match &outcome {
            Ok(success) => success.step_index > 0,
            Err(ExecutionError::Exhausted { .. } | ExecutionError::NoAvailableProviders { .. }) => true,
            Err(_) => false,
        };

        let mut result = ExecutionResult {
            execution_id,
            task_type: request.task_type.clone(),
            requirements,
            success: outcome.is_ok(),
            output: None,
            error: None,
            attempts: records,
            total_cost,
            total_usage,
            fallback_used,
            policy: policy_name,
            fallback_chain: chain,
            final_provider: None,
            final_tier: None,
            final_model: None,
            quality_score: None,
            latency_ms: started.elapsed().as_millis() as u64,
            started_at,
        };
        match outcome {
            Ok(success) => {
                result.output = Some(success.response.content);
                result.final_provider = Some(success.model.provider.clone());
                result.final_tier = Some(success.model.tier);
                result.final_model = Some(success.model.model_id.clone());
            }
            Err(error) => result.error = Some(error),
        }

        self.record_quality(&request, &mut result);
        self.emit_telemetry(&result);

        metrics::counter!(
            "tierline_executions_total",
            "outcome" => if result.success { "success" } else { "failure" },
        )
        .increment(1);

        if result.success {
            tracing::info!(
                %execution_id,
                provider = result.final_provider.as_deref().unwrap_or_default(),
                tier = ?result.final_tier,
                fallback_used = result.fallback_used,
                calls = result.calls(),
                total_cost = result.total_cost,
                latency_ms = result.latency_ms,
                "Execution succeeded"
            );
        } else {
            tracing::warn!(
                %execution_id,
                error = result.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                calls = result.calls(),
                "Execution failed"
            );
        }

        result
    }

    /// Explicit policy, then a named one, then the task assignment, then a
    /// default chain derived from the requirements.
    fn resolve_policy(
        &self,
        request: &ExecutionRequest,
        requirements: &mut TaskRequirements,
    ) -> Result<Arc<FallbackPolicy>, String> {
        if let Some(policy) = &request.policy {
            return Ok(Arc::clone(policy));
        }
        if let Some(name) = &request.policy_name {
            return self
                .policies
                .get(name)
                .ok_or_else(|| format!("unknown policy '{}'", name));
        }
        if let Some(policy) = self.policies.for_task(&requirements.task_type) {
            return Ok(policy);
        }

        self.apply_recommendation(request, requirements);

        // Prefer a model with the required capabilities, then the default provider
        let candidates = self.classifier.candidates(requirements, &self.registry);
        let preferred = self.config.default_provider.as_deref();
        let primary = candidates
            .iter()
            .find(|m| Some(m.provider.as_str()) == preferred)
            .or_else(|| candidates.first())
            .map(|m| m.provider.clone());

        FallbackPolicy::default_for_tier(
            &self.registry,
            primary.as_deref().or(preferred),
            requirements.tier,
            self.default_retry.clone(),
        )
        .map(|policy| {
            Arc::new(policy.retain_models(&self.registry, |m| requirements.is_satisfied_by(m)))
        })
        .map_err(|e| e.to_string())
    }

    fn apply_recommendation(&self, request: &ExecutionRequest, requirements: &mut TaskRequirements) {
        if !self.config.adaptive_tiers || requirements.tier_overridden {
            return;
        }
        let (Some(workflow), Some(stage)) = (&request.workflow, &request.stage) else {
            return;
        };

        let recommendation = self.quality.recommend_tier(workflow, stage, requirements.tier);
        let actionable = matches!(
            recommendation.kind,
            RecommendationKind::Upgrade | RecommendationKind::Downgrade
        );
        if actionable && recommendation.confidence >= self.config.adaptive_min_confidence {
            tracing::info!(
                workflow = %workflow,
                stage = %stage,
                from = %requirements.tier,
                to = %recommendation.recommended_tier,
                confidence = recommendation.confidence,
                reason = %recommendation.reason,
                "Adjusting tier from quality feedback"
            );
            requirements.tier = recommendation.recommended_tier;
        }
    }

    async fn run_chain(
        &self,
        request: &ExecutionRequest,
        requirements: &TaskRequirements,
        policy: &FallbackPolicy,
        cancel: &CancellationToken,
        deadline: Option<tokio::time::Instant>,
        attempts: &mut AttemptLog,
    ) -> Result<StepSuccess, ExecutionError> {
        let table = self.registry.snapshot();
        let retry = policy.retry();
        let calls_per_step = retry.attempts_per_step();
        let mut last_failure: Option<(&FallbackStep, ProviderError)> = None;

        for (index, step) in policy.steps().iter().enumerate() {
            check_interrupt(cancel, deadline)?;

            let model = match table.get(&step.provider, step.tier) {
                Ok(model) => model,
                Err(e) => {
                    tracing::warn!(provider = %step.provider, tier = %step.tier, error = %e, "Skipping step");
                    attempts.skip(index, step, "", SkipReason::ModelUnavailable);
                    continue;
                }
            };
            let Some(executor) = self.executors.get(&step.provider) else {
                tracing::warn!(provider = %step.provider, tier = %step.tier, "Skipping step: no executor registered");
                attempts.skip(index, step, &model.model_id, SkipReason::NoExecutor);
                continue;
            };
            if !self.circuit_breaker.allow(&step.provider, step.tier) {
                tracing::info!(provider = %step.provider, tier = %step.tier, "Skipping step: circuit open");
                attempts.skip(index, step, &model.model_id, SkipReason::CircuitOpen);
                continue;
            }

            if index > 0 {
                tracing::info!(
                    provider = %step.provider,
                    tier = %step.tier,
                    step = index,
                    description = %step.description,
                    "Advancing to fallback step"
                );
                metrics::counter!("tierline_fallbacks_total").increment(1);
            }

            let provider_request = build_provider_request(request, requirements, &model);

            for attempt in 1..=calls_per_step {
                check_interrupt(cancel, deadline)?;

                let call_started = Instant::now();
                let outcome = self
                    .call_with_limits(executor.as_ref(), &model, &provider_request, cancel, deadline)
                    .await?;
                let latency = call_started.elapsed();

                match outcome {
                    Ok(response) => {
                        self.circuit_breaker.record_success(&step.provider, step.tier);
                        attempts.called(index, step, &model, attempt, latency, Ok(&response));
                        return Ok(StepSuccess {
                            step_index: index,
                            model,
                            response,
                        });
                    }
                    Err(error) => {
                        attempts.called(index, step, &model, attempt, latency, Err(&error));

                        if retry.should_retry(error.kind) && attempt < calls_per_step {
                            let delay = retry.delay(attempt - 1, error.retry_after);
                            tracing::debug!(
                                provider = %step.provider,
                                tier = %step.tier,
                                attempt,
                                kind = %error.kind,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying after failure"
                            );
                            backoff(delay, cancel, deadline).await?;
                            continue;
                        }

                        tracing::warn!(
                            provider = %step.provider,
                            tier = %step.tier,
                            attempts = attempt,
                            kind = %error.kind,
                            error = %error.message,
                            "Step failed"
                        );
                        self.circuit_breaker.record_failure(&step.provider, step.tier);
                        last_failure = Some((step, error));
                        break;
                    }
                }
            }
        }

        Err(match last_failure {
            Some((step, error)) => ExecutionError::Exhausted {
                provider: step.provider.clone(),
                tier: step.tier,
                kind: error.kind,
                message: error.message,
            },
            None => ExecutionError::NoAvailableProviders {
                chain: policy.describe(),
            },
        })
    }

    /// One provider call, bounded by the attempt timeout and raced against
    /// cancellation and the request deadline.
    async fn call_with_limits(
        &self,
        executor: &dyn Executor,
        model: &ModelDescriptor,
        request: &ProviderRequest,
        cancel: &CancellationToken,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<Result<ProviderResponse, ProviderError>, ExecutionError> {
        let call = async {
            match self.config.attempt_timeout() {
                Some(limit) => match tokio::time::timeout(limit, executor.call(model, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::timeout(format!(
                        "attempt exceeded {}ms",
                        limit.as_millis()
                    ))),
                },
                None => executor.call(model, request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            _ = wait_for_deadline(deadline) => Err(ExecutionError::DeadlineExceeded),
            result = call => Ok(result),
        }
    }

    fn record_quality(&self, request: &ExecutionRequest, result: &mut ExecutionResult) {
        if !result.success {
            return;
        }
        let (Some(workflow), Some(stage), Some(tier)) =
            (&request.workflow, &request.stage, result.final_tier)
        else {
            return;
        };

        let score = request.quality_score.or_else(|| {
            self.scorer
                .as_ref()
                .and_then(|scorer| scorer.score(request, result.output.as_deref().unwrap_or_default()))
        });
        let Some(score) = score else {
            return;
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("execution_id".to_string(), result.execution_id.to_string());
        if let Some(model) = &result.final_model {
            metadata.insert("model_id".to_string(), model.clone());
        }

        match self.quality.record(workflow, stage, tier, score, metadata) {
            Ok(()) => result.quality_score = Some(score),
            Err(e) => tracing::warn!(
                execution_id = %result.execution_id,
                workflow = %workflow,
                stage = %stage,
                error = %e,
                "Quality score not recorded"
            ),
        }
    }

    /// Hand attempt records and the result to telemetry on a spawned task.
    fn emit_telemetry(&self, result: &ExecutionResult) {
        let Some(store) = self.telemetry.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(execution_id = %result.execution_id, "No tokio runtime, telemetry dropped");
            return;
        };

        let mut events: Vec<TelemetryEvent> = result
            .attempts
            .iter()
            .cloned()
            .map(TelemetryEvent::Attempt)
            .collect();
        events.push(TelemetryEvent::Execution(result.clone()));

        handle.spawn(async move {
            for event in &events {
                if let Err(e) = store.append(event).await {
                    tracing::warn!(error = %e, "Telemetry append failed");
                }
            }
        });
    }
}

fn build_provider_request(
    request: &ExecutionRequest,
    requirements: &TaskRequirements,
    model: &ModelDescriptor,
) -> ProviderRequest {
    let cap = model.max_output_tokens;
    ProviderRequest {
        prompt: request.prompt.clone(),
        system: request.system.clone(),
        max_tokens: Some(request.max_tokens.map_or(cap, |requested| requested.min(cap))),
        thinking: requirements.needs_thinking && model.capabilities.supports_thinking,
        metadata: request.metadata.clone(),
    }
}

fn check_interrupt(
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
) -> Result<(), ExecutionError> {
    if cancel.is_cancelled() {
        return Err(ExecutionError::Cancelled);
    }
    if deadline.is_some_and(|at| tokio::time::Instant::now() >= at) {
        return Err(ExecutionError::DeadlineExceeded);
    }
    Ok(())
}

async fn wait_for_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn backoff(
    delay: Duration,
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
) -> Result<(), ExecutionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
        _ = wait_for_deadline(deadline) => Err(ExecutionError::DeadlineExceeded),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Attempt records for one execution.
struct AttemptLog {
    execution_id: Uuid,
    records: Vec<ExecutionAttemptRecord>,
}

impl AttemptLog {
    fn new(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            records: Vec::new(),
        }
    }

    fn base(&self, index: usize, step: &FallbackStep, model_id: &str) -> ExecutionAttemptRecord {
        ExecutionAttemptRecord {
            execution_id: self.execution_id,
            provider: step.provider.clone(),
            tier: step.tier,
            model_id: model_id.to_string(),
            step_index: index,
            attempt_number: 0,
            success: false,
            skipped: None,
            is_fallback: index > 0,
            latency_ms: 0,
            usage: TokenUsage::default(),
            cost: 0.0,
            error_kind: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    fn skip(&mut self, index: usize, step: &FallbackStep, model_id: &str, reason: SkipReason) {
        let record = ExecutionAttemptRecord {
            skipped: Some(reason),
            ..self.base(index, step, model_id)
        };
        metrics::counter!(
            "tierline_attempts_total",
            "provider" => step.provider.clone(),
            "tier" => step.tier.to_string(),
            "outcome" => "skipped",
        )
        .increment(1);
        self.records.push(record);
    }

    fn called(
        &mut self,
        index: usize,
        step: &FallbackStep,
        model: &ModelDescriptor,
        attempt: u32,
        latency: Duration,
        outcome: Result<&ProviderResponse, &ProviderError>,
    ) {
        let mut record = self.base(index, step, &model.model_id);
        record.attempt_number = attempt;
        record.latency_ms = latency.as_millis() as u64;

        match outcome {
            Ok(response) => {
                record.success = true;
                record.usage = response.usage;
            }
            Err(error) => {
                record.usage = error.usage.unwrap_or_default();
                record.error_kind = Some(error.kind);
                record.error_message = Some(error.message.clone());
            }
        }
        record.cost = model.estimate_cost(record.usage.input_tokens, record.usage.output_tokens);

        metrics::counter!(
            "tierline_attempts_total",
            "provider" => step.provider.clone(),
            "tier" => step.tier.to_string(),
            "outcome" => if record.success { "success" } else { "failure" },
        )
        .increment(1);
        metrics::histogram!(
            "tierline_attempt_duration_seconds",
            "provider" => step.provider.clone(),
            "tier" => step.tier.to_string(),
        )
        .record(latency.as_secs_f64());

        self.records.push(record);
    }

    fn into_records(self) -> Vec<ExecutionAttemptRecord> {
        self.records
    }
}

/// Builder for [`ResilientExecutor`]. Collaborators that are not supplied
/// get fresh defaults.
#[derive(Default)]
pub struct ResilientExecutorBuilder {
    registry: Option<Arc<ModelRegistry>>,
    classifier: Option<TaskClassifier>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    quality: Option<Arc<QualityFeedbackStore>>,
    policies: PolicySet,
    default_retry: RetryPolicy,
    executors: HashMap<String, Arc<dyn Executor>>,
    telemetry: Option<Arc<dyn TelemetryStore>>,
    scorer: Option<Arc<dyn QualityScorer>>,
    config: ExecutorConfig,
}

impl ResilientExecutorBuilder {
    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn quality_store(mut self, store: Arc<QualityFeedbackStore>) -> Self {
        self.quality = Some(store);
        self
    }

    pub fn policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        self
    }

    /// Retry policy for default (unnamed) chains.
    pub fn default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = retry;
        self
    }

    /// Register the executor serving `provider`. A later registration for
    /// the same provider replaces the earlier one.
    pub fn executor(mut self, provider: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(provider.into(), executor);
        self
    }

    pub fn telemetry(mut self, store: Arc<dyn TelemetryStore>) -> Self {
        self.telemetry = Some(store);
        self
    }

    pub fn quality_scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ResilientExecutor {
        ResilientExecutor {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ModelRegistry::with_defaults())),
            classifier: self.classifier.unwrap_or_default(),
            circuit_breaker: self.circuit_breaker.unwrap_or_default(),
            quality: self.quality.unwrap_or_default(),
            policies: self.policies,
            default_retry: self.default_retry,
            executors: self.executors,
            telemetry: self.telemetry,
            scorer: self.scorer,
            config: self.config,
        }
    }
}
