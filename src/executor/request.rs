use crate::classifier::TaskContext;
use crate::policy::FallbackPolicy;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A task to run through the resilient executor.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tierline::executor::ExecutionRequest;
///
/// let request = ExecutionRequest::new("summarize", "Summarize this changelog")
///     .with_context("latency_sensitive", "true")
///     .with_quality_target("release-notes", "draft")
///     .with_deadline(Duration::from_secs(30));
/// assert_eq!(request.workflow.as_deref(), Some("release-notes"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub task_type: String,
    pub prompt: String,
    pub system: Option<String>,
    /// Hints passed to the classifier
    pub context: TaskContext,
    /// Requested output token cap, clamped to each model's limit
    pub max_tokens: Option<u32>,
    /// Workflow name for quality feedback
    pub workflow: Option<String>,
    /// Stage name for quality feedback
    pub stage: Option<String>,
    /// Quality score to record for a successful result
    pub quality_score: Option<f64>,
    /// Explicit policy; wins over `policy_name` and task assignments
    pub policy: Option<Arc<FallbackPolicy>>,
    /// Named policy from the executor's policy set
    pub policy_name: Option<String>,
    /// Time budget for the whole call, measured from the start of `execute`
    pub deadline: Option<Duration>,
    /// Passed through to the provider request
    pub metadata: BTreeMap<String, String>,
}

impl ExecutionRequest {
    pub fn new(task_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_quality_target(mut self, workflow: impl Into<String>, stage: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self.stage = Some(stage.into());
        self
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn with_policy(mut self, policy: Arc<FallbackPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_policy_name(mut self, name: impl Into<String>) -> Self {
        self.policy_name = Some(name.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
