//! Task classification.
//!
//! Maps a task type to the tier it needs, plus thinking/vision/batch/latency
//! flags. Classification is pure: the same task type and context always give
//! the same requirements. Unknown task types land on the capable tier.


use crate::registry::{ModelDescriptor, ModelRegistry, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Free-form key/value hints supplied with a task.
///
/// Recognized keys: `tier`, `thinking`, `vision`, `has_images`, `batch`,
/// `latency_sensitive`, `interactive`, `domain`.
pub type TaskContext = BTreeMap<String, String>;

/// Tasks cheap models handle well.
pub const DEFAULT_CHEAP_TASKS: &[&str] = &[
    "summarize",
    "classify",
    "triage",
    "match_pattern",
    "extract_topics",
    "lint_check",
    "format_code",
    "simple_qa",
    "catalog_data",
];

/// Tasks that need the premium tier.
pub const DEFAULT_PREMIUM_TASKS: &[&str] = &[
    "coordinate",
    "synthesize_results",
    "architectural_decision",
    "novel_problem",
    "final_review",
    "security_audit",
];

/// Tasks that need extended thinking, in addition to every premium task.
pub const DEFAULT_THINKING_TASKS: &[&str] = &["complex_reasoning", "multi_step_planning"];

/// Broad domain of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Code,
    Analysis,
    Documentation,
    Coordination,
    General,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Code => "code",
            TaskCategory::Analysis => "analysis",
            TaskCategory::Documentation => "documentation",
            TaskCategory::Coordination => "coordination",
            TaskCategory::General => "general",
        }
    }

    /// Infer the category from a normalized task name.
    fn infer(task: &str) -> Self {
        const CODE: &[&str] = &["code", "bug", "refactor", "test", "lint", "format"];
        const DOCS: &[&str] = &["doc", "readme", "changelog", "explain", "catalog"];
        const COORD: &[&str] = &["coordinate", "synthesize", "plan", "architect", "orchestrat"];
        const ANALYSIS: &[&str] = &[
            "analy", "review", "audit", "security", "classif", "triage", "summar", "extract",
            "reason", "performance",
        ];

        let has = |words: &[&str]| words.iter().any(|w| task.contains(w));
        if has(COORD) {
            TaskCategory::Coordination
        } else if has(CODE) {
            TaskCategory::Code
        } else if has(DOCS) {
            TaskCategory::Documentation
        } else if has(ANALYSIS) {
            TaskCategory::Analysis
        } else {
            TaskCategory::General
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(TaskCategory::Code),
            "analysis" => Ok(TaskCategory::Analysis),
            "documentation" | "docs" => Ok(TaskCategory::Documentation),
            "coordination" => Ok(TaskCategory::Coordination),
            "general" => Ok(TaskCategory::General),
            _ => Err(format!("Invalid task category: {}", s)),
        }
    }
}

/// Requirements derived for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequirements {
    /// Normalized task type
    pub task_type: String,
    /// Tier the task should start on
    pub tier: Tier,
    pub category: TaskCategory,
    pub needs_thinking: bool,
    pub needs_vision: bool,
    /// Whether the task may be deferred to a batch API
    pub batch_eligible: bool,
    pub latency_sensitive: bool,
    /// Whether the tier came from a context hint rather than the task sets
    pub tier_overridden: bool,
}

impl TaskRequirements {
    /// Whether a model has the capabilities this task needs.
    pub fn is_satisfied_by(&self, model: &ModelDescriptor) -> bool {
        (!self.needs_thinking || model.capabilities.supports_thinking)
            && (!self.needs_vision || model.capabilities.supports_vision)
    }
}

/// Task-type sets backing the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra task types to classify as cheap
    pub cheap_tasks: Vec<String>,
    /// Extra task types to classify as premium
    pub premium_tasks: Vec<String>,
    /// Extra task types requiring extended thinking
    pub thinking_tasks: Vec<String>,
    /// Explicit category per task type
    pub categories: BTreeMap<String, TaskCategory>,
}

/// Maps task types to [`TaskRequirements`].
///
/// # Examples
///
/// ```
/// use tierline::classifier::{TaskClassifier, TaskContext};
/// use tierline::registry::Tier;
///
/// let classifier = TaskClassifier::new();
/// assert_eq!(classifier.classify("summarize", None).tier, Tier::Cheap);
/// assert_eq!(classifier.classify("coordinate", None).tier, Tier::Premium);
/// assert_eq!(classifier.classify("something-new", None).tier, Tier::Capable);
///
/// let mut context = TaskContext::new();
/// context.insert("tier".to_string(), "premium".to_string());
/// assert_eq!(classifier.classify("summarize", Some(&context)).tier, Tier::Premium);
/// ```
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    cheap: HashSet<String>,
    premium: HashSet<String>,
    thinking: HashSet<String>,
    categories: BTreeMap<String, TaskCategory>,
}

impl TaskClassifier {
    /// Classifier with the built-in task sets.
    pub fn new() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }

    /// Built-in task sets extended with configured task types.
    ///
    /// A task listed as both cheap and premium is treated as premium.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let collect = |defaults: &[&str], extra: &[String]| -> HashSet<String> {
            defaults
                .iter()
                .map(|t| normalize_task(t))
                .chain(extra.iter().map(|t| normalize_task(t)))
                .collect()
        };

        let premium = collect(DEFAULT_PREMIUM_TASKS, &config.premium_tasks);
        let mut thinking = collect(DEFAULT_THINKING_TASKS, &config.thinking_tasks);
        thinking.extend(premium.iter().cloned());

        Self {
            cheap: collect(DEFAULT_CHEAP_TASKS, &config.cheap_tasks),
            premium,
            thinking,
            categories: config
                .categories
                .iter()
                .map(|(task, category)| (normalize_task(task), *category))
                .collect(),
        }
    }

    /// Derive requirements for a task.
    ///
    /// Context hints win over the task sets. Hints that fail to parse are
    /// ignored with a warning.
    pub fn classify(&self, task_type: &str, context: Option<&TaskContext>) -> TaskRequirements {
        let task = normalize_task(task_type);

        let default_tier = if self.premium.contains(&task) {
            Tier::Premium
        } else if self.cheap.contains(&task) {
            Tier::Cheap
        } else {
            Tier::Capable
        };

        let tier_hint = hint(context, &["tier"]).and_then(|raw| match raw.parse::<Tier>() {
            Ok(tier) => Some(tier),
            Err(e) => {
                tracing::warn!(task = %task, hint = %raw, error = %e, "Ignoring tier hint");
                None
            }
        });
        let tier = tier_hint.unwrap_or(default_tier);

        let category = hint(context, &["domain"])
            .and_then(|raw| match raw.parse::<TaskCategory>() {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(task = %task, hint = %raw, error = %e, "Ignoring domain hint");
                    None
                }
            })
            .or_else(|| self.categories.get(&task).copied())
            .unwrap_or_else(|| TaskCategory::infer(&task));

        let needs_thinking =
            flag(context, &["thinking"]).unwrap_or_else(|| self.thinking.contains(&task));
        let needs_vision = flag(context, &["vision", "has_images"]).unwrap_or(false);
        let batch_eligible = flag(context, &["batch"]).unwrap_or(default_tier == Tier::Cheap);
        let latency_sensitive =
            flag(context, &["latency_sensitive", "interactive"]).unwrap_or(false);

        TaskRequirements {
            task_type: task,
            tier,
            category,
            needs_thinking,
            needs_vision,
            // Interactive callers never wait on a batch queue
            batch_eligible: batch_eligible && !latency_sensitive,
            latency_sensitive,
            tier_overridden: tier_hint.is_some(),
        }
    }

    /// Models at the required tier that have the required capabilities,
    /// in registration order.
    pub fn candidates(
        &self,
        requirements: &TaskRequirements,
        registry: &ModelRegistry,
    ) -> Vec<Arc<ModelDescriptor>> {
        registry
            .list_by_tier(requirements.tier)
            .into_iter()
            .filter(|m| requirements.is_satisfied_by(m))
            .collect()
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, trim, and fold `-` and spaces into `_`.
pub fn normalize_task(task: &str) -> String {
    task.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

fn hint<'a>(context: Option<&'a TaskContext>, keys: &[&str]) -> Option<&'a str> {
    let context = context?;
    keys.iter()
        .find_map(|k| context.get(*k))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn flag(context: Option<&TaskContext>, keys: &[&str]) -> Option<bool> {
    let raw = hint(context, keys)?;
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key = keys[0], value = %raw, "Ignoring non-boolean context flag");
            None
        }
    }
}
