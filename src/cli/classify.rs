//! Classify command implementation

use crate::classifier::{TaskClassifier, TaskContext};
use crate::cli::ClassifyArgs;
use crate::registry::ModelRegistry;
use serde_json::json;

/// Handle `tierline classify`: the derived requirements plus the models
/// that could serve them, as JSON.
pub fn handle_classify(
    args: &ClassifyArgs,
    classifier: &TaskClassifier,
    registry: &ModelRegistry,
) -> anyhow::Result<String> {
    let context: TaskContext = args.context.iter().cloned().collect();
    let requirements = classifier.classify(&args.task, Some(&context));
    let candidates: Vec<String> = classifier
        .candidates(&requirements, registry)
        .iter()
        .map(|m| format!("{} ({})", m.key(), m.model_id))
        .collect();

    Ok(serde_json::to_string_pretty(&json!({
        "requirements": requirements,
        "candidates": candidates,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(task: &str, context: &[(&str, &str)]) -> ClassifyArgs {
        ClassifyArgs {
            task: task.to_string(),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            config: PathBuf::from("tierline.toml"),
        }
    }

    fn run(args: &ClassifyArgs) -> serde_json::Value {
        let output = handle_classify(args, &TaskClassifier::new(), &ModelRegistry::with_defaults()).unwrap();
        serde_json::from_str(&output).unwrap()
    }

    #[test]
    fn test_classify_cheap_task() {
        let parsed = run(&args("Summarize", &[]));
        assert_eq!(parsed["requirements"]["task_type"], "summarize");
        assert_eq!(parsed["requirements"]["tier"], "cheap");
        assert_eq!(parsed["candidates"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_classify_premium_task_needs_thinking() {
        let parsed = run(&args("security_audit", &[]));
        assert_eq!(parsed["requirements"]["tier"], "premium");
        assert_eq!(parsed["requirements"]["needs_thinking"], true);
    }

    #[test]
    fn test_classify_context_override() {
        let parsed = run(&args("summarize", &[("tier", "capable"), ("vision", "true")]));
        assert_eq!(parsed["requirements"]["tier"], "capable");
        assert_eq!(parsed["requirements"]["tier_overridden"], true);
        assert_eq!(parsed["requirements"]["needs_vision"], true);
        assert_eq!(parsed["candidates"].as_array().unwrap().len(), 3);
    }
}
