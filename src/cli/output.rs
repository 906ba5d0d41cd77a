//! Output formatting helpers for CLI commands

use crate::policy::FallbackPolicy;
use crate::registry::{ModelDescriptor, Tier};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

/// View model for model display
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelView {
    pub provider: String,
    pub tier: Tier,
    pub model_id: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub max_output_tokens: u32,
    pub capabilities: Vec<&'static str>,
}

impl From<&ModelDescriptor> for ModelView {
    fn from(model: &ModelDescriptor) -> Self {
        let caps = model.capabilities;
        let capabilities = [
            (caps.supports_tools, "tools"),
            (caps.supports_vision, "vision"),
            (caps.supports_thinking, "thinking"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect();

        Self {
            provider: model.provider.clone(),
            tier: model.tier,
            model_id: model.model_id.clone(),
            input_price_per_million: model.input_price_per_million,
            output_price_per_million: model.output_price_per_million,
            max_output_tokens: model.max_output_tokens,
            capabilities,
        }
    }
}

/// View model for policy display
#[derive(Debug, Clone, serde::Serialize)]
pub struct PolicyView {
    pub name: String,
    pub chain: Vec<String>,
    pub attempts_per_step: u32,
    pub max_calls: usize,
    pub tasks: Vec<String>,
}

impl PolicyView {
    pub fn new(policy: &FallbackPolicy, tasks: Vec<String>) -> Self {
        Self {
            name: policy.name().to_string(),
            chain: policy.steps().iter().map(|s| s.to_string()).collect(),
            attempts_per_step: policy.retry().attempts_per_step(),
            max_calls: policy.max_calls(),
            tasks,
        }
    }
}

pub fn tier_label(tier: Tier) -> String {
    match tier {
        Tier::Cheap => tier.as_str().green().to_string(),
        Tier::Capable => tier.as_str().cyan().to_string(),
        Tier::Premium => tier.as_str().magenta().to_string(),
    }
}

/// Format models as a table
pub fn format_models_table(models: &[ModelView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Provider",
        "Tier",
        "Model",
        "Input $/M",
        "Output $/M",
        "Max Output",
        "Capabilities",
    ]);

    for m in models {
        table.add_row(vec![
            Cell::new(&m.provider),
            Cell::new(tier_label(m.tier)),
            Cell::new(&m.model_id),
            Cell::new(format!("{:.2}", m.input_price_per_million)),
            Cell::new(format!("{:.2}", m.output_price_per_million)),
            Cell::new(m.max_output_tokens),
            Cell::new(m.capabilities.join(", ")),
        ]);
    }

    table.to_string()
}

/// Format models as JSON
pub fn format_models_json(models: &[ModelView]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({ "models": models }))
}

/// Format policies as a table
pub fn format_policies_table(policies: &[PolicyView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Policy", "Chain", "Attempts/Step", "Max Calls", "Tasks"]);

    for p in policies {
        table.add_row(vec![
            Cell::new(&p.name),
            Cell::new(p.chain.join(" -> ")),
            Cell::new(p.attempts_per_step),
            Cell::new(p.max_calls),
            Cell::new(p.tasks.join(", ")),
        ]);
    }

    table.to_string()
}

/// Format policies as JSON
pub fn format_policies_json(policies: &[PolicyView]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({ "policies": policies }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelCapabilities;

    fn model() -> ModelDescriptor {
        ModelDescriptor::new(
            "anthropic",
            Tier::Capable,
            "claude-sonnet-4-5",
            3.0,
            15.0,
            64_000,
            ModelCapabilities {
                supports_tools: true,
                supports_vision: false,
                supports_thinking: true,
            },
        )
    }

    #[test]
    fn test_model_view_lists_enabled_capabilities() {
        let view = ModelView::from(&model());
        assert_eq!(view.capabilities, vec!["tools", "thinking"]);
    }

    #[test]
    fn test_models_table_has_header_and_row() {
        colored::control::set_override(false);
        let output = format_models_table(&[ModelView::from(&model())]);
        assert!(output.contains("Provider"));
        assert!(output.contains("claude-sonnet-4-5"));
        assert!(output.contains("3.00"));
    }

    #[test]
    fn test_models_json_shape() {
        let output = format_models_json(&[ModelView::from(&model())]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["models"][0]["tier"], "capable");
        assert_eq!(parsed["models"][0]["max_output_tokens"], 64_000);
    }
}
