//! Models command implementation

use crate::cli::output::{format_models_json, format_models_table, ModelView};
use crate::cli::ModelsArgs;
use crate::registry::ModelRegistry;

/// Handle `tierline models`
pub fn handle_models(args: &ModelsArgs, registry: &ModelRegistry) -> anyhow::Result<String> {
    let models = match args.tier {
        Some(tier) => registry.list_by_tier(tier),
        None => registry.all(),
    };
    let views: Vec<ModelView> = models.iter().map(|m| ModelView::from(m.as_ref())).collect();

    if args.json {
        Ok(format_models_json(&views)?)
    } else {
        Ok(format_models_table(&views))
    }
}
