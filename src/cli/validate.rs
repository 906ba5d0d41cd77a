//! Validate command implementation

use crate::cli::ValidateArgs;
use crate::config::TierlineConfig;
use anyhow::Context;
use colored::Colorize;
use std::fmt::Write;

/// Handle `tierline validate`
///
/// Range errors, model table errors and policy errors fail the command.
/// Registry warnings are reported but do not.
pub fn handle_validate(args: &ValidateArgs) -> anyhow::Result<String> {
    let config = TierlineConfig::load(Some(&args.config))
        .with_context(|| format!("cannot validate {}", args.config.display()))?
        .with_env_overrides();
    report(&config)
}

pub(crate) fn report(config: &TierlineConfig) -> anyhow::Result<String> {
    config.validate()?;
    let registry = config.build_registry()?;
    let policies = config.build_policies(&registry)?;
    let warnings = registry.validate();

    let mut out = String::new();
    writeln!(
        out,
        "{} {} models, {} providers, {} policies, {} task assignments",
        "✓".green(),
        registry.len(),
        registry.providers().len(),
        policies.len(),
        policies.assignments().len()
    )?;
    for warning in &warnings {
        writeln!(out, "{} {}", "warning:".yellow(), warning)?;
    }

    Ok(out.trim_end().to_string())
}
