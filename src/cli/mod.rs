//! Command-line interface
//!
//! # Commands
//!
//! - `models` - List the model registry
//! - `classify` - Show the requirements derived for a task type
//! - `validate` - Check a configuration file
//! - `policies` - List named fallback policies and their chains
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Show premium models as JSON
//! tierline models --tier premium --json
//!
//! # Classify a task with a context hint
//! tierline classify summarize --context latency_sensitive=true
//!
//! # Generate shell completions
//! tierline completions bash > ~/.bash_completion.d/tierline
//! ```

pub mod classify;
pub mod completions;
pub mod config;
pub mod models;
pub mod output;
pub mod policies;
pub mod validate;

pub use classify::handle_classify;
pub use completions::handle_completions;
pub use config::handle_config_init;
pub use models::handle_models;
pub use policies::handle_policies;
pub use validate::handle_validate;

use crate::config::TierlineConfig;
use crate::registry::Tier;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Tierline - resilient multi-tier LLM execution
#[derive(Parser, Debug)]
#[command(
    name = "tierline",
    version,
    about = "Tier classification, retry, circuit breaking and fallback across LLM providers"
)]
pub struct Cli {
    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered models
    Models(ModelsArgs),
    /// Classify a task type
    Classify(ClassifyArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// List fallback policies
    Policies(PoliciesArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only show one tier (cheap, capable, premium)
    #[arg(short, long)]
    pub tier: Option<Tier>,

    /// Path to configuration file
    #[arg(short, long, default_value = "tierline.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Task type, e.g. summarize or security_audit
    pub task: String,

    /// Context hint as key=value (repeatable)
    #[arg(long = "context", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,

    /// Path to configuration file
    #[arg(short, long, default_value = "tierline.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "tierline.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct PoliciesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "tierline.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "tierline.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Load the config file when present, otherwise defaults, then apply
/// `TIERLINE_*` overrides.
pub fn load_config(path: &Path) -> anyhow::Result<TierlineConfig> {
    let config = if path.exists() {
        TierlineConfig::load(Some(path))
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        TierlineConfig::default()
    };
    Ok(config.with_env_overrides())
}
