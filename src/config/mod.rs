//! Configuration for Tierline
//!
//! Layered loading from a TOML file, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`TIERLINE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use tierline::config::TierlineConfig;
//!
//! let config: TierlineConfig = toml::from_str(r#"
//! [circuit_breaker]
//! failure_threshold = 3
//! "#).unwrap();
//! assert_eq!(config.circuit_breaker.failure_threshold, 3);
//! assert_eq!(config.circuit_breaker.cooldown_seconds, 60);
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, MAX_INTERVAL_SECONDS};
use crate::classifier::{ClassifierConfig, TaskClassifier};
use crate::executor::{ExecutorConfig, ResilientExecutor, ResilientExecutorBuilder};
use crate::policy::{PolicyDefinition, PolicySet, RetryPolicy};
use crate::quality::{QualityConfig, QualityFeedbackStore, MAX_RETENTION_DAYS};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::telemetry::{JsonlTelemetryStore, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Unified configuration.
///
/// An empty `models` table means the built-in catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TierlineConfig {
    pub logging: LoggingConfig,
    pub models: Vec<ModelDescriptor>,
    pub classifier: ClassifierConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry policy for default chains and for policies without their own
    pub retry: RetryPolicy,
    pub policies: Vec<PolicyDefinition>,
    /// Task type -> policy name
    pub task_policies: BTreeMap<String, String>,
    pub quality: QualityConfig,
    pub telemetry: TelemetryConfig,
    pub executor: ExecutorConfig,
}

impl TierlineConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `TIERLINE_*` environment overrides.
    ///
    /// Invalid values are ignored and the current value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("TIERLINE_LOG_LEVEL") {
            if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                self.logging.level = level.to_lowercase();
            }
        }
        if let Ok(format) = std::env::var("TIERLINE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        if let Ok(path) = std::env::var("TIERLINE_TELEMETRY_PATH") {
            if !path.trim().is_empty() {
                self.telemetry.enabled = true;
                self.telemetry.path = PathBuf::from(path);
            }
        }
        if let Ok(provider) = std::env::var("TIERLINE_DEFAULT_PROVIDER") {
            if !provider.trim().is_empty() {
                self.executor.default_provider = Some(provider.trim().to_string());
            }
        }

        self
    }

    /// Check value ranges. Cross-references between models and policies
    /// are checked by [`build_policies`](Self::build_policies).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        for (component, level) in &self.logging.component_levels {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::validation(
                    format!("logging.component_levels.{}", component),
                    format!("expected one of {}", LOG_LEVELS.join(", ")),
                ));
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::validation(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.circuit_breaker.cooldown_seconds == 0 {
            return Err(ConfigError::validation(
                "circuit_breaker.cooldown_seconds",
                "must be non-zero",
            ));
        }

        for (field, value) in [
            ("circuit_breaker.cooldown_seconds", self.circuit_breaker.cooldown_seconds),
            (
                "circuit_breaker.failure_window_seconds",
                self.circuit_breaker.failure_window_seconds,
            ),
        ] {
            if value > MAX_INTERVAL_SECONDS {
                return Err(ConfigError::validation(
                    field,
                    format!("must not exceed {} seconds", MAX_INTERVAL_SECONDS),
                ));
            }
        }

        self.retry.validate()?;

        let quality = &self.quality;
        if quality.window_size == 0 {
            return Err(ConfigError::validation("quality.window_size", "must be at least 1"));
        }
        if quality.min_samples == 0 {
            return Err(ConfigError::validation("quality.min_samples", "must be at least 1"));
        }
        if quality.retention_days == 0 {
            return Err(ConfigError::validation("quality.retention_days", "must be at least 1"));
        }
        if quality.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::validation(
                "quality.retention_days",
                format!("must not exceed {} days", MAX_RETENTION_DAYS),
            ));
        }
        for (field, value) in [
            ("quality.upgrade_threshold", quality.upgrade_threshold),
            ("quality.downgrade_threshold", quality.downgrade_threshold),
            ("quality.lower_tier_threshold", quality.lower_tier_threshold),
            ("executor.adaptive_min_confidence", self.executor.adaptive_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::validation(field, "must be within [0.0, 1.0]"));
            }
        }
        if quality.upgrade_threshold > quality.downgrade_threshold {
            return Err(ConfigError::validation(
                "quality.upgrade_threshold",
                "must not exceed downgrade_threshold",
            ));
        }

        if self.telemetry.enabled && self.telemetry.path.as_os_str().is_empty() {
            return Err(ConfigError::validation("telemetry.path", "cannot be empty"));
        }

        Ok(())
    }

    /// The model registry described by `[[models]]`, or the built-in catalog.
    pub fn build_registry(&self) -> Result<ModelRegistry, ConfigError> {
        if self.models.is_empty() {
            return Ok(ModelRegistry::with_defaults());
        }
        Ok(ModelRegistry::from_models(self.models.clone())?)
    }

    pub fn build_classifier(&self) -> TaskClassifier {
        TaskClassifier::from_config(&self.classifier)
    }

    /// Named policies and task assignments, checked against `registry`.
    pub fn build_policies(&self, registry: &ModelRegistry) -> Result<PolicySet, ConfigError> {
        Ok(PolicySet::from_definitions(
            &self.policies,
            &self.task_policies,
            &self.retry,
            registry,
        )?)
    }

    /// A builder with every configured component installed. Provider
    /// executors still have to be registered by the caller.
    pub fn executor_builder(&self) -> Result<ResilientExecutorBuilder, ConfigError> {
        self.validate()?;

        let registry = Arc::new(self.build_registry()?);
        let policies = self.build_policies(&registry)?;

        let mut builder = ResilientExecutor::builder()
            .policies(policies)
            .registry(registry)
            .classifier(self.build_classifier())
            .circuit_breaker(Arc::new(CircuitBreaker::new(self.circuit_breaker.clone())))
            .quality_store(Arc::new(QualityFeedbackStore::new(self.quality.clone())))
            .default_retry(self.retry.clone())
            .config(self.executor.clone());

        if self.telemetry.enabled {
            builder = builder.telemetry(Arc::new(JsonlTelemetryStore::new(&self.telemetry.path)));
        }

        Ok(builder)
    }
}
