//! Model Registry module.
//!
//! Catalog of models keyed by (provider, tier). Reads are lock-free; a reload
//! builds a complete new table and swaps it in atomically, so readers observe
//! either the old table or the new one, never a mix.

mod error;
mod model;

pub use error::*;
pub use model::*;

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Non-fatal problems found in a loaded registry table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Input or output price is zero or negative
    NonPositiveCost {
        provider: String,
        tier: Tier,
        model_id: String,
    },
    /// The same model id is registered under more than one (provider, tier)
    DuplicateModelId { model_id: String, entries: Vec<String> },
    /// No provider serves this tier
    MissingTier { tier: Tier },
    /// Model declares a zero output token limit
    ZeroMaxTokens {
        provider: String,
        tier: Tier,
        model_id: String,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::NonPositiveCost {
                provider,
                tier,
                model_id,
            } => write!(f, "{provider}:{tier} ({model_id}) has a non-positive price"),
            ValidationWarning::DuplicateModelId { model_id, entries } => {
                write!(f, "model id '{model_id}' is registered more than once: {}", entries.join(", "))
            }
            ValidationWarning::MissingTier { tier } => {
                write!(f, "no model is registered for tier '{tier}'")
            }
            ValidationWarning::ZeroMaxTokens {
                provider,
                tier,
                model_id,
            } => write!(f, "{provider}:{tier} ({model_id}) has max_output_tokens = 0"),
        }
    }
}

/// One immutable version of the registry table.
#[derive(Debug, Default)]
pub struct RegistryTable {
    models: Vec<Arc<ModelDescriptor>>,
    index: HashMap<ProviderTier, usize>,
}

impl RegistryTable {
    /// Build a table, rejecting structurally invalid data.
    ///
    /// # Errors
    ///
    /// - `RegistryError::InvalidModel` for an empty provider/model id or a negative or non-finite price
    /// - `RegistryError::DuplicateEntry` if two models share a (provider, tier) pair
    pub fn build(models: Vec<ModelDescriptor>) -> Result<Self, RegistryError> {
        let mut table = RegistryTable {
            models: Vec::with_capacity(models.len()),
            index: HashMap::with_capacity(models.len()),
        };

        for (index, model) in models.into_iter().enumerate() {
            if model.provider.trim().is_empty() {
                return Err(RegistryError::InvalidModel {
                    index,
                    message: "provider cannot be empty".to_string(),
                });
            }
            if model.model_id.trim().is_empty() {
                return Err(RegistryError::InvalidModel {
                    index,
                    message: "model_id cannot be empty".to_string(),
                });
            }
            let valid_price = |price: f64| price.is_finite() && price >= 0.0;
            if !valid_price(model.input_price_per_million)
                || !valid_price(model.output_price_per_million)
            {
                return Err(RegistryError::InvalidModel {
                    index,
                    message: format!("{} has a negative or non-finite price", model.model_id),
                });
            }

            let key = model.key();
            if table.index.contains_key(&key) {
                return Err(RegistryError::DuplicateEntry {
                    provider: key.provider,
                    tier: key.tier,
                });
            }
            table.index.insert(key, table.models.len());
            table.models.push(Arc::new(model));
        }

        Ok(table)
    }

    /// Look up the model for a (provider, tier) pair.
    pub fn get(&self, provider: &str, tier: Tier) -> Result<Arc<ModelDescriptor>, RegistryError> {
        self.index
            .get(&ProviderTier::new(provider, tier))
            .map(|&i| Arc::clone(&self.models[i]))
            .ok_or_else(|| RegistryError::NotFound {
                provider: provider.to_string(),
                tier,
            })
    }

    pub fn contains(&self, provider: &str, tier: Tier) -> bool {
        self.index.contains_key(&ProviderTier::new(provider, tier))
    }

    /// Models serving `tier`, in registration order.
    pub fn list_by_tier(&self, tier: Tier) -> Vec<Arc<ModelDescriptor>> {
        self.models
            .iter()
            .filter(|m| m.tier == tier)
            .cloned()
            .collect()
    }

    /// All models in registration order.
    pub fn all(&self) -> Vec<Arc<ModelDescriptor>> {
        self.models.clone()
    }

    /// Distinct provider names in order of first registration.
    pub fn providers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.models
            .iter()
            .filter(|m| seen.insert(m.provider.as_str()))
            .map(|m| m.provider.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Check the table for suspicious but loadable data.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for model in &self.models {
            if !(model.input_price_per_million > 0.0 && model.output_price_per_million > 0.0) {
                warnings.push(ValidationWarning::NonPositiveCost {
                    provider: model.provider.clone(),
                    tier: model.tier,
                    model_id: model.model_id.clone(),
                });
            }
            if model.max_output_tokens == 0 {
                warnings.push(ValidationWarning::ZeroMaxTokens {
                    provider: model.provider.clone(),
                    tier: model.tier,
                    model_id: model.model_id.clone(),
                });
            }
        }

        // Registration order keeps the warning list deterministic
        let mut id_order: Vec<&str> = Vec::new();
        let mut by_id: HashMap<&str, Vec<String>> = HashMap::new();
        for model in &self.models {
            let entries = by_id.entry(model.model_id.as_str()).or_insert_with(|| {
                id_order.push(model.model_id.as_str());
                Vec::new()
            });
            entries.push(model.key().to_string());
        }
        for model_id in id_order {
            if let Some(entries) = by_id.remove(model_id) {
                if entries.len() > 1 {
                    warnings.push(ValidationWarning::DuplicateModelId {
                        model_id: model_id.to_string(),
                        entries,
                    });
                }
            }
        }

        for tier in Tier::ALL {
            if !self.models.iter().any(|m| m.tier == tier) {
                warnings.push(ValidationWarning::MissingTier { tier });
            }
        }

        warnings
    }
}

/// The Model Registry maps (provider, tier) to a model descriptor.
///
/// Owned explicitly and shared via `Arc`; there is no process-wide instance.
///
/// # Examples
///
/// ```
/// use tierline::registry::{ModelRegistry, Tier};
///
/// let registry = ModelRegistry::with_defaults();
/// let model = registry.get("anthropic", Tier::Capable).unwrap();
/// assert_eq!(model.provider, "anthropic");
/// assert!(registry.get("nobody", Tier::Cheap).is_err());
/// ```
pub struct ModelRegistry {
    table: ArcSwap<RegistryTable>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RegistryTable::default()),
        }
    }

    /// Create a registry loaded with the built-in catalog.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        // The built-in catalog has unique keys and non-empty ids
        if let Err(e) = registry.reload(default_models()) {
            tracing::error!(error = %e, "Built-in model catalog rejected");
        }
        registry
    }

    /// Create a registry from an explicit model list.
    pub fn from_models(models: Vec<ModelDescriptor>) -> Result<Self, RegistryError> {
        Ok(Self {
            table: ArcSwap::from_pointee(RegistryTable::build(models)?),
        })
    }

    /// Replace the whole table.
    ///
    /// The new table is fully built and checked before the swap; on error the
    /// current table stays in place.
    pub fn reload(&self, models: Vec<ModelDescriptor>) -> Result<(), RegistryError> {
        let table = RegistryTable::build(models)?;
        let count = table.len();
        self.table.store(Arc::new(table));
        tracing::info!(models = count, "Model registry reloaded");
        Ok(())
    }

    /// Current table. Holding the snapshot pins that version across a reload.
    pub fn snapshot(&self) -> Arc<RegistryTable> {
        self.table.load_full()
    }

    /// Look up the model for a (provider, tier) pair.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the pair is not registered.
    pub fn get(&self, provider: &str, tier: Tier) -> Result<Arc<ModelDescriptor>, RegistryError> {
        self.table.load().get(provider, tier)
    }

    pub fn contains(&self, provider: &str, tier: Tier) -> bool {
        self.table.load().contains(provider, tier)
    }

    /// Models serving `tier`, in registration order.
    pub fn list_by_tier(&self, tier: Tier) -> Vec<Arc<ModelDescriptor>> {
        self.table.load().list_by_tier(tier)
    }

    pub fn all(&self) -> Vec<Arc<ModelDescriptor>> {
        self.table.load().all()
    }

    pub fn providers(&self) -> Vec<String> {
        self.table.load().providers()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Check the current table for non-positive costs, duplicate ids and missing tiers.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        self.table.load().validate()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
