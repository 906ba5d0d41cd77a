//! Fallback and retry policies.
//!
//! A [`FallbackPolicy`] is an ordered list of (provider, tier) steps plus a
//! [`RetryPolicy`]. Strategies are expanded into concrete steps once, at
//! construction, against a registry snapshot; every step is checked against
//! the registry then, never at call time.

mod error;
mod retry;


pub use error::*;
pub use retry::*;

use crate::classifier::normalize_task;
use crate::registry::{ModelDescriptor, ModelRegistry, ProviderTier, RegistryTable, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// One (provider, tier) step in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackStep {
    pub provider: String,
    pub tier: Tier,
    #[serde(default)]
    pub description: String,
}

impl FallbackStep {
    pub fn new(provider: impl Into<String>, tier: Tier, description: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            tier,
            description: description.into(),
        }
    }

    pub fn key(&self) -> ProviderTier {
        ProviderTier::new(self.provider.clone(), self.tier)
    }
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.tier)
    }
}

/// Named rule that expands into fallback steps relative to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Every other provider serving the primary tier, in registration order
    SameTierOtherProvider,
    /// The primary provider at each higher tier, lowest first
    NextTierUp,
    /// The primary provider at each lower tier, highest first
    CheaperTierSameProvider,
    /// Every registered model: primary tier first, then higher tiers, then
    /// lower tiers; the primary provider leads within each tier
    AnyProviderAnyTier,
}

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::SameTierOtherProvider => "same_tier_other_provider",
            FallbackStrategy::NextTierUp => "next_tier_up",
            FallbackStrategy::CheaperTierSameProvider => "cheaper_tier_same_provider",
            FallbackStrategy::AnyProviderAnyTier => "any_provider_any_tier",
        }
    }

    fn expand(&self, provider: &str, tier: Tier, table: &RegistryTable) -> Vec<FallbackStep> {
        let providers = table.providers();
        let same_provider = |t: Tier, why: &str| {
            table
                .contains(provider, t)
                .then(|| FallbackStep::new(provider, t, why))
        };

        match self {
            FallbackStrategy::SameTierOtherProvider => providers
                .iter()
                .filter(|p| p.as_str() != provider && table.contains(p, tier))
                .map(|p| FallbackStep::new(p.as_str(), tier, "same tier, other provider"))
                .collect(),
            FallbackStrategy::NextTierUp => tiers_above(tier)
                .into_iter()
                .filter_map(|t| same_provider(t, "next tier up"))
                .collect(),
            FallbackStrategy::CheaperTierSameProvider => tiers_below(tier)
                .into_iter()
                .filter_map(|t| same_provider(t, "cheaper tier, same provider"))
                .collect(),
            FallbackStrategy::AnyProviderAnyTier => {
                let mut order = vec![tier];
                order.extend(tiers_above(tier));
                order.extend(tiers_below(tier));

                let mut ordered_providers = vec![provider.to_string()];
                ordered_providers.extend(providers.into_iter().filter(|p| p != provider));

                order
                    .into_iter()
                    .flat_map(|t| {
                        ordered_providers
                            .iter()
                            .filter(move |p| table.contains(p, t))
                            .map(move |p| FallbackStep::new(p.as_str(), t, "any provider, any tier"))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn tiers_above(tier: Tier) -> Vec<Tier> {
    std::iter::successors(tier.next_up(), |t| t.next_up()).collect()
}

fn tiers_below(tier: Tier) -> Vec<Tier> {
    std::iter::successors(tier.next_down(), |t| t.next_down()).collect()
}

/// An immutable, validated fallback chain.
///
/// Cheap to share: wrap in `Arc` and hand the same instance to every task
/// that selects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackPolicy {
    name: String,
    steps: Vec<FallbackStep>,
    retry: RetryPolicy,
}

impl FallbackPolicy {
    /// Start building a policy whose first step is `(provider, tier)`.
    pub fn builder(provider: impl Into<String>, tier: Tier) -> FallbackPolicyBuilder {
        FallbackPolicyBuilder::new(provider, tier)
    }

    /// The policy used when no named policy applies: the preferred provider
    /// at `tier` (or the first registered one), then the same tier on other
    /// providers, then higher tiers.
    pub fn default_for_tier(
        registry: &ModelRegistry,
        preferred_provider: Option<&str>,
        tier: Tier,
        retry: RetryPolicy,
    ) -> Result<Self, PolicyError> {
        let table = registry.snapshot();
        let provider = match preferred_provider.filter(|p| table.contains(p, tier)) {
            Some(p) => p.to_string(),
            None => table
                .list_by_tier(tier)
                .first()
                .map(|m| m.provider.clone())
                .ok_or(PolicyError::NoModelForTier { tier })?,
        };

        FallbackPolicy::builder(provider, tier)
            .name(format!("default-{}", tier))
            .strategy(FallbackStrategy::SameTierOtherProvider)
            .strategy(FallbackStrategy::NextTierUp)
            .retry(retry)
            .build_with_table(&table)
    }

    /// Drop steps whose model fails `keep`, preserving order. When no step
    /// passes, the chain is returned unchanged.
    pub fn retain_models<F>(mut self, registry: &ModelRegistry, keep: F) -> Self
    where
        F: Fn(&ModelDescriptor) -> bool,
    {
        let table = registry.snapshot();
        let kept: Vec<FallbackStep> = self
            .steps
            .iter()
            .filter(|step| {
                table
                    .get(&step.provider, step.tier)
                    .map(|model| keep(model.as_ref()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if !kept.is_empty() && kept.len() < self.steps.len() {
            tracing::debug!(
                policy = %self.name,
                dropped = self.steps.len() - kept.len(),
                "Dropped fallback steps that cannot serve the request"
            );
            self.steps = kept;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered steps; the first is the primary.
    pub fn steps(&self) -> &[FallbackStep] {
        &self.steps
    }

    pub fn primary(&self) -> &FallbackStep {
        // A built policy always has its primary step
        &self.steps[0]
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Upper bound on underlying calls for a fully failing chain.
    pub fn max_calls(&self) -> usize {
        self.steps.len() * self.retry.attempts_per_step() as usize
    }

    /// Chain as `provider:tier -> provider:tier`.
    pub fn describe(&self) -> String {
        describe_steps(&self.steps)
    }
}

pub(crate) fn describe_steps<'a>(steps: impl IntoIterator<Item = &'a FallbackStep>) -> String {
    steps
        .into_iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone)]
enum ChainPart {
    Strategy(FallbackStrategy),
    Step(FallbackStep),
}

/// Builder for [`FallbackPolicy`].
///
/// Strategies and custom steps are expanded in the order they were added;
/// a (provider, tier) pair that appears twice keeps its first position.
///
/// # Examples
///
/// ```
/// use tierline::policy::{FallbackPolicy, FallbackStrategy};
/// use tierline::registry::{ModelRegistry, Tier};
///
/// let registry = ModelRegistry::with_defaults();
/// let policy = FallbackPolicy::builder("anthropic", Tier::Capable)
///     .strategy(FallbackStrategy::NextTierUp)
///     .build(&registry)
///     .unwrap();
/// assert_eq!(policy.describe(), "anthropic:capable -> anthropic:premium");
/// ```
#[derive(Debug, Clone)]
pub struct FallbackPolicyBuilder {
    name: Option<String>,
    primary: FallbackStep,
    chain: Vec<ChainPart>,
    retry: RetryPolicy,
}

impl FallbackPolicyBuilder {
    pub fn new(provider: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: None,
            primary: FallbackStep::new(provider, tier, "primary"),
            chain: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn strategy(mut self, strategy: FallbackStrategy) -> Self {
        self.chain.push(ChainPart::Strategy(strategy));
        self
    }

    /// Append an explicit step.
    pub fn step(mut self, provider: impl Into<String>, tier: Tier, description: impl Into<String>) -> Self {
        self.chain
            .push(ChainPart::Step(FallbackStep::new(provider, tier, description)));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Expand and validate against the registry's current table.
    pub fn build(self, registry: &ModelRegistry) -> Result<FallbackPolicy, PolicyError> {
        self.build_with_table(&registry.snapshot())
    }

    pub(crate) fn build_with_table(self, table: &RegistryTable) -> Result<FallbackPolicy, PolicyError> {
        self.retry.validate()?;

        let name = self
            .name
            .unwrap_or_else(|| format!("{}:{}", self.primary.provider, self.primary.tier));
        let (provider, tier) = (self.primary.provider.clone(), self.primary.tier);

        let mut candidates = vec![self.primary];
        for part in self.chain {
            match part {
                ChainPart::Strategy(strategy) => {
                    candidates.extend(strategy.expand(&provider, tier, table))
                }
                ChainPart::Step(step) => candidates.push(step),
            }
        }

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(candidates.len());
        for (index, step) in candidates.into_iter().enumerate() {
            if !table.contains(&step.provider, step.tier) {
                return Err(PolicyError::UnknownStep {
                    policy: name,
                    index,
                    provider: step.provider,
                    tier: step.tier,
                });
            }
            if seen.insert(step.key()) {
                steps.push(step);
            }
        }

        Ok(FallbackPolicy {
            name,
            steps,
            retry: self.retry,
        })
    }
}

/// Plain-data policy definition as loaded from configuration.
///
/// ```toml
/// [[policies]]
/// name = "docs"
/// primary_provider = "anthropic"
/// primary_tier = "capable"
/// strategies = ["next_tier_up"]
/// custom_chain = [{ provider = "openai", tier = "capable" }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub name: String,
    pub primary_provider: String,
    pub primary_tier: Tier,
    #[serde(default)]
    pub strategies: Vec<FallbackStrategy>,
    #[serde(default)]
    pub custom_chain: Vec<FallbackStep>,
    /// Overrides the global `[retry]` section for this policy
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl PolicyDefinition {
    fn build(&self, table: &RegistryTable, default_retry: &RetryPolicy) -> Result<FallbackPolicy, PolicyError> {
        let mut builder = FallbackPolicy::builder(self.primary_provider.clone(), self.primary_tier)
            .name(self.name.clone())
            .retry(self.retry.clone().unwrap_or_else(|| default_retry.clone()));

        for strategy in &self.strategies {
            builder = builder.strategy(*strategy);
        }
        for step in &self.custom_chain {
            builder = builder.step(step.provider.clone(), step.tier, step.description.clone());
        }
        builder.build_with_table(table)
    }
}

/// Named policies plus task-type assignments.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: BTreeMap<String, Arc<FallbackPolicy>>,
    /// Normalized task type -> policy name
    assignments: BTreeMap<String, String>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate every definition, then check task assignments.
    pub fn from_definitions(
        definitions: &[PolicyDefinition],
        task_policies: &BTreeMap<String, String>,
        default_retry: &RetryPolicy,
        registry: &ModelRegistry,
    ) -> Result<Self, PolicyError> {
        let table = registry.snapshot();
        let mut set = PolicySet::new();

        for definition in definitions {
            if set.policies.contains_key(&definition.name) {
                return Err(PolicyError::DuplicatePolicy {
                    name: definition.name.clone(),
                });
            }
            let policy = definition.build(&table, default_retry)?;
            tracing::debug!(
                policy = %definition.name,
                chain = %policy.describe(),
                "Fallback policy built"
            );
            set.policies.insert(definition.name.clone(), Arc::new(policy));
        }

        for (task, policy) in task_policies {
            set.assign(task, policy)?;
        }

        Ok(set)
    }

    /// Add or replace a named policy.
    pub fn insert(&mut self, policy: FallbackPolicy) {
        self.policies
            .insert(policy.name().to_string(), Arc::new(policy));
    }

    /// Route a task type to a named policy.
    pub fn assign(&mut self, task_type: &str, policy: &str) -> Result<(), PolicyError> {
        if !self.policies.contains_key(policy) {
            return Err(PolicyError::UnknownPolicy {
                task: task_type.to_string(),
                policy: policy.to_string(),
            });
        }
        self.assignments
            .insert(normalize_task(task_type), policy.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<FallbackPolicy>> {
        self.policies.get(name).cloned()
    }

    /// The policy assigned to a task type, if any.
    pub fn for_task(&self, task_type: &str) -> Option<Arc<FallbackPolicy>> {
        self.assignments
            .get(&normalize_task(task_type))
            .and_then(|name| self.get(name))
    }

    pub fn policies(&self) -> impl Iterator<Item = &Arc<FallbackPolicy>> {
        self.policies.values()
    }

    pub fn assignments(&self) -> &BTreeMap<String, String> {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
