use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cost/capability class of a model.
///
/// Ordered from cheapest to most capable, so `Tier::Cheap < Tier::Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Fast, inexpensive models for mechanical tasks
    Cheap,
    /// General-purpose models (the default tier)
    Capable,
    /// Most capable models, reserved for coordination and hard reasoning
    Premium,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Tier; 3] = [Tier::Cheap, Tier::Capable, Tier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cheap => "cheap",
            Tier::Capable => "capable",
            Tier::Premium => "premium",
        }
    }

    /// The next more capable tier, or `None` at the top.
    pub fn next_up(&self) -> Option<Tier> {
        match self {
            Tier::Cheap => Some(Tier::Capable),
            Tier::Capable => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }

    /// The next cheaper tier, or `None` at the bottom.
    pub fn next_down(&self) -> Option<Tier> {
        match self {
            Tier::Cheap => None,
            Tier::Capable => Some(Tier::Cheap),
            Tier::Premium => Some(Tier::Capable),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cheap" => Ok(Tier::Cheap),
            "capable" => Ok(Tier::Capable),
            "premium" => Ok(Tier::Premium),
            _ => Err(format!("Invalid tier: {}", s)),
        }
    }
}

/// A (provider, tier) pair. Keys the registry table and the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderTier {
    pub provider: String,
    pub tier: Tier,
}

impl ProviderTier {
    pub fn new(provider: impl Into<String>, tier: Tier) -> Self {
        Self {
            provider: provider.into(),
            tier,
        }
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.tier)
    }
}

/// Capability flags for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCapabilities {
    /// Whether the model supports function/tool calling
    pub supports_tools: bool,
    /// Whether the model accepts image inputs
    pub supports_vision: bool,
    /// Whether the model supports extended thinking
    pub supports_thinking: bool,
}

/// A concrete model served by a provider at a given tier.
///
/// Descriptors are immutable once loaded; the registry hands them out behind
/// `Arc` and replaces the whole table on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider name (e.g., "anthropic")
    pub provider: String,
    /// Tier this model fills for the provider
    pub tier: Tier,
    /// Provider-specific model identifier (e.g., "claude-sonnet-4-5")
    pub model_id: String,
    /// Input (prompt) cost in USD per million tokens
    pub input_price_per_million: f64,
    /// Output (completion) cost in USD per million tokens
    pub output_price_per_million: f64,
    /// Maximum output tokens per call
    pub max_output_tokens: u32,
    /// Capability flags
    #[serde(flatten)]
    pub capabilities: ModelCapabilities,
}

impl ModelDescriptor {
    pub fn new(
        provider: impl Into<String>,
        tier: Tier,
        model_id: impl Into<String>,
        input_price_per_million: f64,
        output_price_per_million: f64,
        max_output_tokens: u32,
        capabilities: ModelCapabilities,
    ) -> Self {
        Self {
            provider: provider.into(),
            tier,
            model_id: model_id.into(),
            input_price_per_million,
            output_price_per_million,
            max_output_tokens,
            capabilities,
        }
    }

    /// The (provider, tier) key for this descriptor.
    pub fn key(&self) -> ProviderTier {
        ProviderTier::new(self.provider.clone(), self.tier)
    }

    /// Estimate the USD cost of a call from its token counts.
    ///
    /// `(input/1M * input_price) + (output/1M * output_price)`
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_price_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_price_per_million;
        input_cost + output_cost
    }
}

/// Built-in catalog used when no `[[models]]` table is configured.
///
/// Prices are USD per million tokens and must be updated by hand when
/// providers change their pricing.
pub fn default_models() -> Vec<ModelDescriptor> {
    let tools = ModelCapabilities {
        supports_tools: true,
        supports_vision: false,
        supports_thinking: false,
    };
    let tools_vision = ModelCapabilities {
        supports_vision: true,
        ..tools
    };
    let full = ModelCapabilities {
        supports_thinking: true,
        ..tools_vision
    };

    vec![
        // Anthropic
        ModelDescriptor::new("anthropic", Tier::Cheap, "claude-3-5-haiku-latest", 0.80, 4.00, 8_192, tools),
        ModelDescriptor::new("anthropic", Tier::Capable, "claude-sonnet-4-5", 3.00, 15.00, 64_000, full),
        ModelDescriptor::new("anthropic", Tier::Premium, "claude-opus-4-1", 15.00, 75.00, 32_000, full),
        // OpenAI
        ModelDescriptor::new("openai", Tier::Cheap, "gpt-4o-mini", 0.15, 0.60, 16_384, tools_vision),
        ModelDescriptor::new("openai", Tier::Capable, "gpt-4o", 2.50, 10.00, 16_384, tools_vision),
        ModelDescriptor::new("openai", Tier::Premium, "o1", 15.00, 60.00, 100_000, full),
        // Google
        ModelDescriptor::new("google", Tier::Cheap, "gemini-2.0-flash", 0.10, 0.40, 8_192, tools_vision),
        ModelDescriptor::new("google", Tier::Capable, "gemini-1.5-pro", 1.25, 5.00, 8_192, tools_vision),
        ModelDescriptor::new("google", Tier::Premium, "gemini-2.5-pro", 1.25, 10.00, 65_536, full),
    ]
}
