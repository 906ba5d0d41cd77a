use super::Tier;

/// Errors that can occur during registry operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("model not found for {provider}:{tier}")]
    NotFound { provider: String, tier: Tier },

    #[error("duplicate registry entry for {provider}:{tier}")]
    DuplicateEntry { provider: String, tier: Tier },

    #[error("invalid model at index {index}: {message}")]
    InvalidModel { index: usize, message: String },
}
