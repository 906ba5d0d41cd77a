use crate::executor::ErrorKind;
use crate::registry::Tier;

/// Errors raised while building fallback and retry policies.
///
/// These are construction-time failures; a policy that builds successfully
/// never fails at call time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy '{policy}' step {index} references {provider}:{tier}, which is not in the registry")]
    UnknownStep {
        policy: String,
        index: usize,
        provider: String,
        tier: Tier,
    },

    #[error("no model is registered for tier '{tier}'")]
    NoModelForTier { tier: Tier },

    #[error("{kind} errors are never retryable")]
    NonRetryableKind { kind: ErrorKind },

    #[error("invalid retry policy: {message}")]
    InvalidRetry { message: String },

    #[error("policy '{name}' is defined more than once")]
    DuplicatePolicy { name: String },

    #[error("task '{task}' is assigned to unknown policy '{policy}'")]
    UnknownPolicy { task: String, policy: String },
}
