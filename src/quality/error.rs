/// Errors raised when recording quality feedback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QualityError {
    #[error("quality score {score} is outside [0.0, 1.0]")]
    ScoreOutOfRange { score: f64 },

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}
