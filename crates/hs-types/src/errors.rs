use thiserror::Error;

/// Main error type for the HyperSearch system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Invalid search space: {message}")]
    InvalidSearchSpace { message: String },

    #[error("Index out of bounds: dimension {dimension} has {len} values, got index {index}")]
    IndexOutOfBounds {
        dimension: String,
        index: usize,
        len: usize,
    },

    #[error("Dimension mismatch: expected {expected} components, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown value {value} for dimension {dimension}")]
    UnknownValue { dimension: String, value: String },

    #[error("No viable candidate: every evaluation failed")]
    NoViableCandidate,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by an external evaluator.
///
/// Never propagated out of a search: the cache records the position with a
/// score of `-inf` and the run continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Evaluation failed: {message}")]
pub struct EvaluationError {
    pub message: String,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by a surrogate model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("Surrogate has not been fitted")]
    NotFitted,

    #[error("Surrogate fit failed: {message}")]
    FitFailed { message: String },

    #[error("Surrogate prediction failed: {message}")]
    PredictFailed { message: String },
}

/// Result type alias for HyperSearch operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HsError::Internal(format!($($arg)*))
    };
}
