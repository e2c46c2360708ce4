//! Error handling primitives shared across the service.
//!
//! Every failure maps onto a stable [`ErrorCode`] so HTTP clients and log
//! consumers can match on something other than the message text.

use thiserror::Error;

/// Stable error codes that cross the HTTP boundary.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Missing or malformed configuration.
    Config = 1,
    /// Model artefact could not be read or decoded.
    ModelLoad = 2,
    /// Requested model was never loaded into the store.
    ModelNotFound = 3,
    /// Input failed validation.
    InvalidInput = 4,
    /// The model raised while predicting.
    Prediction = 5,
    /// The model produced a class index with no label.
    UnknownClass = 6,
    /// Catch-all for IO and encoding failures.
    Internal = 7,
}

impl ErrorCode {
    /// Snake-case name used in JSON error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Config => "config",
            ErrorCode::ModelLoad => "model_load",
            ErrorCode::ModelNotFound => "model_not_found",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::Prediction => "prediction",
            ErrorCode::UnknownClass => "unknown_class",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Canonical error type for the crate.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("model '{0}' is not loaded")]
    ModelNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("model returned class index {0} which has no label")]
    UnknownClass(usize),

    #[error("server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type ServeResult<T> = Result<T, ServeError>;

impl ServeError {
    /// Model load helper.
    pub fn model_load(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServeError::Config(_) => ErrorCode::Config,
            ServeError::ModelLoad { .. } => ErrorCode::ModelLoad,
            ServeError::ModelNotFound(_) => ErrorCode::ModelNotFound,
            ServeError::InvalidInput(_) => ErrorCode::InvalidInput,
            ServeError::Prediction(_) => ErrorCode::Prediction,
            ServeError::UnknownClass(_) => ErrorCode::UnknownClass,
            ServeError::Server(_) | ServeError::Io(_) | ServeError::Json(_) => ErrorCode::Internal,
        }
    }

    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServeError::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Config as u32, 1);
        assert_eq!(ErrorCode::ModelLoad as u32, 2);
        assert_eq!(ErrorCode::ModelNotFound as u32, 3);
        assert_eq!(ErrorCode::InvalidInput as u32, 4);
        assert_eq!(ErrorCode::Prediction as u32, 5);
        assert_eq!(ErrorCode::UnknownClass as u32, 6);
        assert_eq!(ErrorCode::Internal as u32, 7);
    }

    #[test]
    fn only_validation_is_a_client_error() {
        assert!(ServeError::invalid("x").is_client_error());
        assert!(!ServeError::ModelNotFound("random_forest".into()).is_client_error());
        assert!(!ServeError::UnknownClass(3).is_client_error());
    }

    #[test]
    fn io_errors_map_to_internal() {
        let err: ServeError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.code().as_str(), "internal");
    }
}
