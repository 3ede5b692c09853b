//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RmbgError>;

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum RmbgError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Every configured model source failed
    #[error("Model acquisition failed: {0}")]
    ModelAcquisition(String),

    /// The numeric backend or isolated execution unit could not be created
    #[error("Execution context unavailable: {0}")]
    ExecutionContext(String),

    /// Backend inference errors, including `run` before a session exists
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Buffer shape or pipeline stage errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Network failures while downloading a model artifact
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RmbgError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new model acquisition error
    pub fn acquisition<S: Into<String>>(msg: S) -> Self {
        Self::ModelAcquisition(msg.into())
    }

    /// Create a new execution context error
    pub fn execution_context<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionContext(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {info})"),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{stage}'{input_context}: {details}"
        ))
    }

    /// Whether a later attempt at the failing operation may succeed.
    ///
    /// A failed model acquisition can be retried against the same source
    /// list; a missing execution context cannot be recovered within the
    /// lifetime of the session that observed it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelAcquisition(_) | Self::Network(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RmbgError::acquisition("all 3 sources failed");
        assert_eq!(
            err.to_string(),
            "Model acquisition failed: all 3 sources failed"
        );

        let err = RmbgError::execution_context("worker thread could not be spawned");
        assert!(err.to_string().starts_with("Execution context unavailable"));

        let err = RmbgError::inference("no session loaded");
        assert_eq!(err.to_string(), "Inference error: no session loaded");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RmbgError = io_err.into();
        assert!(matches!(err, RmbgError::Io(_)));
    }

    #[test]
    fn test_file_io_error_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = RmbgError::file_io_error("read model file", "/tmp/model.onnx", &io_err);
        let msg = err.to_string();
        assert!(msg.contains("read model file"));
        assert!(msg.contains("/tmp/model.onnx"));
    }

    #[test]
    fn test_config_value_error_format() {
        let err = RmbgError::config_value_error("worker count", 0, "1-256", Some(2));
        let msg = err.to_string();
        assert!(msg.contains("worker count"));
        assert!(msg.contains("1-256"));
        assert!(msg.contains("Recommended: 2"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RmbgError::acquisition("sources exhausted").is_retryable());
        assert!(RmbgError::network("timeout").is_retryable());
        assert!(!RmbgError::execution_context("no backend").is_retryable());
        assert!(!RmbgError::inference("bad shape").is_retryable());
    }
}
