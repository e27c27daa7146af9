//! Error types for passport photo processing

use thiserror::Error;

/// Result type alias for photo processing operations
pub type Result<T> = std::result::Result<T, PhotoError>;

/// Error types for upload, crop, segmentation and encoding operations
#[derive(Error, Debug)]
pub enum PhotoError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding, encoding or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid request data (bad crop values, unknown size, malformed color)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Crop, composite or layout failures
    #[error("Processing error: {0}")]
    Processing(String),

    /// No face found where one was required
    #[error("No face detected")]
    NoFace,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PhotoError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
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
            format!("Failed to {} '{}': {}", operation, path_display, error),
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
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error was caused by the caller's input rather than the server
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::UnsupportedFormat(_) | Self::Image(_) | Self::NoFace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = PhotoError::invalid_config("test config error");
        assert!(matches!(err, PhotoError::InvalidConfig(_)));

        let err = PhotoError::unsupported_format("gif");
        assert!(matches!(err, PhotoError::UnsupportedFormat(_)));

        let err = PhotoError::invalid_input("scale must be positive");
        assert!(matches!(err, PhotoError::InvalidInput(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PhotoError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");
        assert_eq!(PhotoError::NoFace.to_string(), "No face detected");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PhotoError::file_io_error("read model file", Path::new("/models/u2net.onnx"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read model file"));
        assert!(error_string.contains("/models/u2net.onnx"));

        let err = PhotoError::config_value_error("JPEG quality", 150, "0-100", Some(95));
        let error_string = err.to_string();
        assert!(error_string.contains("JPEG quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("0-100"));
        assert!(error_string.contains("Recommended: 95"));

        let err = PhotoError::processing_stage_error("crop", "empty region", Some("10x10 RGB"));
        let error_string = err.to_string();
        assert!(error_string.contains("crop"));
        assert!(error_string.contains("10x10 RGB"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(PhotoError::invalid_input("bad").is_client_error());
        assert!(PhotoError::NoFace.is_client_error());
        assert!(!PhotoError::model("missing").is_client_error());
        assert!(!PhotoError::internal("lock").is_client_error());
    }
}
