//! Error types for dataset preparation operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for dataset preparation operations
pub type Result<T> = std::result::Result<T, PrepError>;

/// Error types for dataset preparation operations
///
/// `ModelLoad` is fatal for a scoring run. `InvalidImage` and `Detection`
/// are per-file failures that the corpus walker absorbs.
#[derive(Error, Debug)]
pub enum PrepError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Detector weights missing or incompatible
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// A file is not a decodable image or has zero area
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The detector failed on a single image
    #[error("Detection error: {0}")]
    Detection(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Spreadsheet parsing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// Downloaded content does not match its expected checksum
    #[error("Integrity error: {0}")]
    Integrity(String),
}

impl PrepError {
    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new detection error
    pub fn detection<S: Into<String>>(msg: S) -> Self {
        Self::Detection(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new integrity error
    pub fn integrity<S: Into<String>>(msg: S) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create network error with operation context
    pub fn network_error<E: std::fmt::Display>(operation: &str, error: E) -> Self {
        Self::Network(format!("{}: {}", operation, error))
    }

    /// Create model error with the path that failed to load
    pub fn model_error_with_context<P: AsRef<Path>>(
        operation: &str,
        model_path: P,
        error: &str,
    ) -> Self {
        Self::ModelLoad(format!(
            "Failed to {} model '{}': {}",
            operation,
            model_path.as_ref().display(),
            error
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

    /// Whether the corpus walker may skip the offending file and continue
    #[must_use]
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage(_) | Self::Image(_) | Self::Detection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrepError::invalid_config("confidence out of range");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: confidence out of range"
        );

        let err = PrepError::model_load("weights missing");
        assert_eq!(err.to_string(), "Model load error: weights missing");
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PrepError::file_io_error("read corpus", Path::new("/data/train"), &io_error);
        let message = err.to_string();
        assert!(message.contains("read corpus"));
        assert!(message.contains("/data/train"));
        assert!(matches!(err, PrepError::Io(ref e) if e.kind() == std::io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_model_error_with_context() {
        let err = PrepError::model_error_with_context(
            "load",
            Path::new("/models/yolov8n.onnx"),
            "file not found",
        );
        assert!(matches!(err, PrepError::ModelLoad(_)));
        assert!(err.to_string().contains("/models/yolov8n.onnx"));
    }

    #[test]
    fn test_config_value_error() {
        let err = PrepError::config_value_error("test ratio", 1.5, "0.0-1.0", Some(0.2));
        let message = err.to_string();
        assert!(message.contains("test ratio"));
        assert!(message.contains("1.5"));
        assert!(message.contains("Recommended: 0.2"));
    }

    #[test]
    fn test_per_file_classification() {
        assert!(PrepError::invalid_image("zero area").is_per_file());
        assert!(PrepError::detection("bad tensor").is_per_file());
        assert!(!PrepError::model_load("missing").is_per_file());
        assert!(!PrepError::invalid_config("bad").is_per_file());
    }
}
