//! Error Handling Module
//!
//! Defines the error type shared by every stage of the training pipeline.
//! Errors name the offending path or class so a failed run can be diagnosed
//! without re-running it.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the transfer-learning pipeline
#[derive(Error, Debug)]
pub enum TransferError {
    /// An image could not be opened or decoded
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset layout or contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A class has no samples in the subset used for class weights
    #[error("Class '{class}' (index {index}) has no training samples; cannot compute its class weight")]
    EmptyClass { class: String, index: usize },

    /// Classification needs at least two classes
    #[error("Found {0} class directories with images; at least 2 are required")]
    TooFewClasses(usize),

    /// Tensor or image shape does not match what the pipeline expects
    #[error("Shape mismatch for {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Error with model construction or weight loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error during a training phase
    #[error("Training error: {0}")]
    Training(String),

    /// Loss became NaN or infinite
    #[error("Loss diverged in {phase} at epoch {epoch}, batch {batch}: {value}")]
    Divergence {
        phase: String,
        epoch: usize,
        batch: usize,
        value: f64,
    },

    /// Error reading or writing a checkpoint
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for the pipeline
pub type Result<T> = std::result::Result<T, TransferError>;

impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| TransferError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| TransferError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TransferError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| TransferError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransferError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_load_error_names_path() {
        let path = PathBuf::from("/data/cats/broken.jpg");
        let err = TransferError::ImageLoad(path, "unexpected EOF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("broken.jpg"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn test_empty_class_names_class() {
        let err = TransferError::EmptyClass {
            class: "tulips".to_string(),
            index: 3,
        };
        assert!(err.to_string().contains("'tulips'"));
    }

    #[test]
    fn test_too_few_classes_message() {
        assert!(TransferError::TooFewClasses(1)
            .to_string()
            .contains("at least 2"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let with_context = result.context("Failed to read file");
        assert!(matches!(with_context, Err(TransferError::InvalidInput(_))));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        assert!(opt.context("Value was None").is_err());
    }
}
