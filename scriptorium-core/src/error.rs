//! # Error handling for Scriptorium Core
//!
//! Unified error type for the editor services. Every failure in the editor
//! is recoverable: validation problems are reported before any network call,
//! persistence problems leave the editing state untouched, and local store
//! problems never block a server save.

use scriptorium_api::BackendError;
use thiserror::Error;

/// Result type used throughout Scriptorium.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::{Result, Error};
///
/// fn example_function() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Scriptorium.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input refused before reaching the backend (empty title, no category)
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// The backend rejected or failed a request
    #[error("Persistence error: {0}")]
    Persistence(#[from] BackendError),

    /// A backend call did not complete within the configured timeout
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Local fallback store errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Document and formatting errors
    #[error("Document error: {message}")]
    Document { message: String },

    /// Not found errors
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// File I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with custom message
    #[error("Error: {message}")]
    Generic { message: String },
}

impl Error {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::config("Invalid configuration file format");
    /// ```
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::validation("title", "Please add a title before publishing");
    /// ```
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new local storage error.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new document error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::document("Unknown format command 'strike'");
    /// ```
    pub fn document<S: Into<String>>(message: S) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new generic error.
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Check if this error is a validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::validation("category", "missing");
    /// assert!(error.is_validation());
    /// ```
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error came from talking to the backend.
    ///
    /// Timeouts count as persistence failures: the request may or may not
    /// have reached the server.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout { .. })
    }

    /// Check if this error is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Message suitable for a transient notice.
    ///
    /// Validation errors show only their message; everything else uses the
    /// full display form.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::validation("title", "Please add a title before publishing");
    /// assert_eq!(error.user_message(), "Please add a title before publishing");
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::Persistence(inner) => inner.to_string(),
            other => other.to_string(),
        }
    }

    /// Get the error category as a string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Error;
    ///
    /// let error = Error::config("Invalid format");
    /// assert_eq!(error.category(), "Config");
    /// ```
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::Validation { .. } => "Validation",
            Self::Persistence(_) => "Persistence",
            Self::Timeout { .. } => "Timeout",
            Self::Storage { .. } => "Storage",
            Self::Document { .. } => "Document",
            Self::NotFound { .. } => "NotFound",
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
            Self::Toml(_) => "TOML",
            Self::Generic { .. } => "Generic",
        }
    }
}

/// Convenience macro for creating errors with context.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::{error, Error};
///
/// let err = error!("Failed to load {}: {}", "post 12", "gone");
/// ```
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::Error::generic(format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::{config_error, Error};
///
/// let err = config_error!("Invalid value for {}: {}", "page_size", "zero");
/// ```
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::Error::config(format!($($arg)*))
    };
}

/// Convenience macro for creating local storage errors.
#[macro_export]
macro_rules! storage_error {
    ($($arg:tt)*) => {
        $crate::Error::storage(format!($($arg)*))
    };
}

/// Convert from `anyhow::Error` to our custom error type.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::generic(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("backend request")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let error = Error::config("Test message");
        assert!(error.is_config());
        assert_eq!(error.category(), "Config");
        assert!(error.to_string().contains("Test message"));
    }

    #[test]
    fn test_validation_error() {
        let error = Error::validation("title", "Please add a title before publishing");
        assert!(error.is_validation());
        assert!(!error.is_persistence());
        assert_eq!(error.category(), "Validation");
        assert_eq!(error.user_message(), "Please add a title before publishing");
    }

    #[test]
    fn test_backend_error_conversion() {
        let error = Error::from(BackendError::network("connection reset"));
        assert!(error.is_persistence());
        assert_eq!(error.category(), "Persistence");
        assert_eq!(error.user_message(), "network error: connection reset");
    }

    #[test]
    fn test_timeout_is_persistence() {
        let error = Error::timeout("insert post");
        assert!(error.is_persistence());
        assert_eq!(error.category(), "Timeout");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = Error::from(io_error);
        assert!(error.is_io());
        assert_eq!(error.category(), "IO");
    }

    #[test]
    fn test_error_macros() {
        let error = error!("Test {}", "message");
        assert_eq!(error.category(), "Generic");

        let config_err = config_error!("Config {}", "error");
        assert!(config_err.is_config());

        let storage_err = storage_error!("store {}", "locked");
        assert_eq!(storage_err.category(), "Storage");
    }

    #[test]
    fn test_anyhow_conversion() {
        let anyhow_err = anyhow::anyhow!("Test error");
        let error = Error::from(anyhow_err);
        assert_eq!(error.category(), "Generic");
    }

    #[test]
    fn test_error_display() {
        let error = Error::not_found("post 9");
        assert_eq!(error.to_string(), "Not found: post 9");
    }
}
