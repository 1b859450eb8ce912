//! Error types for the API rewriter
//!
//! Provides structured error types for document rewriting, selector parsing,
//! rule configuration and metrics registration.
//!
//! The "skip this object" signal used by exclusion filtering is not an error;
//! it travels as [`crate::transform::Verdict`] and [`crate::Payload`].

use thiserror::Error;

/// Unified error type for the rewriter
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Document Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected value at `{path}`: expected {expected}")]
    UnexpectedType { path: String, expected: &'static str },

    #[error("Malformed CRD name `{name}`: expected <resourcetype>.<group>")]
    MalformedCrdName { name: String },

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Malformed patch operation: {0}")]
    MalformedPatch(String),

    // =========================================================================
    // Selector Errors
    // =========================================================================
    #[error("Invalid label selector `{selector}`: {reason}")]
    LabelSelector { selector: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an [`Error::UnexpectedType`] for a path
    pub fn unexpected(path: impl Into<String>, expected: &'static str) -> Self {
        Error::UnexpectedType {
            path: path.into(),
            expected,
        }
    }

    /// Whether the error was caused by the rewritten document itself.
    ///
    /// Callers serve the original bytes for these and keep going; other
    /// errors indicate a broken setup.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Error::Json(_)
                | Error::UnexpectedType { .. }
                | Error::MalformedCrdName { .. }
                | Error::Base64(_)
                | Error::MalformedPatch(_)
                | Error::LabelSelector { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
