//! Error types for pkd core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in pkd core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Text does not name a known enum value.
    #[error("unknown {kind} value: {value}")]
    UnknownValue {
        /// Name of the enum being parsed.
        kind: &'static str,
        /// The rejected text.
        value: String,
    },

    /// Package id does not match `name;version;arch;data`.
    #[error("invalid package id: {message}")]
    InvalidPackageId {
        /// Description of the problem.
        message: String,
    },

    /// Filter text does not match the filter grammar.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// Another daemon holds the state directory.
    #[error("state directory locked: another daemon has exclusive access")]
    StateLocked,

    /// On-disk state is malformed.
    #[error("invalid state format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown enum value error.
    pub fn unknown_value(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownValue {
            kind,
            value: value.into(),
        }
    }

    /// Creates an invalid package id error.
    pub fn invalid_package_id(message: impl Into<String>) -> Self {
        Self::InvalidPackageId {
            message: message.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if the error came from user supplied text rather than the
    /// environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownValue { .. }
                | CoreError::InvalidPackageId { .. }
                | CoreError::InvalidFilter { .. }
        )
    }
}
