//! Error types used throughout the preference cache.
//!
//! These are the synchronous, caller-facing errors. Request/response level
//! failures never surface here; they travel as [`crate::FailureReason`]
//! data through provider callbacks instead.

use thiserror::Error;

/// Main error type for WebPrefs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefsError {
    #[error("invalid preference key [{0}]")]
    InvalidKey(String),

    #[error("invalid value for key [{key}]: {message}")]
    InvalidValue { key: String, message: String },

    #[error("preference collection for {0} is read-only")]
    ReadOnly(String),

    #[error("invalid subject id [{0}]")]
    InvalidUuid(String),

    #[error("invalid service host [{0}]")]
    InvalidHost(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for WebPrefs operations
pub type Result<T> = std::result::Result<T, PrefsError>;
