//! Infrastructure error types.

use thiserror::Error;
use webprefs_domain::PrefsError;

/// Errors raised by infrastructure adapters.
///
/// These never cross the provider boundary: the service converts transport
/// and decode problems into classified request failures before the sync
/// engine sees them.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("http transport error: {0}")]
    Http(String),

    #[error("session validation error: {0}")]
    Auth(String),

    #[error("offline store error: {0}")]
    Storage(String),

    #[error(transparent)]
    Domain(#[from] PrefsError),
}

impl From<reqwest::Error> for InfraError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<std::io::Error> for InfraError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
