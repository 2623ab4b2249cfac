//! Failure classification for request/response exchanges.
//!
//! Failures are data, not errors: they are delivered to the originating
//! preference set through provider callbacks and accumulated by the
//! provider's circuit breaker, weighted by severity.

use std::fmt;

/// Why a request/response exchange failed.
///
/// Severity feeds two policies: the preference set suspends syncing for
/// `ERROR_SUSPEND_TICKS * max(1, severity)` ticks, and the provider adds
/// the severity to its failure accumulator. A severity above 99 marks the
/// failure permanent: the affected preference set halts until restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Unclassified failure.
    Unknown,
    /// The request was malformed.
    BadParams,
    /// No credential is available; cannot succeed without external change.
    NoSession,
    /// 5xx or transport-level failure.
    ServerError,
    /// The service rejected our credentials.
    Unauthorised,
    /// The service rate-limited this client.
    Throttled,
    /// The response echoed a different id than the request targeted.
    UuidMismatch,
    /// The service omitted keys it was expected to return.
    BadData,
}

impl FailureReason {
    /// Relative weight of this failure.
    pub fn severity(self) -> u32 {
        match self {
            Self::Unknown => 1,
            Self::BadParams => 1,
            Self::NoSession => 100,
            Self::ServerError => 3,
            Self::Unauthorised => 5,
            Self::Throttled => 2,
            Self::UuidMismatch => 10,
            Self::BadData => 1,
        }
    }

    /// Whether retrying can ever succeed without external state change.
    pub fn is_permanent(self) -> bool {
        self.severity() > 99
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::BadParams => "BAD_PARAMS",
            Self::NoSession => "NO_SESSION",
            Self::ServerError => "SERVER_ERROR",
            Self::Unauthorised => "UNAUTHORISED",
            Self::Throttled => "THROTTLED",
            Self::UuidMismatch => "UUID_MISMATCH",
            Self::BadData => "BAD_DATA",
        };
        f.write_str(name)
    }
}

/// A classified failure plus human-readable context for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl RequestFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl std::error::Error for RequestFailure {}
