//! Port interfaces between the sync engine and its collaborators.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use webprefs_domain::{FailureReason, PrefsRequest, RequestFailure, ServiceResponse, SubjectId};

/// How a failed dispatch counts toward the provider's circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerImpact {
    /// Not counted (e.g. a missing credential, which is per-set permanent).
    None,
    /// Counted at the failure reason's severity.
    Severity,
    /// Counted at half the provider's failure threshold: a failed key
    /// exchange means the whole session is unusable.
    KeyExchange,
}

/// A classified dispatch failure plus its breaker weighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub failure: RequestFailure,
    pub impact: BreakerImpact,
}

impl DispatchError {
    pub fn new(failure: RequestFailure, impact: BreakerImpact) -> Self {
        Self { failure, impact }
    }

    /// A failure counted at its reason's severity.
    pub fn counted(failure: RequestFailure) -> Self {
        Self::new(failure, BreakerImpact::Severity)
    }

    pub fn reason(&self) -> FailureReason {
        self.failure.reason
    }
}

/// Executes one request/response exchange against the remote service.
///
/// Implementations own the transport, response decoding, authentication and
/// failure classification. A returned `Ok` response has already been
/// validated against the request (status class, echoed id, completeness).
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    async fn dispatch(&self, request: &PrefsRequest) -> Result<ServiceResponse, DispatchError>;
}

/// Completion callbacks delivered by the provider worker.
///
/// Invoked on the worker task, never by consumers directly. Implementations
/// must be non-blocking; a late callback (after the caller already timed
/// the batch out) must be tolerated as a harmless no-op.
pub trait PreferenceClient: Send + Sync {
    fn on_get_success(&self, id: &SubjectId, values: HashMap<String, String>);

    fn on_set_success(&self, id: &SubjectId, keys: HashSet<String>);

    fn on_get_failed(&self, id: &SubjectId, keys: HashSet<String>, reason: FailureReason);

    fn on_set_failed(&self, id: &SubjectId, keys: HashSet<String>, reason: FailureReason);
}
