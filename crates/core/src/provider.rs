//! Background request provider.
//!
//! One provider serves one remote endpoint. Submissions land in a bounded
//! FIFO queue consumed by a single worker task, so all round trips for the
//! endpoint happen strictly sequentially, in submission order. The backing
//! service enforces per-client rate limits; the serialization is the
//! point, not an incidental limitation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webprefs_domain::{PrefsRequest, SubjectId};

use crate::breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::config::{ConfigError, ProviderConfig};
use crate::ports::{BreakerImpact, PreferenceClient, RequestDispatcher};

struct Task {
    request: PrefsRequest,
    client: Arc<dyn PreferenceClient>,
}

/// Owns the outbound queue, the worker task and the circuit breaker.
///
/// A provider is single-use: once its breaker trips it discards all queued
/// work, rejects all future submissions and its worker exits permanently.
/// Construct a new provider to resume service.
pub struct Provider {
    tx: mpsc::Sender<Task>,
    breaker: Arc<CircuitBreaker>,
    worker: JoinHandle<()>,
}

impl Provider {
    /// Spawn a provider worker on the current tokio runtime.
    pub fn spawn(
        dispatcher: Arc<dyn RequestDispatcher>,
        config: ProviderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(config.failure_threshold));
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let worker = tokio::spawn(Self::worker_loop(rx, dispatcher, Arc::clone(&breaker)));

        Ok(Self { tx, breaker, worker })
    }

    /// Whether the provider still accepts submissions.
    pub fn is_active(&self) -> bool {
        self.breaker.is_active()
    }

    pub fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Queue a Get for the given keys.
    ///
    /// Fails closed: returns `false` when the provider is inactive, the
    /// queue is full or the key set is unsendable. Never blocks.
    pub fn submit_get(
        &self,
        client: Arc<dyn PreferenceClient>,
        id: SubjectId,
        keys: HashSet<String>,
        private: bool,
    ) -> bool {
        if !self.is_active() {
            return false;
        }
        let request = match PrefsRequest::get(id, keys, private) {
            Ok(request) => request,
            Err(failure) => {
                warn!(%failure, "rejected malformed get request");
                return false;
            }
        };
        self.try_enqueue(request, client)
    }

    /// Queue a Set for the given key/value pairs. Same contract as
    /// [`Self::submit_get`].
    pub fn submit_set(
        &self,
        client: Arc<dyn PreferenceClient>,
        id: SubjectId,
        values: HashMap<String, String>,
        private: bool,
    ) -> bool {
        if !self.is_active() {
            return false;
        }
        let request = match PrefsRequest::set(id, values, private) {
            Ok(request) => request,
            Err(failure) => {
                warn!(%failure, "rejected malformed set request");
                return false;
            }
        };
        self.try_enqueue(request, client)
    }

    /// Abort the worker. Shutdown is total and one-way; queued work is
    /// discarded and no flush is attempted.
    pub fn shutdown(self) {
        self.worker.abort();
    }

    fn try_enqueue(&self, request: PrefsRequest, client: Arc<dyn PreferenceClient>) -> bool {
        self.tx.try_send(Task { request, client }).is_ok()
    }

    async fn worker_loop(
        mut rx: mpsc::Receiver<Task>,
        dispatcher: Arc<dyn RequestDispatcher>,
        breaker: Arc<CircuitBreaker>,
    ) {
        while let Some(Task { request, client }) = rx.recv().await {
            debug!(path = request.path(), id = %request.id(), "provider is processing a request");

            match dispatcher.dispatch(&request).await {
                Ok(response) => match &request {
                    PrefsRequest::Get { id, .. } => {
                        if response.has_values() {
                            client.on_get_success(id, response.values());
                        }
                    }
                    PrefsRequest::Set { id, .. } => {
                        if response.has_acknowledged() {
                            client.on_set_success(id, response.acknowledged());
                        }
                    }
                    PrefsRequest::Key { .. } => {
                        debug!("key exchange responses are handled by the dispatcher");
                    }
                },
                Err(error) => {
                    let reason = error.reason();
                    warn!(path = request.path(), %reason, detail = %error.failure, "request failed");

                    match &request {
                        PrefsRequest::Get { id, .. } => {
                            client.on_get_failed(id, request.affected_keys(), reason);
                        }
                        PrefsRequest::Set { id, .. } => {
                            client.on_set_failed(id, request.affected_keys(), reason);
                        }
                        PrefsRequest::Key { .. } => {}
                    }

                    let weight = match error.impact {
                        BreakerImpact::None => 0,
                        BreakerImpact::Severity => reason.severity(),
                        BreakerImpact::KeyExchange => breaker.failure_threshold() / 2,
                    };
                    if weight > 0 && breaker.record_failure(weight) {
                        rx.close();
                        let mut discarded = 0usize;
                        while rx.try_recv().is_ok() {
                            discarded += 1;
                        }
                        warn!(discarded, "provider terminated; queued requests discarded");
                        break;
                    }
                }
            }
        }
    }
}
