//! The reqwest-backed request dispatcher.
//!
//! One service instance serves one host. It owns the HTTP client, the
//! per-host server-key cache (derived once per process via the `/key`
//! bootstrap) and the session-validation freshness window. Transport and
//! decode problems never escape as errors; they are converted to
//! classified request failures before the sync engine sees them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;
use webprefs_core::{BreakerImpact, DispatchError, RequestDispatcher};
use webprefs_domain::constants::{HTTP_TIMEOUT_MSEC, SESSION_FRESHNESS_SECS};
use webprefs_domain::{
    FailureReason, PrefsError, PrefsRequest, RequestFailure, ServiceResponse, Session,
};

use crate::auth::SessionAuthenticator;

/// Configuration for a [`WebPreferencesService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bare service host (optionally with port), no scheme.
    pub host: String,
    /// Connect/read timeout for one exchange.
    pub http_timeout: Duration,
    /// How long a successful session validation stays fresh.
    pub session_freshness: Duration,
}

impl ServiceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http_timeout: Duration::from_millis(HTTP_TIMEOUT_MSEC),
            session_freshness: Duration::from_secs(SESSION_FRESHNESS_SECS),
        }
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn session_freshness(mut self, freshness: Duration) -> Self {
        self.session_freshness = freshness;
        self
    }

    /// Validate the host by forming the service base URL from it.
    pub fn validate(&self) -> Result<(), PrefsError> {
        let url = Url::parse(&format!("http://{}/", self.host))
            .map_err(|_| PrefsError::InvalidHost(self.host.clone()))?;
        match url.host_str() {
            Some(_) => Ok(()),
            None => Err(PrefsError::InvalidHost(self.host.clone())),
        }
    }
}

/// Dispatches requests to one preference service host.
pub struct WebPreferencesService {
    client: Client,
    config: ServiceConfig,
    session: Option<Session>,
    authenticator: Arc<dyn SessionAuthenticator>,
    server_key: Mutex<Option<String>>,
    last_validation: Mutex<Option<Instant>>,
}

impl WebPreferencesService {
    pub fn new(
        config: ServiceConfig,
        session: Option<Session>,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> Result<Self, PrefsError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|err| PrefsError::Internal(err.to_string()))?;

        Ok(Self {
            client,
            config,
            session,
            authenticator,
            server_key: Mutex::new(None),
            last_validation: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://{}{}", self.config.host, path)
    }

    /// Perform one request/response exchange and validate the reply.
    ///
    /// Failures here count toward the provider's breaker at the reason's
    /// severity.
    async fn execute(&self, request: &PrefsRequest) -> Result<ServiceResponse, RequestFailure> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(3);
        if request.requires_authentication() {
            if let Some(session) = &self.session {
                params.push(("u", session.username().to_string()));
            }
        }
        params.push(("i", request.id().as_str().to_string()));
        params.push(("j", request.body_json()));

        let url = self.endpoint(request.path());
        debug!(%url, "connecting to preference service");

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|err| RequestFailure::new(FailureReason::ServerError, err.to_string()))?;

        self.log_debug_messages(&response);

        let body = response
            .text()
            .await
            .map_err(|err| RequestFailure::new(FailureReason::ServerError, err.to_string()))?;

        let decoded = ServiceResponse::decode(&body);
        debug!(status = %decoded.response, "received service response");

        request.validate_response(&decoded)?;
        Ok(decoded)
    }

    /// Surface server-side diagnostics carried in a response header.
    fn log_debug_messages(&self, response: &reqwest::Response) {
        let Some(value) = response
            .headers()
            .get("X-Debug-Message")
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };
        if let Ok(messages) = serde_json::from_str::<Vec<String>>(value) {
            for message in messages {
                debug!(host = %self.config.host, "[service] {message}");
            }
        }
    }

    /// Obtain the per-host server key, deriving it once via `/key`.
    ///
    /// A failed key exchange is weighted at half the provider's failure
    /// threshold: it means the whole session is unusable on this host.
    async fn ensure_server_key(&self, session: &Session) -> Result<String, DispatchError> {
        if let Some(key) = self.server_key.lock().clone() {
            return Ok(key);
        }

        info!(host = %self.config.host, "looking up server key");
        let key_request = PrefsRequest::key(session.profile_id().clone());
        let response = self.execute(&key_request).await.map_err(|failure| {
            DispatchError::new(
                RequestFailure::new(
                    FailureReason::ServerError,
                    format!("could not retrieve server key: {failure}"),
                ),
                BreakerImpact::KeyExchange,
            )
        })?;

        let Some(key) = response.server_id else {
            return Err(DispatchError::new(
                RequestFailure::new(
                    FailureReason::ServerError,
                    "the key exchange returned no server key",
                ),
                BreakerImpact::KeyExchange,
            ));
        };

        info!(host = %self.config.host, "obtained server key");
        *self.server_key.lock() = Some(key.clone());
        Ok(key)
    }

    /// Validate the session unless a prior validation is still fresh.
    ///
    /// Validation outcomes do not feed the breaker; a missing or rejected
    /// credential is a per-set permanent condition, not a service fault.
    async fn validate_session(
        &self,
        session: &Session,
        server_key: &str,
    ) -> Result<(), DispatchError> {
        {
            let last = self.last_validation.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.config.session_freshness {
                    debug!("session ticket is still fresh");
                    return Ok(());
                }
            }
        }

        let valid = self
            .authenticator
            .validate(session, server_key)
            .await
            .map_err(|err| {
                DispatchError::new(
                    RequestFailure::new(
                        FailureReason::ServerError,
                        format!("session validation failed: {err}"),
                    ),
                    BreakerImpact::None,
                )
            })?;

        if !valid {
            return Err(DispatchError::new(
                RequestFailure::new(
                    FailureReason::NoSession,
                    "the session service rejected the session",
                ),
                BreakerImpact::None,
            ));
        }

        *self.last_validation.lock() = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl RequestDispatcher for WebPreferencesService {
    #[instrument(skip(self, request), fields(path = request.path(), id = %request.id()))]
    async fn dispatch(&self, request: &PrefsRequest) -> Result<ServiceResponse, DispatchError> {
        if request.requires_authentication() {
            let Some(session) = self.session.clone() else {
                return Err(DispatchError::new(
                    RequestFailure::new(
                        FailureReason::NoSession,
                        "authentication is required but no session is available",
                    ),
                    BreakerImpact::None,
                ));
            };

            let server_key = self.ensure_server_key(&session).await?;
            self.validate_session(&session, &server_key).await?;
        }

        self.execute(request).await.map_err(DispatchError::counted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_follow_the_protocol_constants() {
        let config = ServiceConfig::new("prefs.example.net");
        assert_eq!(config.http_timeout, Duration::from_millis(5000));
        assert_eq!(config.session_freshness, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn hosts_with_ports_are_valid() {
        assert!(ServiceConfig::new("127.0.0.1:8080").validate().is_ok());
    }

    #[test]
    fn malformed_hosts_are_rejected() {
        for host in ["", "no spaces allowed", "scheme://leaked"] {
            assert!(
                matches!(
                    ServiceConfig::new(host).validate(),
                    Err(PrefsError::InvalidHost(_))
                ),
                "host {host:?} should be rejected"
            );
        }
    }
}
