//! Session validation against an external session service.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;
use webprefs_domain::Session;

use crate::errors::InfraError;

/// Validates a session/server-key pair with an external session service.
///
/// Credential lookup itself is the host's concern; this port only answers
/// "is this session currently allowed to talk to this server key".
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Returns `Ok(true)` when the session is valid for the server key,
    /// `Ok(false)` on a clean rejection, `Err` on transport problems.
    async fn validate(&self, session: &Session, server_key: &str) -> Result<bool, InfraError>;
}

/// Authenticator that performs a GET against a configured session endpoint.
///
/// The endpoint receives the username, session token and server key as
/// query parameters and answers with a bare `OK` body on success.
pub struct HttpSessionAuthenticator {
    client: Client,
    endpoint: Url,
}

impl HttpSessionAuthenticator {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl SessionAuthenticator for HttpSessionAuthenticator {
    async fn validate(&self, session: &Session, server_key: &str) -> Result<bool, InfraError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("user", session.username())
            .append_pair("sessionId", session.session_token())
            .append_pair("serverId", server_key);

        debug!(user = session.username(), "validating session ticket");
        let body = self.client.get(url).send().await?.text().await?;
        Ok(body.trim() == "OK")
    }
}

/// Authenticator for services that do not require join validation; always
/// accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingAuthenticator;

#[async_trait]
impl SessionAuthenticator for TrustingAuthenticator {
    async fn validate(&self, _session: &Session, _server_key: &str) -> Result<bool, InfraError> {
        Ok(true)
    }
}
