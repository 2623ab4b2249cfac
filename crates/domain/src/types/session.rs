//! Session credentials supplied by the host.

use std::fmt;

use crate::types::ids::SubjectId;

/// Credentials for the local user, looked up by the embedding host.
///
/// The session token is an opaque secret; `Debug` redacts it so request
/// traces never leak credentials into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
    session_token: String,
    profile_id: SubjectId,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        session_token: impl Into<String>,
        profile_id: SubjectId,
    ) -> Self {
        Self { username: username.into(), session_token: session_token.into(), profile_id }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Id of the profile this session belongs to.
    ///
    /// Preference sets for any other id are read-only.
    pub fn profile_id(&self) -> &SubjectId {
        &self.profile_id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("session_token", &"<redacted>")
            .field("profile_id", &self.profile_id)
            .finish()
    }
}
