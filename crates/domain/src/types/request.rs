//! Outbound request descriptions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::types::failure::{FailureReason, RequestFailure};
use crate::types::ids::SubjectId;
use crate::types::response::{ServiceResponse, StatusClass};
use crate::validation::{validate_key, validate_value};

/// An immutable description of one service operation.
///
/// Requests validate themselves at construction and know how to validate a
/// decoded response against themselves. Ordered collections keep the wire
/// payload deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsRequest {
    /// Fetch the given keys.
    Get { id: SubjectId, keys: BTreeSet<String>, private: bool },
    /// Write the given key/value pairs.
    Set { id: SubjectId, values: BTreeMap<String, String>, private: bool },
    /// Bootstrap key exchange, issued internally once per host.
    Key { id: SubjectId },
}

#[derive(Serialize)]
struct GetBody<'a> {
    get: &'a BTreeSet<String>,
    private: bool,
}

#[derive(Serialize)]
struct SetBody<'a> {
    set: &'a BTreeMap<String, String>,
    private: bool,
}

impl PrefsRequest {
    /// Build a Get request, validating the key set.
    pub fn get<I>(id: SubjectId, keys: I, private: bool) -> Result<Self, RequestFailure>
    where
        I: IntoIterator<Item = String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(RequestFailure::new(
                FailureReason::BadParams,
                "cannot request an empty key set",
            ));
        }
        for key in &keys {
            validate_key(key).map_err(|err| {
                RequestFailure::new(FailureReason::BadParams, err.to_string())
            })?;
        }
        Ok(Self::Get { id, keys, private })
    }

    /// Build a Set request, validating every key/value pair.
    pub fn set<I>(id: SubjectId, values: I, private: bool) -> Result<Self, RequestFailure>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values: BTreeMap<String, String> = values.into_iter().collect();
        for (key, value) in &values {
            validate_key(key)
                .and_then(|()| validate_value(key, value))
                .map_err(|err| RequestFailure::new(FailureReason::BadParams, err.to_string()))?;
        }
        Ok(Self::Set { id, values, private })
    }

    /// Build the bootstrap key exchange for the session's own profile.
    pub fn key(id: SubjectId) -> Self {
        Self::Key { id }
    }

    /// Path of the endpoint this request targets.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Get { .. } => "/get",
            Self::Set { .. } => "/set",
            Self::Key { .. } => "/key",
        }
    }

    /// The subject id the request targets.
    pub fn id(&self) -> &SubjectId {
        match self {
            Self::Get { id, .. } | Self::Set { id, .. } | Self::Key { id } => id,
        }
    }

    /// Whether the exchange must be preceded by session validation.
    ///
    /// Writes and the key exchange always authenticate; reads only when
    /// they touch the private collection.
    pub fn requires_authentication(&self) -> bool {
        match self {
            Self::Get { private, .. } => *private,
            Self::Set { .. } | Self::Key { .. } => true,
        }
    }

    /// The keys affected by this request, as reported to callbacks.
    pub fn affected_keys(&self) -> HashSet<String> {
        match self {
            Self::Get { keys, .. } => keys.iter().cloned().collect(),
            Self::Set { values, .. } => values.keys().cloned().collect(),
            Self::Key { .. } => HashSet::new(),
        }
    }

    /// JSON payload for the `j=` form parameter.
    pub fn body_json(&self) -> String {
        let body = match self {
            Self::Get { keys, private, .. } => {
                serde_json::to_string(&GetBody { get: keys, private: *private })
            }
            Self::Set { values, private, .. } => {
                serde_json::to_string(&SetBody { set: values, private: *private })
            }
            Self::Key { .. } => return "{}".to_string(),
        };
        // Both bodies serialize infallibly: string keys, string values.
        body.unwrap_or_else(|_| "{}".to_string())
    }

    /// Validate a decoded response against this request.
    ///
    /// Classifies the status line, requires the echoed id to match the
    /// request target regardless of status, and requires the payload to
    /// cover every requested key when one is present.
    pub fn validate_response(&self, response: &ServiceResponse) -> Result<(), RequestFailure> {
        match response.status() {
            StatusClass::Success => {}
            StatusClass::ServerError => {
                return Err(RequestFailure::new(
                    FailureReason::ServerError,
                    format!("the service returned an invalid response: {}", response.response),
                ));
            }
            status => {
                let reason = match status {
                    StatusClass::Throttled => FailureReason::Throttled,
                    StatusClass::Unauthorized => FailureReason::Unauthorised,
                    _ => FailureReason::Unknown,
                };
                let detail = response.message.as_deref().unwrap_or_default();
                return Err(RequestFailure::new(
                    reason,
                    format!("the service responded with {} {:?}", response.response, detail),
                ));
            }
        }

        if response.uuid.as_deref() != Some(self.id().as_str()) {
            return Err(RequestFailure::new(
                FailureReason::UuidMismatch,
                "the response id did not match the request",
            ));
        }

        match self {
            Self::Get { keys, .. } => {
                if let Some(values) = &response.get {
                    if let Some(missing) = keys.iter().find(|key| !values.contains_key(*key)) {
                        return Err(RequestFailure::new(
                            FailureReason::BadData,
                            format!("the service omitted requested key [{missing}]"),
                        ));
                    }
                }
            }
            Self::Set { values, .. } => {
                if let Some(acknowledged) = &response.set {
                    if let Some(missing) =
                        values.keys().find(|key| !acknowledged.contains(*key))
                    {
                        return Err(RequestFailure::new(
                            FailureReason::BadData,
                            format!("the service did not acknowledge key [{missing}]"),
                        ));
                    }
                }
            }
            Self::Key { .. } => {}
        }

        Ok(())
    }
}
