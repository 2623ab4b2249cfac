//! Decoded service responses.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Status class of a response, derived from the 3-digit code prefix of the
/// `response` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Throttled,
    Unauthorized,
    ServerError,
    Unknown,
}

/// Structured form of a service reply.
///
/// All fields other than `response` are optional; which ones are present
/// depends on the endpoint that was called.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Status line, e.g. `"200 OK"`.
    #[serde(default)]
    pub response: String,

    /// Optional human-readable detail, usually present on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Echo of the subject id the request targeted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Per-host session key, only returned by the key exchange.
    #[serde(rename = "serverid", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// Advisory rate limit from the service; currently unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,

    /// Fetched key/value pairs for a Get.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<HashMap<String, String>>,

    /// Keys acknowledged as written for a Set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Vec<String>>,
}

impl ServiceResponse {
    /// Decode a raw response body.
    ///
    /// A body that is not valid JSON becomes a synthetic server-error
    /// response rather than a decode error, so that malformed payloads flow
    /// through the same failure classification as explicit 500s.
    pub fn decode(body: &str) -> Self {
        match serde_json::from_str::<Self>(body) {
            Ok(response) => response,
            Err(err) => Self {
                response: "500 Invalid JSON".to_string(),
                message: Some(err.to_string()),
                ..Self::default()
            },
        }
    }

    /// Classify the status line by its code prefix.
    pub fn status(&self) -> StatusClass {
        if self.response.starts_with("200") {
            StatusClass::Success
        } else if self.response.starts_with("429") {
            StatusClass::Throttled
        } else if self.response.starts_with("401") {
            StatusClass::Unauthorized
        } else if self.response.starts_with("500") {
            StatusClass::ServerError
        } else {
            StatusClass::Unknown
        }
    }

    pub fn has_values(&self) -> bool {
        self.get.is_some()
    }

    /// Fetched key/value pairs, empty when the response carried none.
    pub fn values(&self) -> HashMap<String, String> {
        self.get.clone().unwrap_or_default()
    }

    pub fn has_acknowledged(&self) -> bool {
        self.set.is_some()
    }

    /// Keys the service acknowledged as written, empty when absent.
    pub fn acknowledged(&self) -> HashSet<String> {
        self.set.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_get_response() {
        let body = r#"{
            "response": "200 OK",
            "uuid": "069a79f444e94726a5befca90e38aaf5",
            "get": {"a.b": "1", "c": ""}
        }"#;
        let response = ServiceResponse::decode(body);
        assert_eq!(response.status(), StatusClass::Success);
        assert_eq!(response.uuid.as_deref(), Some("069a79f444e94726a5befca90e38aaf5"));
        assert!(response.has_values());
        assert_eq!(response.values().get("a.b").map(String::as_str), Some("1"));
        assert!(!response.has_acknowledged());
    }

    #[test]
    fn decodes_a_set_response() {
        let body = r#"{"response":"200 OK","uuid":"x","set":["a","b"]}"#;
        let response = ServiceResponse::decode(body);
        assert!(response.has_acknowledged());
        assert_eq!(response.acknowledged(), HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn malformed_json_becomes_a_server_error() {
        let response = ServiceResponse::decode("<html>gateway timeout</html>");
        assert_eq!(response.status(), StatusClass::ServerError);
        assert!(response.message.is_some());
    }

    #[test]
    fn status_classification_uses_code_prefixes() {
        let status = |line: &str| ServiceResponse {
            response: line.to_string(),
            ..ServiceResponse::default()
        }
        .status();

        assert_eq!(status("200 OK"), StatusClass::Success);
        assert_eq!(status("200"), StatusClass::Success);
        assert_eq!(status("429 Too Many Requests"), StatusClass::Throttled);
        assert_eq!(status("401 Unauthorized"), StatusClass::Unauthorized);
        assert_eq!(status("500 Internal Server Error"), StatusClass::ServerError);
        assert_eq!(status("302 Found"), StatusClass::Unknown);
        assert_eq!(status(""), StatusClass::Unknown);
    }
}
