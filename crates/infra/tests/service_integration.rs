//! Integration tests for the HTTP service adapter, against a mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use webprefs_core::{BreakerImpact, RequestDispatcher};
use webprefs_domain::{FailureReason, PrefsRequest, Session, SubjectId};
use webprefs_infra::{InfraError, ServiceConfig, SessionAuthenticator, WebPreferencesService};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBJECT: &str = "069a79f444e94726a5befca90e38aaf5";

fn subject() -> SubjectId {
    SubjectId::parse(SUBJECT).expect("valid id")
}

fn session() -> Session {
    Session::new("steve", "token", subject())
}

/// Authenticator with a scripted verdict and a call counter.
struct ScriptedAuthenticator {
    verdict: bool,
    calls: AtomicUsize,
}

impl ScriptedAuthenticator {
    fn accepting() -> Arc<Self> {
        Arc::new(Self { verdict: true, calls: AtomicUsize::new(0) })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self { verdict: false, calls: AtomicUsize::new(0) })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAuthenticator for ScriptedAuthenticator {
    async fn validate(&self, _session: &Session, _server_key: &str) -> Result<bool, InfraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}

fn service_for(
    server: &MockServer,
    session: Option<Session>,
    authenticator: Arc<dyn SessionAuthenticator>,
) -> WebPreferencesService {
    let host = server.address().to_string();
    WebPreferencesService::new(ServiceConfig::new(host), session, authenticator)
        .expect("service builds")
}

fn ok_body(extra: &str) -> String {
    format!(r#"{{"response":"200 OK","uuid":"{SUBJECT}"{extra}}}"#)
}

#[tokio::test]
async fn public_get_round_trip_decodes_values() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get"))
        .and(body_string_contains(format!("i={SUBJECT}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(ok_body(r#","get":{"a.b":"1"}"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, None, ScriptedAuthenticator::accepting());
    let request =
        PrefsRequest::get(subject(), ["a.b".to_string()], false).expect("valid request");

    let response = service.dispatch(&request).await.expect("dispatch succeeds");
    assert_eq!(response.values().get("a.b").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn authenticated_set_bootstraps_the_server_key_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/key"))
        .and(body_string_contains("u=steve"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(ok_body(r#","serverid":"sk-1""#)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/set"))
        .and(body_string_contains("u=steve"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ok_body(r#","set":["k"]"#)))
        .expect(2)
        .mount(&server)
        .await;

    let authenticator = ScriptedAuthenticator::accepting();
    let service = service_for(&server, Some(session()), authenticator.clone());

    for _ in 0..2 {
        let request = PrefsRequest::set(
            subject(),
            [("k".to_string(), "v".to_string())],
            false,
        )
        .expect("valid request");
        let response = service.dispatch(&request).await.expect("dispatch succeeds");
        assert!(response.acknowledged().contains("k"));
    }

    // The key exchange ran once and the validation stayed fresh.
    assert_eq!(authenticator.call_count(), 1);
}

#[tokio::test]
async fn missing_session_fails_with_no_session_and_no_breaker_impact() {
    let server = MockServer::start().await;
    let service = service_for(&server, None, ScriptedAuthenticator::accepting());

    let request = PrefsRequest::set(subject(), [("k".to_string(), "v".to_string())], false)
        .expect("valid request");
    let error = service.dispatch(&request).await.expect_err("no session");

    assert_eq!(error.reason(), FailureReason::NoSession);
    assert_eq!(error.impact, BreakerImpact::None);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn rejected_session_fails_with_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(ok_body(r#","serverid":"sk-1""#)),
        )
        .mount(&server)
        .await;

    let service = service_for(&server, Some(session()), ScriptedAuthenticator::rejecting());
    let request = PrefsRequest::set(subject(), [("k".to_string(), "v".to_string())], false)
        .expect("valid request");

    let error = service.dispatch(&request).await.expect_err("session rejected");
    assert_eq!(error.reason(), FailureReason::NoSession);
    assert_eq!(error.impact, BreakerImpact::None);
}

#[tokio::test]
async fn failed_key_exchange_is_weighted_as_key_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"response":"500 Internal Server Error"}"#),
        )
        .mount(&server)
        .await;

    let service = service_for(&server, Some(session()), ScriptedAuthenticator::accepting());
    let request = PrefsRequest::set(subject(), [("k".to_string(), "v".to_string())], false)
        .expect("valid request");

    let error = service.dispatch(&request).await.expect_err("key exchange failed");
    assert_eq!(error.reason(), FailureReason::ServerError);
    assert_eq!(error.impact, BreakerImpact::KeyExchange);
}

#[tokio::test]
async fn key_exchange_without_a_server_key_is_still_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ok_body("")))
        .mount(&server)
        .await;

    let service = service_for(&server, Some(session()), ScriptedAuthenticator::accepting());
    let request = PrefsRequest::set(subject(), [("k".to_string(), "v".to_string())], false)
        .expect("valid request");

    let error = service.dispatch(&request).await.expect_err("no server key");
    assert_eq!(error.impact, BreakerImpact::KeyExchange);
}

#[tokio::test]
async fn unauthorized_status_maps_to_unauthorised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"response":"401 Unauthorized","message":"denied"}"#),
        )
        .mount(&server)
        .await;

    let service = service_for(&server, None, ScriptedAuthenticator::accepting());
    let request =
        PrefsRequest::get(subject(), ["a".to_string()], false).expect("valid request");

    let error = service.dispatch(&request).await.expect_err("unauthorized");
    assert_eq!(error.reason(), FailureReason::Unauthorised);
    assert_eq!(error.impact, BreakerImpact::Severity);
}

#[tokio::test]
async fn mismatched_uuid_is_rejected_regardless_of_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"response":"200 OK","uuid":"ffffffffffffffffffffffffffffffff","get":{"a":"1"}}"#,
        ))
        .mount(&server)
        .await;

    let service = service_for(&server, None, ScriptedAuthenticator::accepting());
    let request =
        PrefsRequest::get(subject(), ["a".to_string()], false).expect("valid request");

    let error = service.dispatch(&request).await.expect_err("wrong uuid");
    assert_eq!(error.reason(), FailureReason::UuidMismatch);
}

#[tokio::test]
async fn non_json_bodies_become_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let service = service_for(&server, None, ScriptedAuthenticator::accepting());
    let request =
        PrefsRequest::get(subject(), ["a".to_string()], false).expect("valid request");

    let error = service.dispatch(&request).await.expect_err("bad gateway");
    assert_eq!(error.reason(), FailureReason::ServerError);
    assert_eq!(error.impact, BreakerImpact::Severity);
}

#[tokio::test]
async fn incomplete_get_payloads_are_bad_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(ok_body(r#","get":{"a":"1"}"#)),
        )
        .mount(&server)
        .await;

    let service = service_for(&server, None, ScriptedAuthenticator::accepting());
    let request = PrefsRequest::get(subject(), ["a".to_string(), "b".to_string()], false)
        .expect("valid request");

    let error = service.dispatch(&request).await.expect_err("missing key");
    assert_eq!(error.reason(), FailureReason::BadData);
}
