//! The HTTP auth backend and a full login over a mock server.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use tether_session::{
    AuthBackend, HttpAuthBackend, SessionConfig, SessionError, SessionLifecycle, SessionStatus,
};
use tether_store::{MemoryTokenStore, TokenStore};
use tether_transport::{ApiRequest, HttpTransport};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A JWT-shaped token expiring `secs` from the real clock.
fn fake_jwt(secs: u64) -> String {
    let exp = (SystemTime::now() + Duration::from_secs(secs))
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

fn backend(server: &MockServer) -> HttpAuthBackend<HttpTransport> {
    HttpAuthBackend::new(HttpTransport::new(server.uri()).unwrap())
}

// =========================================================================
// HttpAuthBackend
// =========================================================================

#[tokio::test]
async fn test_send_otp_posts_phone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/send"))
        .and(body_json(json!({"phone": "+15551234567"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server).send_otp("+15551234567").await.unwrap();
}

#[tokio::test]
async fn test_verify_otp_decodes_camel_case_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/verify"))
        .and(body_json(json!({"phone": "+15551234567", "otp": "1234"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "access-1",
            "refreshToken": "refresh-1",
            "user": {"_id": "u1", "phone": "+15551234567"},
            "isNewUser": false
        })))
        .mount(&server)
        .await;

    let response = backend(&server)
        .verify_otp("+15551234567", "1234")
        .await
        .unwrap();

    assert_eq!(response.token, "access-1");
    assert_eq!(response.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(response.user.id.as_str(), "u1");
    assert!(!response.is_new_user);
}

#[tokio::test]
async fn test_verify_otp_rejected_code_is_invalid_otp() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/otp/verify"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Invalid OTP"})))
        .mount(&server)
        .await;

    let result = backend(&server).verify_otp("+15551234567", "0000").await;

    assert_eq!(result, Err(SessionError::InvalidOtp("Invalid OTP".into())));
}

#[tokio::test]
async fn test_send_otp_rejected_number_is_invalid_phone() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/otp/send"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "unsupported region"})),
        )
        .mount(&server)
        .await;

    let result = backend(&server).send_otp("+15551234567").await;

    assert_eq!(
        result,
        Err(SessionError::InvalidPhone("unsupported region".into()))
    );
}

#[tokio::test]
async fn test_send_otp_server_error_is_network() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/otp/send"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = backend(&server).send_otp("+15551234567").await;

    assert_eq!(result, Err(SessionError::Network("HTTP 502".into())));
}

#[tokio::test]
async fn test_refresh_malformed_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let result = backend(&server).refresh("refresh-1").await;

    assert!(matches!(result, Err(SessionError::Protocol(_))));
}

#[tokio::test]
async fn test_refresh_unreachable_server_is_network() {
    let backend = HttpAuthBackend::new(HttpTransport::new("http://127.0.0.1:9").unwrap());

    let result = backend.refresh("refresh-1").await;

    assert!(matches!(result, Err(SessionError::Network(_))));
}

// =========================================================================
// End to end
// =========================================================================

#[tokio::test]
async fn test_login_then_401_refreshes_and_retries_over_http() {
    let server = MockServer::start().await;
    let refresh_token = fake_jwt(3_600);

    Mock::given(method("POST"))
        .and(path("/auth/otp/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "access-1",
            "refreshToken": refresh_token,
            "user": {"id": 42},
            "isNewUser": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": refresh_token})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "access-2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "jwt expired"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let store = std::sync::Arc::new(MemoryTokenStore::new());
    let lifecycle = SessionLifecycle::new(
        HttpAuthBackend::new(transport.clone()),
        transport,
        std::sync::Arc::clone(&store),
        SessionConfig::default(),
    );

    lifecycle.send_otp("555 123 4567").await.unwrap();
    let outcome = lifecycle.verify_otp("555 123 4567", "1234").await.unwrap();
    assert!(outcome.needs_name);
    assert_eq!(lifecycle.status(), SessionStatus::Active);

    let orders: serde_json::Value = lifecycle
        .gateway()
        .send_json(ApiRequest::get("/orders"))
        .await
        .unwrap();

    assert_eq!(orders, json!([{"id": 1}]));
    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.access_token, "access-2");
    assert_eq!(stored.refresh_token.as_deref(), Some(refresh_token.as_str()));
}

#[tokio::test]
async fn test_extend_session_with_token_only_refresh_is_active() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "access-1",
            "refreshToken": fake_jwt(90),
            "user": {"id": "u1"},
            "isNewUser": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "access-2"})))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let lifecycle = SessionLifecycle::new(
        HttpAuthBackend::new(transport.clone()),
        transport,
        MemoryTokenStore::new(),
        SessionConfig::default(),
    );
    lifecycle.send_otp("555 123 4567").await.unwrap();
    lifecycle.verify_otp("555 123 4567", "1234").await.unwrap();
    assert_eq!(lifecycle.status(), SessionStatus::Warning);

    lifecycle.extend_session().await.unwrap();

    let session = lifecycle.session();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.access_token.as_deref(), Some("access-2"));
}

#[tokio::test]
async fn test_verify_otp_rejected_by_server_returns_to_authenticating() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/otp/verify"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Invalid OTP"})))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri()).unwrap();
    let lifecycle = SessionLifecycle::new(
        HttpAuthBackend::new(transport.clone()),
        transport,
        MemoryTokenStore::new(),
        SessionConfig::default(),
    );
    lifecycle.send_otp("555 123 4567").await.unwrap();

    let result = lifecycle.verify_otp("555 123 4567", "0000").await;

    assert!(matches!(result, Err(SessionError::InvalidOtp(_))));
    assert_eq!(lifecycle.status(), SessionStatus::Authenticating);
}
