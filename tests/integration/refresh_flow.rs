//! Refresh-and-replay against a WireMock server over real HTTP.

use super::*;
use bearer_auth_integration::{
    client_config, AuthError, AuthenticatedClient, Credential, CredentialError, CredentialStore,
    InMemoryCredentialStore, RefreshError, RefreshState, ReqwestHttpTransport,
};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/api/auth/token/refresh";

type TestClient = AuthenticatedClient<ReqwestHttpTransport, InMemoryCredentialStore>;

fn client_for(server: &MockServer, credential: Option<&str>) -> TestClient {
    let config = client_config()
        .base_url(format!("{}/api", server.uri()))
        .build()
        .expect("valid config");
    let transport = Arc::new(ReqwestHttpTransport::from_config(&config).expect("transport"));
    let store = Arc::new(match credential {
        Some(value) => InMemoryCredentialStore::with_credential(Credential::new(value)),
        None => InMemoryCredentialStore::new(),
    });
    AuthenticatedClient::with_components(config, transport, store).expect("client")
}

/// `GET <route>` answers 200 for `Bearer T2` and 401 otherwise.
async fn mount_protected(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1, 2, 3]})))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
}

fn refresh_issuing(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).insert_header("Authorization", format!("Bearer {}", token).as_str())
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_and_replayed() {
    let server = setup_mock_server().await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(refresh_issuing("T2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let response = assert_ok!(within_timeout(client.get("items")).await);

    assert_eq!(response.status, 200);
    let body: serde_json::Value = assert_ok!(response.json());
    assert_eq!(body["items"], json!([1, 2, 3]));
    assert_eq!(client.store().read(), Some(Credential::new("T2")));

    let requests = server.received_requests().await.unwrap();
    let refresh = requests
        .iter()
        .find(|r| r.url.path() == REFRESH_PATH)
        .unwrap();
    assert!(refresh.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_concurrent_failures_share_one_refresh() {
    let server = setup_mock_server().await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(refresh_issuing("T2").set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let results = within_timeout(join_all((0..5).map(|_| client.get("items")))).await;

    for result in results {
        assert_eq!(assert_ok!(result).status, 200);
    }
    assert_eq!(client.coordinator().state(), RefreshState::Idle);
    assert_eq!(client.coordinator().waiter_count(), 0);
}

#[tokio::test]
async fn test_rejected_refresh_reaches_every_caller() {
    let server = setup_mock_server().await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("session expired")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let results = within_timeout(join_all((0..3).map(|_| client.get("items")))).await;

    for result in results {
        let error = assert_err!(result);
        assert!(matches!(
            error,
            AuthError::Refresh(RefreshError::Rejected { status: 401, .. })
        ));
        assert!(error.needs_reauth());
    }
    assert_eq!(client.store().read(), Some(Credential::new("T1")));
}

#[tokio::test]
async fn test_refresh_without_header_is_protocol_violation() {
    let server = setup_mock_server().await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "T2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let error = assert_err!(within_timeout(client.get("items")).await);

    assert!(matches!(
        error,
        AuthError::Refresh(RefreshError::ProtocolViolation { .. })
    ));
    assert_eq!(client.store().read(), Some(Credential::new("T1")));
}

#[tokio::test]
async fn test_replay_rejected_again_is_not_retried() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(refresh_issuing("T2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let error = assert_err!(within_timeout(client.get("items")).await);

    match error {
        AuthError::RetryExhausted { method, status, .. } => {
            assert_eq!(method, "GET");
            assert_eq!(status, 401);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_other_error_statuses_pass_through() {
    let server = setup_mock_server().await;
    Mock::given(method("DELETE"))
        .and(path("/api/posts/1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(refresh_issuing("T2"))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let forbidden = assert_ok!(client.delete("posts/1").await);
    assert_eq!(forbidden.status, 403);

    let broken = assert_ok!(client.get("broken").await);
    assert_eq!(broken.status, 500);
    assert_eq!(broken.body, "boom");
}

#[tokio::test]
async fn test_login_stores_credential_and_session_feeds_refresh() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "neo@example.com", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Authorization", "Bearer T1")
                .insert_header("Set-Cookie", "refresh_session=abc; Path=/")
                .set_body_json(json!({"nickname": "neo"})),
        )
        .mount(&server)
        .await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("cookie", "refresh_session=abc"))
        .respond_with(refresh_issuing("T2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);

    let outcome = assert_ok!(
        client
            .login(&json!({"email": "neo@example.com", "password": "secret"}))
            .await
    );
    assert_eq!(outcome.credential, Some(Credential::new("T1")));
    assert!(client.is_authenticated());

    let response = assert_ok!(within_timeout(client.get("items")).await);
    assert_eq!(response.status, 200);
    assert_eq!(client.store().read(), Some(Credential::new("T2")));
}

#[tokio::test]
async fn test_login_rejected() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = client_for(&server, None);

    let error = assert_err!(client.login(&json!({"email": "x", "password": "y"})).await);

    assert!(matches!(
        error,
        AuthError::Credential(CredentialError::LoginRejected { status: 401 })
    ));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_slow_and_fast_requests_share_one_refresh() {
    let server = setup_mock_server().await;
    mount_protected(&server, "/api/items").await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(refresh_issuing("T2"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("T1"));

    let (slow, fast) =
        within_timeout(async { tokio::join!(client.get("slow"), client.get("items")) }).await;

    assert_eq!(assert_ok!(fast).status, 200);
    assert_eq!(assert_ok!(slow).status, 200);
    assert_eq!(client.store().read(), Some(Credential::new("T2")));

    let refreshes = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == REFRESH_PATH)
        .count();
    assert_eq!(refreshes, 1);
}
