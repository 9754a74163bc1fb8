//! Single-flight refresh under a refresh call held open by a gate.

use super::*;
use async_trait::async_trait;
use bearer_auth_integration::{
    client_config, AuthError, AuthenticatedClient, Credential, CredentialStore, HttpRequest,
    HttpResponse, HttpTransport, InMemoryCredentialStore, NetworkError, RefreshError,
    RefreshState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

const REFRESH_PATH: &str = "/auth/token/refresh";

/// Accepts only `Bearer T2`; refresh calls block until the gate opens, and
/// calls to `/slow` until the slow gate does.
struct GatedServer {
    gate: Semaphore,
    slow_gate: Semaphore,
    refresh_response: HttpResponse,
    refresh_calls: AtomicUsize,
    history: Mutex<Vec<HttpRequest>>,
}

impl GatedServer {
    fn new(refresh_response: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            slow_gate: Semaphore::new(0),
            refresh_response,
            refresh_calls: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        })
    }

    fn issuing(token: &str) -> Arc<Self> {
        Self::new(HttpResponse::new(200).with_header("Authorization", format!("Bearer {}", token)))
    }

    fn open_gate(&self) {
        self.gate.add_permits(1);
    }

    fn requests_to(&self, suffix: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// URLs of requests replayed with `Bearer T2`, in arrival order.
    fn replayed_urls(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.retried && r.header("authorization") == Some("Bearer T2"))
            .map(|r| r.url.clone())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for GatedServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.history.lock().unwrap().push(request.clone());

        if request.url.ends_with(REFRESH_PATH) {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await.map_err(|e| {
                AuthError::Network(NetworkError::ConnectionFailed {
                    message: e.to_string(),
                })
            })?;
            permit.forget();
            return Ok(self.refresh_response.clone());
        }

        if request.url.ends_with("/slow") {
            let permit = self.slow_gate.acquire().await.map_err(|e| {
                AuthError::Network(NetworkError::ConnectionFailed {
                    message: e.to_string(),
                })
            })?;
            permit.forget();
        }

        match request.header("authorization") {
            Some("Bearer T2") => Ok(HttpResponse::new(200).with_body(request.url.clone())),
            _ => Ok(HttpResponse::new(401)),
        }
    }
}

type GatedClient = AuthenticatedClient<GatedServer, InMemoryCredentialStore>;

fn client_for(server: &Arc<GatedServer>) -> Arc<GatedClient> {
    let config = client_config()
        .base_url("http://api.test/api")
        .build()
        .unwrap();
    let store = Arc::new(InMemoryCredentialStore::with_credential(Credential::new(
        "T1",
    )));
    Arc::new(AuthenticatedClient::with_components(config, server.clone(), store).unwrap())
}

fn spawn_get(
    client: &Arc<GatedClient>,
    path: &str,
) -> tokio::task::JoinHandle<Result<HttpResponse, AuthError>> {
    let client = client.clone();
    let path = path.to_string();
    tokio::spawn(async move { client.get(&path).await })
}

/// Spawn the trigger and `waiters` more requests, each queued in turn.
async fn start_episode(
    client: &Arc<GatedClient>,
    waiters: usize,
) -> Vec<tokio::task::JoinHandle<Result<HttpResponse, AuthError>>> {
    let mut handles = vec![spawn_get(client, "items/0")];
    wait_until(|| client.coordinator().state() == RefreshState::Refreshing).await;

    for i in 1..=waiters {
        handles.push(spawn_get(client, &format!("items/{}", i)));
        wait_until(|| client.coordinator().waiter_count() == i).await;
    }

    handles
}

#[tokio::test]
async fn test_single_refresh_for_many_failures() {
    within_timeout(async {
        let server = GatedServer::issuing("T2");
        let client = client_for(&server);

        let handles = start_episode(&client, 4).await;
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(client.coordinator().waiter_count(), 4);

        server.open_gate();

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.status, 200);
        }
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(client.coordinator().state(), RefreshState::Idle);
        assert_eq!(client.store().read(), Some(Credential::new("T2")));
    })
    .await;
}

#[tokio::test]
async fn test_waiters_replay_in_queue_order() {
    within_timeout(async {
        let server = GatedServer::issuing("T2");
        let client = client_for(&server);

        let handles = start_episode(&client, 3).await;
        server.open_gate();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let waiter_replays: Vec<String> = server
            .replayed_urls()
            .into_iter()
            .filter(|url| !url.ends_with("items/0"))
            .collect();
        assert_eq!(
            waiter_replays,
            vec![
                "http://api.test/api/items/1",
                "http://api.test/api/items/2",
                "http://api.test/api/items/3",
            ]
        );
    })
    .await;
}

#[tokio::test]
async fn test_refresh_failure_reaches_trigger_and_waiters() {
    within_timeout(async {
        let server = GatedServer::new(HttpResponse::new(500).with_body("unavailable"));
        let client = client_for(&server);

        let handles = start_episode(&client, 2).await;
        server.open_gate();

        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(matches!(
                error,
                AuthError::Refresh(RefreshError::Rejected { status: 500, .. })
            ));
        }
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(client.store().read(), Some(Credential::new("T1")));
        assert_eq!(client.coordinator().state(), RefreshState::Idle);
    })
    .await;
}

#[tokio::test]
async fn test_missing_header_fails_whole_episode() {
    within_timeout(async {
        let server = GatedServer::new(HttpResponse::new(204));
        let client = client_for(&server);

        let handles = start_episode(&client, 2).await;
        server.open_gate();

        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(matches!(
                error,
                AuthError::Refresh(RefreshError::ProtocolViolation { .. })
            ));
        }
        assert_eq!(client.store().read(), Some(Credential::new("T1")));
    })
    .await;
}

#[tokio::test]
async fn test_replay_rejected_again_stops_after_one_refresh() {
    within_timeout(async {
        let server = GatedServer::issuing("T3");
        let client = client_for(&server);

        let handles = start_episode(&client, 1).await;
        server.open_gate();

        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(matches!(error, AuthError::RetryExhausted { status: 401, .. }));
        }
        assert_eq!(server.refresh_calls(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_aborted_trigger_releases_waiters() {
    within_timeout(async {
        let server = GatedServer::issuing("T2");
        let client = client_for(&server);

        let mut handles = start_episode(&client, 2).await;
        let trigger = handles.remove(0);
        trigger.abort();

        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(matches!(error, AuthError::Refresh(RefreshError::Abandoned)));
        }
        assert!(trigger.await.unwrap_err().is_cancelled());
        assert_eq!(client.coordinator().state(), RefreshState::Idle);
        assert_eq!(client.coordinator().waiter_count(), 0);

        // The next failure starts a fresh episode.
        server.open_gate();
        let response = spawn_get(&client, "items/9").await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(server.refresh_calls(), 2);
    })
    .await;
}

#[tokio::test]
async fn test_late_rejection_of_old_credential_reuses_refreshed_one() {
    within_timeout(async {
        let server = GatedServer::issuing("T2");
        let client = client_for(&server);

        let slow = spawn_get(&client, "slow");
        wait_until(|| server.requests_to("/slow") == 1).await;

        let fast = start_episode(&client, 0).await.remove(0);
        server.open_gate();
        assert_eq!(fast.await.unwrap().unwrap().status, 200);
        assert_eq!(client.store().read(), Some(Credential::new("T2")));

        // The slow call was sent with T1 and is only now rejected.
        server.slow_gate.add_permits(2);
        let response = slow.await.unwrap().unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(server.requests_to("/slow"), 2);
        assert_eq!(client.store().read(), Some(Credential::new("T2")));
    })
    .await;
}
