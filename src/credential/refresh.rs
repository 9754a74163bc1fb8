//! Credential Refresh
//!
//! Single-flight refresh of the bearer credential.
//!
//! The first caller to observe an expired credential while the coordinator is
//! idle becomes the leader of a refresh episode: it issues the only refresh
//! call and, once that call resolves, stores the new credential and releases
//! every caller that queued up behind it. Callers arriving while an episode is
//! in flight never touch the refresh endpoint; they wait on a completion
//! handle instead.
//!
//! ```text
//!            first failure                      refresh resolved
//!   Idle ───────────────────▶ Refreshing ─────────────────────────▶ Idle
//!                               │    ▲        (waiters drained FIFO)
//!                 later failure │    │
//!                               └────┘ enqueue waiter
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::credential::CredentialStore;
use crate::error::{AuthError, RefreshError};
use crate::telemetry::{AuthMetrics, NoOpMetrics};
use crate::types::{ClientConfig, Credential, AUTHORIZATION_HEADER};

/// Outcome delivered to every participant of a refresh episode.
pub type RefreshOutcome = Result<Credential, RefreshError>;

/// Refresh state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in progress.
    Idle,
    /// One refresh call is outstanding.
    Refreshing,
}

#[derive(Default)]
struct EpisodeState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum Role<'a, T: HttpTransport, C: CredentialStore> {
    Leader(EpisodeGuard<'a, T, C>),
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Coordinates credential refreshes so that at most one is in flight.
pub struct RefreshCoordinator<T: HttpTransport, C: CredentialStore> {
    transport: Arc<T>,
    store: Arc<C>,
    refresh_url: String,
    config: ClientConfig,
    metrics: Arc<dyn AuthMetrics>,
    episode: Mutex<EpisodeState>,
}

impl<T: HttpTransport, C: CredentialStore> RefreshCoordinator<T, C> {
    /// Create a coordinator refreshing against the configured endpoint.
    pub fn new(config: ClientConfig, transport: Arc<T>, store: Arc<C>) -> Result<Self, AuthError> {
        Ok(Self {
            refresh_url: config.refresh_url()?,
            config,
            transport,
            store,
            metrics: Arc::new(NoOpMetrics),
            episode: Mutex::new(EpisodeState::default()),
        })
    }

    /// Record refresh activity into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn AuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Current refresh state.
    pub fn state(&self) -> RefreshState {
        if self.lock_episode().refreshing {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Number of callers queued behind the in-flight refresh.
    pub fn waiter_count(&self) -> usize {
        self.lock_episode().waiters.len()
    }

    /// Obtain a refreshed credential.
    ///
    /// Starts a refresh episode if none is in flight, otherwise waits for the
    /// in-flight one. Either way the caller receives that episode's outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        match self.join() {
            Role::Leader(guard) => self.lead(guard).await,
            Role::Waiter(receiver) => receiver.await.unwrap_or(Err(RefreshError::Abandoned)),
        }
    }

    fn join(&self) -> Role<'_, T, C> {
        let mut episode = self.lock_episode();
        if episode.refreshing {
            let (sender, receiver) = oneshot::channel();
            episode.waiters.push(sender);
            let queued = episode.waiters.len();
            drop(episode);

            self.metrics.record_waiter_enqueued();
            debug!(queued, "Queued behind in-flight credential refresh");
            Role::Waiter(receiver)
        } else {
            episode.refreshing = true;
            drop(episode);

            self.metrics.record_refresh_started();
            Role::Leader(EpisodeGuard {
                coordinator: self,
                started: Instant::now(),
                settled: false,
            })
        }
    }

    async fn lead(&self, mut guard: EpisodeGuard<'_, T, C>) -> RefreshOutcome {
        info!(url = %self.refresh_url, "Refreshing credential");

        let outcome = self.request_credential().await;
        let duration_ms = guard.elapsed_ms();

        match &outcome {
            Ok(credential) => {
                self.store.write(credential.clone());
                self.metrics.record_refresh_completed(true, duration_ms);
                info!(duration_ms, "Credential refreshed");
            }
            Err(e) => {
                self.metrics.record_refresh_completed(false, duration_ms);
                warn!(error = %e, duration_ms, "Credential refresh failed");
            }
        }

        guard.settle(outcome.clone());
        outcome
    }

    async fn request_credential(&self) -> RefreshOutcome {
        // No bearer header: the session cookie is what authenticates this call.
        let request = HttpRequest::new(HttpMethod::Post, self.refresh_url.clone())
            .with_header("accept", "application/json");
        let request = HttpRequest {
            timeout: Some(self.config.timeout),
            ..request
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshError::Transport {
                source: Box::new(e),
            })?;

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        response
            .header(AUTHORIZATION_HEADER)
            .and_then(Credential::from_authorization_header)
            .ok_or_else(|| RefreshError::ProtocolViolation {
                header: AUTHORIZATION_HEADER.to_string(),
            })
    }

    /// Close the episode and resolve every waiter with `outcome`.
    ///
    /// The queue is swapped out under the lock together with the transition to
    /// idle, so a waiter that immediately fails again starts a fresh episode
    /// instead of joining the one being drained.
    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = {
            let mut episode = self.lock_episode();
            episode.refreshing = false;
            std::mem::take(&mut episode.waiters)
        };

        let released = waiters.len();
        for waiter in waiters {
            // A dropped receiver means its caller went away.
            let _ = waiter.send(outcome.clone());
        }

        if released > 0 {
            self.metrics.record_waiters_released(released, outcome.is_ok());
            debug!(released, success = outcome.is_ok(), "Released queued requests");
        }
    }

    fn lock_episode(&self) -> std::sync::MutexGuard<'_, EpisodeState> {
        self.episode.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends a refresh episode even if its leader is dropped mid-flight.
struct EpisodeGuard<'a, T: HttpTransport, C: CredentialStore> {
    coordinator: &'a RefreshCoordinator<T, C>,
    started: Instant,
    settled: bool,
}

impl<T: HttpTransport, C: CredentialStore> EpisodeGuard<'_, T, C> {
    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn settle(&mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl<T: HttpTransport, C: CredentialStore> Drop for EpisodeGuard<'_, T, C> {
    fn drop(&mut self) {
        if !self.settled {
            let duration_ms = self.elapsed_ms();
            self.coordinator
                .metrics
                .record_refresh_completed(false, duration_ms);
            warn!(duration_ms, "Credential refresh dropped before completion");
            self.coordinator.settle(Err(RefreshError::Abandoned));
        }
    }
}
