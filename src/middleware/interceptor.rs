//! Response Interception
//!
//! Turns an expired-credential response into a refresh followed by a single
//! replay of the original request.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::credential::{CredentialStore, RefreshCoordinator};
use crate::error::AuthError;
use crate::middleware::RequestAuthenticator;
use crate::telemetry::{AuthMetrics, NoOpMetrics};
use crate::types::{Credential, AUTHORIZATION_HEADER};

/// Observes responses and replays requests rejected for an expired credential.
pub struct ResponseAuthorizationInterceptor<T: HttpTransport, C: CredentialStore> {
    transport: Arc<T>,
    authenticator: RequestAuthenticator<C>,
    coordinator: Arc<RefreshCoordinator<T, C>>,
    expired_status: u16,
    metrics: Arc<dyn AuthMetrics>,
}

impl<T: HttpTransport, C: CredentialStore> ResponseAuthorizationInterceptor<T, C> {
    /// Create an interceptor replaying through `transport`.
    pub fn new(
        transport: Arc<T>,
        authenticator: RequestAuthenticator<C>,
        coordinator: Arc<RefreshCoordinator<T, C>>,
        expired_status: u16,
    ) -> Self {
        Self {
            transport,
            authenticator,
            coordinator,
            expired_status,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Record replays into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn AuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Status treated as an expired credential.
    pub fn expired_status(&self) -> u16 {
        self.expired_status
    }

    /// Handle the `response` received for `request`.
    ///
    /// Responses other than the expired status pass through untouched. An
    /// expired status on a fresh request returns the replayed response
    /// instead; on a replayed request it fails with
    /// [`AuthError::RetryExhausted`].
    ///
    /// A request sent with a credential that has since been replaced in the
    /// store is replayed with the stored one without another refresh.
    pub async fn intercept(
        &self,
        mut request: HttpRequest,
        response: HttpResponse,
    ) -> Result<HttpResponse, AuthError> {
        if response.status != self.expired_status {
            return Ok(response);
        }

        if request.retried {
            return Err(self.retry_exhausted(&request, response.status));
        }
        request.retried = true;

        let sent_with = request
            .header(AUTHORIZATION_HEADER)
            .and_then(Credential::from_authorization_header);
        if let Some(current) = self.authenticator.current() {
            if sent_with.as_ref() != Some(&current) {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    "Credential already replaced, replaying without refresh"
                );
                return self.replay(request, &current).await;
            }
        }

        debug!(method = %request.method, url = %request.url, "Credential expired, refreshing");
        let credential = self.coordinator.refresh().await?;
        self.replay(request, &credential).await
    }

    async fn replay(
        &self,
        mut request: HttpRequest,
        credential: &Credential,
    ) -> Result<HttpResponse, AuthError> {
        RequestAuthenticator::<C>::attach(&mut request, credential);
        self.authenticator.authenticate(&mut request);

        let response = match self.transport.send(request.clone()).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_replay_failed();
                warn!(method = %request.method, url = %request.url, error = %e, "Replay failed");
                return Err(e);
            }
        };
        self.metrics.record_replay(response.status);
        debug!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            "Replayed request"
        );

        if response.status == self.expired_status {
            return Err(self.retry_exhausted(&request, response.status));
        }

        Ok(response)
    }

    fn retry_exhausted(&self, request: &HttpRequest, status: u16) -> AuthError {
        self.metrics.record_retry_exhausted();
        warn!(
            method = %request.method,
            url = %request.url,
            status,
            "Request rejected again after credential refresh"
        );
        AuthError::RetryExhausted {
            method: request.method.to_string(),
            url: request.url.clone(),
            status,
        }
    }
}
