//! Authenticated Client
//!
//! High-level HTTP client that attaches the bearer credential to every call
//! and transparently refreshes it when the server reports it expired.

use serde::Serialize;
use std::sync::Arc;

use crate::core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestHttpTransport};
use crate::credential::{CredentialStore, InMemoryCredentialStore, RefreshCoordinator};
use crate::error::{AuthError, CredentialError, ProtocolError};
use crate::flows::{LoginFlow, LoginFlowImpl, LoginOutcome};
use crate::middleware::{RequestAuthenticator, ResponseAuthorizationInterceptor};
use crate::telemetry::{AuthMetrics, NoOpMetrics};
use crate::types::{ClientConfig, Credential};

/// HTTP client with bearer authentication and single-flight refresh.
pub struct AuthenticatedClient<
    T: HttpTransport = ReqwestHttpTransport,
    C: CredentialStore = InMemoryCredentialStore,
> {
    config: ClientConfig,
    transport: Arc<T>,
    store: Arc<C>,
    authenticator: RequestAuthenticator<C>,
    coordinator: Arc<RefreshCoordinator<T, C>>,
    interceptor: ResponseAuthorizationInterceptor<T, C>,
    login_flow: LoginFlowImpl<T, C>,
}

impl AuthenticatedClient<ReqwestHttpTransport, InMemoryCredentialStore> {
    /// Create a client with the default transport and an empty in-memory store.
    pub fn new(config: ClientConfig) -> Result<Self, AuthError> {
        let transport = Arc::new(ReqwestHttpTransport::from_config(&config)?);
        let store = Arc::new(InMemoryCredentialStore::new());
        Self::with_components(config, transport, store)
    }
}

impl<T: HttpTransport, C: CredentialStore> AuthenticatedClient<T, C> {
    /// Create a client with custom implementations.
    pub fn with_components(
        config: ClientConfig,
        transport: Arc<T>,
        store: Arc<C>,
    ) -> Result<Self, AuthError> {
        Self::with_telemetry(config, transport, store, Arc::new(NoOpMetrics))
    }

    /// Create a client with custom implementations recording into `metrics`.
    pub fn with_telemetry(
        config: ClientConfig,
        transport: Arc<T>,
        store: Arc<C>,
        metrics: Arc<dyn AuthMetrics>,
    ) -> Result<Self, AuthError> {
        let authenticator = RequestAuthenticator::new(store.clone());
        let coordinator = Arc::new(
            RefreshCoordinator::new(config.clone(), transport.clone(), store.clone())?
                .with_metrics(metrics.clone()),
        );
        let interceptor = ResponseAuthorizationInterceptor::new(
            transport.clone(),
            authenticator.clone(),
            coordinator.clone(),
            config.expired_status,
        )
        .with_metrics(metrics);
        let login_flow = LoginFlowImpl::new(config.clone(), transport.clone(), store.clone())?;

        Ok(Self {
            config,
            transport,
            store,
            authenticator,
            coordinator,
            interceptor,
            login_flow,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the credential store.
    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    /// Get the refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator<T, C> {
        &self.coordinator
    }

    // ========== Credential ==========

    /// Sign in with `body` and store the issued credential.
    pub async fn login<B: Serialize + ?Sized>(&self, body: &B) -> Result<LoginOutcome, AuthError> {
        let body = serde_json::to_value(body).map_err(|e| ProtocolError::InvalidJson {
            message: e.to_string(),
        })?;
        self.login_flow.login(body).await
    }

    /// Check whether a credential is stored.
    pub fn is_authenticated(&self) -> bool {
        self.store.read().is_some()
    }

    /// Get the stored credential, failing when there is none.
    pub fn require_credential(&self) -> Result<Credential, AuthError> {
        self.store
            .read()
            .ok_or(AuthError::Credential(CredentialError::Missing))
    }

    // ========== Requests ==========

    /// Build a request for `path`, resolved against the base URL.
    pub fn request(&self, method: HttpMethod, path: &str) -> Result<HttpRequest, AuthError> {
        let mut request = HttpRequest::new(method, self.config.endpoint(path)?)
            .with_header("accept", "application/json");
        request.timeout = Some(self.config.timeout);
        Ok(request)
    }

    /// Send `request` through the authentication pipeline.
    ///
    /// An expired-credential response is never returned: it is replaced by the
    /// response to the replayed request, or by the error that prevented it.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.authenticator.authenticate(&mut request);
        let response = self.transport.send(request.clone()).await?;
        self.interceptor.intercept(request, response).await
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> Result<HttpResponse, AuthError> {
        self.send(self.request(HttpMethod::Get, path)?).await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str) -> Result<HttpResponse, AuthError> {
        self.send(self.request(HttpMethod::Delete, path)?).await
    }

    /// POST `body` as JSON to `path`.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, AuthError> {
        self.send(self.request(HttpMethod::Post, path)?.with_json(body)?)
            .await
    }

    /// PUT `body` as JSON to `path`.
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, AuthError> {
        self.send(self.request(HttpMethod::Put, path)?.with_json(body)?)
            .await
    }

    /// PATCH `body` as JSON to `path`.
    pub async fn patch_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, AuthError> {
        self.send(self.request(HttpMethod::Patch, path)?.with_json(body)?)
            .await
    }
}

/// Create a client with the default transport and store.
pub fn authenticated_client(config: ClientConfig) -> Result<AuthenticatedClient, AuthError> {
    AuthenticatedClient::new(config)
}
