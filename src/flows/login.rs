//! Login Flow
//!
//! Signs in against the login endpoint and stores the issued credential.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::credential::CredentialStore;
use crate::error::{AuthError, CredentialError};
use crate::types::{ClientConfig, Credential, AUTHORIZATION_HEADER};

/// Result of a login attempt that the server accepted.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Login response, body untouched.
    pub response: HttpResponse,
    /// Credential issued in the `Authorization` response header, if any.
    pub credential: Option<Credential>,
}

/// Login flow interface.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// Submit `body` to the login endpoint.
    async fn login(&self, body: serde_json::Value) -> Result<LoginOutcome, AuthError>;
}

/// Login flow implementation.
pub struct LoginFlowImpl<T: HttpTransport, C: CredentialStore> {
    config: ClientConfig,
    login_url: String,
    transport: Arc<T>,
    store: Arc<C>,
}

impl<T: HttpTransport, C: CredentialStore> LoginFlowImpl<T, C> {
    /// Create new login flow.
    pub fn new(config: ClientConfig, transport: Arc<T>, store: Arc<C>) -> Result<Self, AuthError> {
        Ok(Self {
            login_url: config.login_url()?,
            config,
            transport,
            store,
        })
    }
}

#[async_trait]
impl<T: HttpTransport, C: CredentialStore> LoginFlow for LoginFlowImpl<T, C> {
    async fn login(&self, body: serde_json::Value) -> Result<LoginOutcome, AuthError> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.login_url.clone())
            .with_header("accept", "application/json")
            .with_json(&body)?;
        request.timeout = Some(self.config.timeout);

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Login rejected");
            return Err(CredentialError::LoginRejected {
                status: response.status,
            }
            .into());
        }

        let credential = response
            .header(AUTHORIZATION_HEADER)
            .and_then(Credential::from_authorization_header);

        match &credential {
            Some(credential) => {
                self.store.write(credential.clone());
                info!("Signed in, credential stored");
            }
            None => warn!("Login response carried no bearer credential"),
        }

        Ok(LoginOutcome {
            response,
            credential,
        })
    }
}

/// Mock login flow for testing.
#[derive(Default)]
pub struct MockLoginFlow {
    request_history: Mutex<Vec<serde_json::Value>>,
    next_credential: Mutex<Option<Credential>>,
    next_error: Mutex<Option<AuthError>>,
}

impl MockLoginFlow {
    /// Create new mock flow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential issued by the next login.
    pub fn set_next_credential(&self, credential: Credential) -> &Self {
        *self
            .next_credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
        self
    }

    /// Set next error.
    pub fn set_next_error(&self, error: AuthError) -> &Self {
        *self.next_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    /// Get submitted login bodies.
    pub fn get_request_history(&self) -> Vec<serde_json::Value> {
        self.request_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LoginFlow for MockLoginFlow {
    async fn login(&self, body: serde_json::Value) -> Result<LoginOutcome, AuthError> {
        self.request_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body);

        if let Some(error) = self
            .next_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(error);
        }

        let credential = self
            .next_credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| Credential::new("mock-access-token"));

        Ok(LoginOutcome {
            response: HttpResponse::new(200)
                .with_header("Authorization", credential.authorization_header()),
            credential: Some(credential),
        })
    }
}

/// Create mock login flow for testing.
pub fn create_mock_login_flow() -> MockLoginFlow {
    MockLoginFlow::new()
}
