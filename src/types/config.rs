//! Configuration Types
//!
//! Client configuration for the authenticated HTTP pipeline.

use std::time::Duration;
use url::Url;

use crate::error::{AuthError, ProtocolError};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
/// Default refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh";
/// Default login endpoint, relative to the base URL.
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
/// Default key under which the credential is persisted.
pub const DEFAULT_CREDENTIAL_KEY: &str = "accessToken";
/// Status the server uses to signal an expired credential.
pub const DEFAULT_EXPIRED_STATUS: u16 = 401;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Authenticated client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL every relative request path is resolved against.
    pub base_url: String,
    /// Refresh endpoint path (or absolute URL).
    pub refresh_path: String,
    /// Login endpoint path (or absolute URL).
    pub login_path: String,
    /// Persistence key for the credential.
    pub credential_key: String,
    /// Response status treated as "credential expired".
    pub expired_status: u16,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Largest accepted response body.
    pub max_response_size: usize,
    /// Keep server cookies so refresh calls carry the session.
    pub cookie_store: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            credential_key: DEFAULT_CREDENTIAL_KEY.to_string(),
            expired_status: DEFAULT_EXPIRED_STATUS,
            timeout: DEFAULT_TIMEOUT,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            cookie_store: true,
        }
    }
}

impl ClientConfig {
    /// Resolve a request path against the base URL.
    ///
    /// Absolute `http(s)` URLs are returned unchanged.
    pub fn endpoint(&self, path: &str) -> Result<String, AuthError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map(String::from).map_err(|_| {
                AuthError::Protocol(ProtocolError::InvalidUrl {
                    url: path.to_string(),
                })
            });
        }

        let base = self.base_url.trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined)
            .map(String::from)
            .map_err(|_| AuthError::Protocol(ProtocolError::InvalidUrl { url: joined }))
    }

    /// Absolute refresh endpoint URL.
    pub fn refresh_url(&self) -> Result<String, AuthError> {
        self.endpoint(&self.refresh_path)
    }

    /// Absolute login endpoint URL.
    pub fn login_url(&self) -> Result<String, AuthError> {
        self.endpoint(&self.login_path)
    }
}
