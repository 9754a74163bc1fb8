//! Configuration Builder
//!
//! Fluent builder for client configuration.

use std::time::Duration;
use url::Url;

use crate::error::{AuthError, ConfigurationError};
use crate::types::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_CREDENTIAL_KEY, DEFAULT_EXPIRED_STATUS,
    DEFAULT_LOGIN_PATH, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_REFRESH_PATH, DEFAULT_TIMEOUT,
};

/// Client configuration builder.
pub struct ClientConfigBuilder {
    base_url: String,
    refresh_path: String,
    login_path: String,
    credential_key: String,
    expired_status: u16,
    timeout: Duration,
    max_response_size: usize,
    cookie_store: bool,
}

impl ClientConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
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

    /// Set API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set refresh endpoint path.
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set login endpoint path.
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the key the credential is persisted under.
    pub fn credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    /// Set the status that marks an expired credential.
    pub fn expired_status(mut self, status: u16) -> Self {
        self.expired_status = status;
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum response body size.
    pub fn max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Enable or disable the cookie store.
    pub fn cookie_store(mut self, enable: bool) -> Self {
        self.cookie_store = enable;
        self
    }

    /// Override settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BEARER_AUTH_BASE_URL`: API base URL
    /// - `BEARER_AUTH_REFRESH_PATH`: refresh endpoint path
    /// - `BEARER_AUTH_LOGIN_PATH`: login endpoint path
    /// - `BEARER_AUTH_CREDENTIAL_KEY`: persistence key
    /// - `BEARER_AUTH_TIMEOUT_MS`: request timeout in milliseconds
    pub fn from_env(mut self) -> Self {
        if let Ok(base_url) = std::env::var("BEARER_AUTH_BASE_URL") {
            self.base_url = base_url;
        }
        if let Ok(path) = std::env::var("BEARER_AUTH_REFRESH_PATH") {
            self.refresh_path = path;
        }
        if let Ok(path) = std::env::var("BEARER_AUTH_LOGIN_PATH") {
            self.login_path = path;
        }
        if let Ok(key) = std::env::var("BEARER_AUTH_CREDENTIAL_KEY") {
            self.credential_key = key;
        }
        if let Ok(val) = std::env::var("BEARER_AUTH_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.timeout = Duration::from_millis(ms);
            }
        }
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> Result<ClientConfig, AuthError> {
        let base_url = Url::parse(&self.base_url).map_err(|_| {
            AuthError::Configuration(ConfigurationError::InvalidUrl {
                url: self.base_url.clone(),
            })
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(ConfigurationError::InvalidUrl {
                url: self.base_url,
            }));
        }

        for (field, value) in [
            ("refresh_path", &self.refresh_path),
            ("login_path", &self.login_path),
            ("credential_key", &self.credential_key),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::Configuration(ConfigurationError::MissingField {
                    field: field.to_string(),
                }));
            }
        }

        if !(400..500).contains(&self.expired_status) {
            return Err(AuthError::Configuration(ConfigurationError::InvalidConfig {
                message: format!(
                    "expired_status must be a 4xx status, got {}",
                    self.expired_status
                ),
            }));
        }

        if self.timeout.is_zero() {
            return Err(AuthError::Configuration(ConfigurationError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            }));
        }

        let config = ClientConfig {
            base_url: self.base_url,
            refresh_path: self.refresh_path,
            login_path: self.login_path,
            credential_key: self.credential_key,
            expired_status: self.expired_status,
            timeout: self.timeout,
            max_response_size: self.max_response_size,
            cookie_store: self.cookie_store,
        };

        // Endpoint paths must resolve against the base URL.
        config.refresh_url()?;
        config.login_url()?;

        Ok(config)
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a new client configuration builder.
pub fn client_config() -> ClientConfigBuilder {
    ClientConfigBuilder::new()
}
