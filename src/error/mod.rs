//! Error Types
//!
//! Error hierarchy for bearer authentication and credential refresh.
//!
//! Every type here is `Clone`: a single refresh failure is delivered to the
//! triggering caller and to every queued waiter.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the authentication middleware.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{method} {url} was rejected with status {status} after credential refresh")]
    RetryExhausted {
        method: String,
        url: String,
        status: u16,
    },
}

impl AuthError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "AUTH_CONFIG",
            Self::Credential(_) => "AUTH_CREDENTIAL",
            Self::Refresh(_) => "AUTH_REFRESH",
            Self::Network(_) => "AUTH_NETWORK",
            Self::Protocol(_) => "AUTH_PROTOCOL",
            Self::RetryExhausted { .. } => "AUTH_RETRY_EXHAUSTED",
        }
    }

    /// Check if the caller has to sign in again before retrying.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Credential(CredentialError::Missing) => true,
            Self::Credential(CredentialError::LoginRejected { status }) => {
                matches!(status, 401 | 403)
            }
            Self::Refresh(RefreshError::Rejected { status, .. }) => (400..500).contains(status),
            Self::Refresh(RefreshError::ProtocolViolation { .. }) => true,
            Self::RetryExhausted { .. } => true,
            _ => false,
        }
    }

    /// Check if the error came out of a failed refresh episode.
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }

    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Credential(CredentialError::Missing) => {
                "You need to sign in to continue.".to_string()
            }
            Self::Credential(CredentialError::LoginRejected { .. }) => {
                "Sign-in failed. Please check your credentials and try again.".to_string()
            }
            Self::Refresh(_) | Self::RetryExhausted { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::Network(NetworkError::Timeout { .. }) => {
                "The request timed out. Please check your connection and try again.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Credential lifecycle error.
#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("No credential is stored")]
    Missing,

    #[error("Login rejected with status {status}")]
    LoginRejected { status: u16 },
}

/// Failure of a refresh episode.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    #[error("Refresh response carried no bearer credential in the {header} header")]
    ProtocolViolation { header: String },

    #[error("Refresh endpoint responded with status {status}")]
    Rejected { status: u16, body: String },

    #[error("Refresh request failed: {source}")]
    Transport {
        #[source]
        source: Box<AuthError>,
    },

    #[error("Refresh was abandoned before it resolved")]
    Abandoned,
}

/// Network/transport error.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },
}

/// Protocol/response handling error.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid request URL: {url}")]
    InvalidUrl { url: String },

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
