//! Credential Types
//!
//! The bearer credential and its `Authorization` header encoding.

use secrecy::{ExposeSecret, SecretString};

/// Authorization header name, lower-cased as stored in request/response maps.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Authentication scheme carried by every credential.
pub const BEARER_SCHEME: &str = "Bearer";

/// Opaque bearer token authorizing API calls.
#[derive(Clone)]
pub struct Credential {
    value: SecretString,
}

impl Credential {
    /// Create a credential from its raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::new(value.into()),
        }
    }

    /// Extract a credential from an `Authorization` header value.
    ///
    /// Only the bearer scheme is accepted. The scheme name is matched
    /// case-insensitively; an empty token yields `None`.
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return None;
        }

        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        Some(Self::new(token))
    }

    /// Get token value.
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", BEARER_SCHEME, self.value.expose_secret())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.secret() == other.secret()
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"[REDACTED]")
            .finish()
    }
}
