//! Request Authentication
//!
//! Attaches the stored bearer credential to outgoing requests.

use std::sync::Arc;

use tracing::debug;

use crate::core::HttpRequest;
use crate::credential::CredentialStore;
use crate::types::{Credential, AUTHORIZATION_HEADER};

/// Adds `Authorization: Bearer <credential>` to outgoing requests.
pub struct RequestAuthenticator<C: CredentialStore> {
    store: Arc<C>,
}

impl<C: CredentialStore> RequestAuthenticator<C> {
    /// Create an authenticator reading from `store`.
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    /// Attach the stored credential to `request`.
    ///
    /// Returns `false` and leaves the request untouched when no credential is
    /// stored; the server decides what an unauthenticated request gets.
    pub fn authenticate(&self, request: &mut HttpRequest) -> bool {
        match self.store.read() {
            Some(credential) => {
                Self::attach(request, &credential);
                true
            }
            None => {
                debug!(url = %request.url, "No stored credential, sending unauthenticated");
                false
            }
        }
    }

    /// Credential currently held by the store.
    pub fn current(&self) -> Option<Credential> {
        self.store.read()
    }

    /// Replace any authorization header on `request` with `credential`.
    pub fn attach(request: &mut HttpRequest, credential: &Credential) {
        request.set_header(AUTHORIZATION_HEADER, credential.authorization_header());
    }
}

impl<C: CredentialStore> Clone for RequestAuthenticator<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}
