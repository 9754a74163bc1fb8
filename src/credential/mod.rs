//! Credential Management
//!
//! Storage of the current bearer credential and its single-flight refresh.

pub mod refresh;
pub mod store;

// Credential Storage
pub use store::{
    create_in_memory_credential_store, create_mock_credential_store, CredentialStore,
    InMemoryCredentialStore, InMemoryKeyValueStore, JsonFileKeyValueStore,
    KeyValueCredentialStore, KeyValueStore, MockCredentialStore,
};

// Refresh Coordination
pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshState};
