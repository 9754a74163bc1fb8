//! Credential Storage
//!
//! The current bearer credential and the key-value persistence it sits on.
//!
//! Reads and writes never fail: a storage medium that cannot be read simply
//! reports no credential, and the server's rejection drives a refresh.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::types::{ClientConfig, Credential};

/// Current-credential storage interface.
pub trait CredentialStore: Send + Sync {
    /// Last stored credential, if any.
    fn read(&self) -> Option<Credential>;

    /// Replace the stored credential.
    fn write(&self, credential: Credential);
}

/// Synchronous key-value persistence boundary.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str);
}

/// In-memory credential storage implementation.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    current: RwLock<Option<Credential>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn read(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, credential: Credential) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }
}

/// Credential storage persisted under a single key of a [`KeyValueStore`].
pub struct KeyValueCredentialStore<K: KeyValueStore> {
    inner: K,
    key: String,
}

impl<K: KeyValueStore> KeyValueCredentialStore<K> {
    /// Create a store persisting the credential under `key`.
    pub fn new(inner: K, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
        }
    }

    /// Create a store persisting the credential under the configured key.
    pub fn from_config(inner: K, config: &ClientConfig) -> Self {
        Self::new(inner, config.credential_key.clone())
    }

    /// Persistence key in use.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<K: KeyValueStore> CredentialStore for KeyValueCredentialStore<K> {
    fn read(&self) -> Option<Credential> {
        self.inner
            .get(&self.key)
            .filter(|value| !value.is_empty())
            .map(Credential::new)
    }

    fn write(&self, credential: Credential) {
        self.inner.set(&self.key, credential.secret());
    }
}

/// In-memory key-value store.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

/// Key-value store persisted as a JSON object in a file.
///
/// The file is loaded once at open and rewritten on every `set`.
pub struct JsonFileKeyValueStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileKeyValueStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable credential file");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read credential file");
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let contents = match serde_json::to_string_pretty(entries) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Failed to encode credential file");
                return;
            }
        };

        if let Err(e) = std::fs::write(&self.path, contents) {
            warn!(path = %self.path.display(), error = %e, "Failed to write credential file");
        } else {
            debug!(path = %self.path.display(), "Credential file updated");
        }
    }
}

impl KeyValueStore for JsonFileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }
}

/// Mock credential storage for testing.
#[derive(Default)]
pub struct MockCredentialStore {
    current: Mutex<Option<Credential>>,
    write_history: Mutex<Vec<Credential>>,
    read_count: Mutex<usize>,
}

impl MockCredentialStore {
    /// Create new mock credential store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the credential without recording a write.
    pub fn set_credential(&self, credential: Credential) -> &Self {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        self
    }

    /// Get write history.
    pub fn get_write_history(&self) -> Vec<Credential> {
        self.write_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of reads served.
    pub fn read_count(&self) -> usize {
        *self.read_count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MockCredentialStore {
    fn read(&self) -> Option<Credential> {
        *self.read_count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, credential: Credential) {
        self.write_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(credential.clone());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }
}

/// Create in-memory credential storage.
pub fn create_in_memory_credential_store() -> InMemoryCredentialStore {
    InMemoryCredentialStore::new()
}

/// Create mock credential storage for testing.
pub fn create_mock_credential_store() -> MockCredentialStore {
    MockCredentialStore::new()
}
