use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::StorageError;

/// Fixed persistence keys for the two token values.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// The current credential pair. Both tokens are opaque bearer strings;
/// at most one valid pair is held at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Synchronous key/value persistence for credential values.
///
/// Writes are best-effort: a failing backend downgrades to a warning and the
/// in-memory copy stays authoritative for the session.
pub trait CredentialStorage: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
}

/// Volatile backend. Credentials live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}

/// Durable backend: one file per key under a directory, so credentials
/// survive process restarts the way browser storage survives page reloads.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl CredentialStorage for FileStorage {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

/// Process-wide holder of the current credential pair.
///
/// The in-memory copy is authoritative; the backend only provides
/// persistence across restarts. Both tokens are replaced atomically on
/// [`set`](CredentialStore::set), never one without the other.
pub struct CredentialStore {
    tokens: RwLock<Option<TokenPair>>,
    backend: Arc<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Create a store over the given backend, loading any persisted pair.
    /// A lone persisted value (one key missing) is ignored: a usable
    /// credential is always a pair.
    pub fn new(backend: Arc<dyn CredentialStorage>) -> Self {
        let persisted = match (
            backend.read(ACCESS_TOKEN_KEY),
            backend.read(REFRESH_TOKEN_KEY),
        ) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
            _ => None,
        };
        Self {
            tokens: RwLock::new(persisted),
            backend,
        }
    }

    /// Volatile store, handy for tests and short-lived tools.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Current access token, if a pair is held.
    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|p| p.access_token.clone())
    }

    /// Current refresh token, if a pair is held.
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .as_ref()
            .map(|p| p.refresh_token.clone())
    }

    pub fn has_credentials(&self) -> bool {
        self.tokens.read().is_some()
    }

    /// Replace both tokens atomically and persist them best-effort.
    pub fn set(&self, pair: TokenPair) {
        *self.tokens.write() = Some(pair.clone());
        self.persist(ACCESS_TOKEN_KEY, &pair.access_token);
        self.persist(REFRESH_TOKEN_KEY, &pair.refresh_token);
    }

    /// Apply a refresh response: always a new access token, and a new
    /// refresh token only when the backend issued one. When omitted, the
    /// previously stored refresh token is retained unchanged.
    pub fn rotate(&self, access_token: String, refresh_token: Option<String>) {
        let refresh_token = refresh_token
            .or_else(|| self.refresh_token())
            .unwrap_or_default();
        self.set(TokenPair::new(access_token, refresh_token));
    }

    /// Remove all credentials. Idempotent.
    pub fn clear(&self) {
        *self.tokens.write() = None;
        self.backend.remove(ACCESS_TOKEN_KEY);
        self.backend.remove(REFRESH_TOKEN_KEY);
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.write(key, value) {
            warn!(key, error = %e, "Failed to persist credential; keeping in-memory copy");
        }
    }
}
