use std::string::FromUtf8Error;
use std::sync::Arc;

use thiserror::Error;
use tinykey_core::Sensitive;
use tracing::{debug, warn};

use crate::types::{BackendError, SecureBackend};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret key must not be empty")]
    InvalidKey,
    #[error("stored secret is not valid utf-8")]
    Encoding(#[from] FromUtf8Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Save/read facade over a [`SecureBackend`].
///
/// Two flavors of every operation are offered:
/// - `try_*` returns a `Result` and keeps "not found" (`Ok(None)`) apart from
///   backend failures;
/// - the plain methods flatten every failure to `false` / `None`.
///
/// A save deletes any previous entry and then inserts, unless the backend
/// advertises an atomic upsert. The two calls are not atomic: a `false` from
/// [`SecretStore::save`] leaves the key unchanged, removed, or replaced.
/// Callers that need exclusive per-key writes serialize them themselves.
#[derive(Clone)]
pub struct SecretStore {
    backend: Arc<dyn SecureBackend>,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn SecureBackend>) -> Self {
        Self { backend }
    }

    pub async fn try_save(&self, key: &str, secret: Sensitive<Vec<u8>>) -> Result<(), SecretError> {
        validate_key(key)?;
        if !self.backend.atomic_upsert() {
            if let Err(e) = self.backend.delete(key).await {
                warn!(key, error = %e, "delete before put failed; continuing");
            }
        }
        self.backend.put(key, secret).await?;
        debug!(key, "saved secret");
        Ok(())
    }

    pub async fn try_save_string(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.try_save(key, Sensitive(value.as_bytes().to_vec())).await
    }

    /// `Ok(None)` when no entry exists for `key`.
    pub async fn try_read(&self, key: &str) -> Result<Option<Sensitive<Vec<u8>>>, SecretError> {
        validate_key(key)?;
        Ok(self.backend.get(key).await?)
    }

    pub async fn try_read_string(&self, key: &str) -> Result<Option<Sensitive<String>>, SecretError> {
        match self.try_read(key).await? {
            Some(bytes) => Ok(Some(bytes.into_utf8()?)),
            None => Ok(None),
        }
    }

    pub async fn try_remove(&self, key: &str) -> Result<(), SecretError> {
        validate_key(key)?;
        self.backend.delete(key).await?;
        debug!(key, "removed secret");
        Ok(())
    }

    /// Returns `true` only if the new secret was stored.
    pub async fn save(&self, key: &str, secret: Sensitive<Vec<u8>>) -> bool {
        flatten(key, "save", self.try_save(key, secret).await).is_some()
    }

    pub async fn save_string(&self, key: &str, value: &str) -> bool {
        flatten(key, "save", self.try_save_string(key, value).await).is_some()
    }

    /// Absent, inaccessible and unreadable entries all read as `None`.
    pub async fn read(&self, key: &str) -> Option<Sensitive<Vec<u8>>> {
        flatten(key, "read", self.try_read(key).await).flatten()
    }

    /// `None` also when the stored bytes are not UTF-8.
    pub async fn read_string(&self, key: &str) -> Option<Sensitive<String>> {
        flatten(key, "read", self.try_read_string(key).await).flatten()
    }

    pub async fn remove(&self, key: &str) -> bool {
        flatten(key, "remove", self.try_remove(key).await).is_some()
    }
}

fn flatten<T>(key: &str, op: &'static str, res: Result<T, SecretError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, op, error = %e, "secret store operation failed");
            None
        }
    }
}

fn validate_key(key: &str) -> Result<(), SecretError> {
    if key.is_empty() {
        Err(SecretError::InvalidKey)
    } else {
        Ok(())
    }
}
