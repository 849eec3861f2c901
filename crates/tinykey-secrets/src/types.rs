use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tinykey_core::Sensitive;

use crate::file_store::{FileBackend, FileBackendOptions};
use crate::keyring_store::{KeyringBackend, KeyringBackendOptions};
use crate::memory_store::InMemoryBackend;

pub const DEFAULT_SERVICE: &str = "tinykey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Keyring,
    File,
    Memory,
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" | "os" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(BackendError::Rejected(format!(
                "unknown backend kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub kind: BackendKind,
    /// Namespace for keyring entries. Stores with different services never
    /// see each other's keys.
    pub service: String,
    pub data_dir: PathBuf,
    /// Required for `File` backend.
    pub passphrase: Option<Sensitive<String>>,
}

/// Failure reported by a [`SecureBackend`] primitive.
///
/// "Not found" is deliberately absent: `get` reports it as `Ok(None)` and
/// `delete` as `Ok(())`.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid secret key")]
    InvalidKey,
    #[error("an entry already exists for this key")]
    Duplicate,
    #[error("secret backend rejected the request: {0}")]
    Rejected(String),
    #[error("secret backend unavailable: {0}")]
    Unavailable(String),
}

/// The capability a secure credential store exposes to [`crate::SecretStore`].
///
/// Implementations provide confidentiality at rest and make each primitive
/// atomic for a single key. `get` must return at most one entry.
#[async_trait]
pub trait SecureBackend: Send + Sync {
    async fn put(&self, key: &str, value: Sensitive<Vec<u8>>) -> Result<(), BackendError>;

    /// Removing a key that has no entry succeeds.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Option<Sensitive<Vec<u8>>>, BackendError>;

    /// True when `put` atomically replaces an existing entry. The store then
    /// skips the delete that normally precedes every write.
    fn atomic_upsert(&self) -> bool {
        false
    }
}

pub async fn open_backend(
    opts: BackendOptions,
) -> Result<Arc<dyn SecureBackend>, BackendError> {
    match opts.kind {
        BackendKind::Keyring => Ok(Arc::new(KeyringBackend::new(KeyringBackendOptions {
            service: opts.service,
        }))),
        BackendKind::File => {
            let passphrase = opts.passphrase.ok_or_else(|| {
                BackendError::Rejected(
                    "missing passphrase for file backend (set TINYKEY_PASSPHRASE)".to_string(),
                )
            })?;
            Ok(Arc::new(
                FileBackend::open(FileBackendOptions {
                    root_dir: opts.data_dir.join("secrets").join(&opts.service),
                    passphrase,
                })
                .await?,
            ))
        }
        BackendKind::Memory => Ok(Arc::new(InMemoryBackend::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_kind() {
        assert_eq!("keyring".parse::<BackendKind>().unwrap(), BackendKind::Keyring);
        assert_eq!(" File ".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!("mem".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!(matches!(
            "vault".parse::<BackendKind>(),
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn file_backend_requires_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let res = open_backend(BackendOptions {
            kind: BackendKind::File,
            service: DEFAULT_SERVICE.to_string(),
            data_dir: dir.path().to_path_buf(),
            passphrase: None,
        })
        .await;
        assert!(matches!(res, Err(BackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn opens_isolated_file_vaults_per_service() {
        let dir = tempfile::tempdir().unwrap();
        let open = |service: &str| {
            open_backend(BackendOptions {
                kind: BackendKind::File,
                service: service.to_string(),
                data_dir: dir.path().to_path_buf(),
                passphrase: Some(Sensitive("passphrase".to_string())),
            })
        };
        let a = open("app-a").await.unwrap();
        let b = open("app-b").await.unwrap();

        a.put("token", Sensitive(b"abc123".to_vec())).await.unwrap();
        assert!(b.get("token").await.unwrap().is_none());
        assert!(a.atomic_upsert());
    }

    #[test]
    fn options_debug_redacts_passphrase() {
        let opts = BackendOptions {
            kind: BackendKind::File,
            service: DEFAULT_SERVICE.to_string(),
            data_dir: PathBuf::from("/tmp/data"),
            passphrase: Some(Sensitive("hunter2-pass".to_string())),
        };
        let out = format!("{opts:?}");
        assert!(!out.contains("hunter2-pass"));
        assert!(out.contains("Some([REDACTED])"));
    }
}
