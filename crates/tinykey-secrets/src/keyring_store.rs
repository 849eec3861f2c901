use async_trait::async_trait;
use base64::Engine as _;
use tinykey_core::Sensitive;

use crate::types::{BackendError, SecureBackend};

#[derive(Debug, Clone)]
pub struct KeyringBackendOptions {
    pub service: String,
}

/// Platform credential store: macOS Keychain, Windows Credential Manager or
/// the Secret Service on Linux.
///
/// Payloads are base64-encoded into the password slot of `(service, key)`,
/// since the platform slot only holds text.
#[derive(Debug)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(opts: KeyringBackendOptions) -> Self {
        Self {
            service: opts.service,
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, BackendError> {
        if key.is_empty() {
            return Err(BackendError::InvalidKey);
        }
        keyring::Entry::new(&self.service, key).map_err(map_keyring_error)
    }
}

#[async_trait]
impl SecureBackend for KeyringBackend {
    async fn put(&self, key: &str, value: Sensitive<Vec<u8>>) -> Result<(), BackendError> {
        let entry = self.entry(key)?;
        let b64 = Sensitive(base64::engine::general_purpose::STANDARD.encode(value.expose()));
        tokio::task::spawn_blocking(move || entry.set_password(b64.expose()))
            .await
            .map_err(|e| BackendError::Unavailable(format!("keyring join error: {e}")))?
            .map_err(map_keyring_error)
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let entry = self.entry(key)?;
        let res = tokio::task::spawn_blocking(move || entry.delete_password())
            .await
            .map_err(|e| BackendError::Unavailable(format!("keyring join error: {e}")))?;
        match res {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Sensitive<Vec<u8>>>, BackendError> {
        let entry = self.entry(key)?;
        let res = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| BackendError::Unavailable(format!("keyring join error: {e}")))?;

        match res {
            Ok(b64) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .map_err(|e| BackendError::Rejected(format!("base64 decode error: {e}")))?;
                Ok(Some(Sensitive(bytes)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

fn map_keyring_error(err: keyring::Error) -> BackendError {
    match err {
        keyring::Error::Ambiguous(_) => BackendError::Duplicate,
        keyring::Error::TooLong(..) | keyring::Error::Invalid(..) => BackendError::InvalidKey,
        keyring::Error::NoStorageAccess(e) => {
            BackendError::Unavailable(format!("keyring locked or inaccessible: {e}"))
        }
        keyring::Error::PlatformFailure(e) => {
            BackendError::Unavailable(format!("keyring platform failure: {e}"))
        }
        other => BackendError::Rejected(format!("keyring error: {other}")),
    }
}
