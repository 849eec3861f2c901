use std::collections::HashMap;

use async_trait::async_trait;
use tinykey_core::Sensitive;
use tokio::sync::Mutex;

use crate::types::{BackendError, SecureBackend};

/// What `put` does when the key already has an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail with [`BackendError::Duplicate`], like a platform keychain.
    #[default]
    Reject,
    /// Replace the entry in a single locked step.
    Overwrite,
}

/// Process-local backend. Nothing is encrypted or persisted.
#[derive(Default)]
pub struct InMemoryBackend {
    map: Mutex<HashMap<String, Vec<u8>>>,
    policy: DuplicatePolicy,
}

impl InMemoryBackend {
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            map: Mutex::default(),
            policy,
        }
    }

    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }
}

#[async_trait]
impl SecureBackend for InMemoryBackend {
    async fn put(&self, key: &str, value: Sensitive<Vec<u8>>) -> Result<(), BackendError> {
        validate_key(key)?;
        let mut map = self.map.lock().await;
        if self.policy == DuplicatePolicy::Reject && map.contains_key(key) {
            return Err(BackendError::Duplicate);
        }
        map.insert(key.to_string(), value.into_inner());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        validate_key(key)?;
        self.map.lock().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Sensitive<Vec<u8>>>, BackendError> {
        validate_key(key)?;
        Ok(self.map.lock().await.get(key).cloned().map(Sensitive))
    }

    fn atomic_upsert(&self) -> bool {
        self.policy == DuplicatePolicy::Overwrite
    }
}

fn validate_key(key: &str) -> Result<(), BackendError> {
    if key.is_empty() {
        Err(BackendError::InvalidKey)
    } else {
        Ok(())
    }
}
