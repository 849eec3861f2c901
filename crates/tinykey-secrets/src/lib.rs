//! Named secret storage over pluggable secure backends.
//!
//! - [`SecureBackend`] is the contract a credential store satisfies: `put`,
//!   best-effort `delete`, single-match `get`.
//! - [`SecretStore`] is the facade callers use: saves replace, never
//!   accumulate, and missing keys read as absent.
//! - Payloads travel as `Sensitive<Vec<u8>>` so they never reach logs.

mod file_store;
mod keyring_store;
mod memory_store;
mod store;
mod types;

pub use file_store::{FileBackend, FileBackendOptions};
pub use keyring_store::{KeyringBackend, KeyringBackendOptions};
pub use memory_store::{DuplicatePolicy, InMemoryBackend};
pub use store::{SecretError, SecretStore};
pub use types::{
    BackendError, BackendKind, BackendOptions, DEFAULT_SERVICE, SecureBackend, open_backend,
};
