use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use async_trait::async_trait;
use base64::Engine as _;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use tinykey_core::{Sensitive, util::sha256_hex};
use tracing::debug;
use zeroize::Zeroizing;

use crate::types::{BackendError, SecureBackend};

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct FileBackendOptions {
    pub root_dir: PathBuf,
    pub passphrase: Sensitive<String>,
}

/// Encrypted vault directory: one AES-256-GCM record per key.
///
/// Records are named by the SHA-256 of their key and written through a temp
/// file plus rename, so a `put` replaces the previous record atomically.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root_dir: PathBuf,
    key: Zeroizing<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    salt_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretRecord {
    key: String,
    nonce_b64: String,
    ciphertext_b64: String,
}

impl FileBackend {
    pub async fn open(opts: FileBackendOptions) -> Result<Self, BackendError> {
        tokio::fs::create_dir_all(&opts.root_dir)
            .await
            .map_err(|e| BackendError::Unavailable(format!("create vault dir error: {e}")))?;

        let meta_path = opts.root_dir.join("meta.json");
        let salt = match tokio::fs::try_exists(&meta_path).await {
            Ok(true) => read_meta(&meta_path).await?,
            Ok(false) => init_meta(&meta_path).await?,
            Err(e) => {
                return Err(BackendError::Unavailable(format!("stat meta error: {e}")));
            }
        };

        let key = derive_key(opts.passphrase.expose(), &salt)?;
        Ok(Self {
            root_dir: opts.root_dir,
            key,
        })
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, BackendError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(BackendError::InvalidKey);
        }
        let file = sha256_hex(key.as_bytes());
        Ok(self.root_dir.join(file).with_extension("json"))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

#[async_trait]
impl SecureBackend for FileBackend {
    async fn put(&self, key: &str, value: Sensitive<Vec<u8>>) -> Result<(), BackendError> {
        let path = self.path_for_key(key)?;
        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: value.expose(),
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| BackendError::Rejected("encrypt failed".to_string()))?;

        let rec = SecretRecord {
            key: key.to_string(),
            nonce_b64: base64::engine::general_purpose::STANDARD.encode(nonce_bytes),
            ciphertext_b64: base64::engine::general_purpose::STANDARD.encode(ciphertext),
        };
        let bytes = serde_json::to_vec(&rec)
            .map_err(|e| BackendError::Rejected(format!("secret json error: {e}")))?;
        write_atomic(&path, &bytes).await
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for_key(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::Unavailable(format!(
                "remove secret error: {e}"
            ))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Sensitive<Vec<u8>>>, BackendError> {
        let path = self.path_for_key(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BackendError::Unavailable(format!("read secret error: {e}")));
            }
        };
        let rec: SecretRecord = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Rejected(format!("secret json decode error: {e}")))?;
        if rec.key != key {
            return Err(BackendError::Rejected("secret record key mismatch".to_string()));
        }
        let nonce_bytes = base64::engine::general_purpose::STANDARD
            .decode(rec.nonce_b64)
            .map_err(|e| BackendError::Rejected(format!("nonce base64 decode error: {e}")))?;
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(rec.ciphertext_b64)
            .map_err(|e| BackendError::Rejected(format!("cipher base64 decode error: {e}")))?;

        if nonce_bytes.len() != 12 {
            return Err(BackendError::Rejected("bad nonce length".to_string()));
        }
        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| BackendError::Rejected("decrypt failed".to_string()))?;
        Ok(Some(Sensitive(plaintext)))
    }

    fn atomic_upsert(&self) -> bool {
        true
    }
}

async fn read_meta(meta_path: &Path) -> Result<[u8; 16], BackendError> {
    let buf = tokio::fs::read(meta_path)
        .await
        .map_err(|e| BackendError::Unavailable(format!("read meta error: {e}")))?;
    let meta: Meta = serde_json::from_slice(&buf)
        .map_err(|e| BackendError::Rejected(format!("meta json error: {e}")))?;
    let salt_vec = base64::engine::general_purpose::STANDARD
        .decode(meta.salt_b64)
        .map_err(|e| BackendError::Rejected(format!("salt base64 decode error: {e}")))?;
    salt_vec
        .try_into()
        .map_err(|_| BackendError::Rejected("bad salt length".to_string()))
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, BackendError> {
    let mut key = Zeroizing::new(vec![0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| BackendError::Rejected(format!("kdf error: {e}")))?;
    Ok(key)
}

/// Creates `meta.json` with a fresh salt unless another opener got there
/// first, in which case that opener's salt wins and is returned.
async fn init_meta(meta_path: &Path) -> Result<[u8; 16], BackendError> {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let meta = Meta {
        salt_b64: base64::engine::general_purpose::STANDARD.encode(salt),
    };
    let bytes = serde_json::to_vec_pretty(&meta)
        .map_err(|e| BackendError::Rejected(format!("meta json error: {e}")))?;

    let tmp = tmp_path(meta_path);
    write_tmp(&tmp, &bytes).await?;
    // hard_link never replaces an existing file, unlike rename.
    let linked = tokio::fs::hard_link(&tmp, meta_path).await;
    let _ = tokio::fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => {
            debug!(meta = %meta_path.display(), "initialized file vault");
            Ok(salt)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => read_meta(meta_path).await,
        Err(e) => Err(BackendError::Unavailable(format!("link meta error: {e}"))),
    }
}

/// Writes `bytes` next to `path` and renames over it. Each writer gets its own
/// temp name so concurrent puts to one key never share a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let tmp = tmp_path(path);
    write_tmp(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(BackendError::Unavailable(format!("rename tmp error: {e}")));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()))
}

/// Writes and syncs `tmp` with owner-only permissions. Removes it on failure.
async fn write_tmp(tmp: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    use tokio::io::AsyncWriteExt as _;

    let mut f = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| BackendError::Unavailable(format!("create tmp error: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = f
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
        {
            debug!(tmp = %tmp.display(), error = %e, "could not restrict vault file permissions");
        }
    }
    let written = async {
        f.write_all(bytes)
            .await
            .map_err(|e| BackendError::Unavailable(format!("write tmp error: {e}")))?;
        f.sync_all()
            .await
            .map_err(|e| BackendError::Unavailable(format!("sync tmp error: {e}")))
    }
    .await;
    drop(f);
    if written.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &Path, passphrase: &str) -> FileBackend {
        FileBackend::open(FileBackendOptions {
            root_dir: dir.join("secrets"),
            passphrase: Sensitive(passphrase.to_string()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn round_trip_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open(dir.path(), "passphrase").await;

        backend
            .put("provider.refresh_token", Sensitive(b"abc123".to_vec()))
            .await
            .unwrap();
        let got = backend.get("provider.refresh_token").await.unwrap().unwrap();
        assert_eq!(got.expose(), b"abc123");

        backend.delete("provider.refresh_token").await.unwrap();
        assert!(backend.get("provider.refresh_token").await.unwrap().is_none());
        backend.delete("provider.refresh_token").await.unwrap();
    }

    #[tokio::test]
    async fn put_overwrites_and_reopen_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = open(dir.path(), "passphrase").await;
            backend.put("token", Sensitive(b"abc123".to_vec())).await.unwrap();
            backend.put("token", Sensitive(b"xyz789".to_vec())).await.unwrap();
        }
        let backend = open(dir.path(), "passphrase").await;
        let got = backend.get("token").await.unwrap().unwrap();
        assert_eq!(got.expose(), b"xyz789");

        let records = std::fs::read_dir(dir.path().join("secrets"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "meta.json")
            .count();
        assert_eq!(records, 1);
    }

    #[tokio::test]
    async fn plaintext_never_hits_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open(dir.path(), "passphrase").await;
        backend
            .put("token", Sensitive(b"super-secret-value".to_vec()))
            .await
            .unwrap();

        let path = backend.path_for_key("token").unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(!raw.contains("super-secret-value"));
    }

    #[tokio::test]
    async fn wrong_passphrase_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path(), "right")
            .await
            .put("token", Sensitive(b"abc123".to_vec()))
            .await
            .unwrap();

        let other = open(dir.path(), "wrong").await;
        assert!(matches!(
            other.get("token").await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn record_is_bound_to_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open(dir.path(), "passphrase").await;
        backend.put("a", Sensitive(b"for-a".to_vec())).await.unwrap();
        backend.put("b", Sensitive(b"for-b".to_vec())).await.unwrap();

        let a_path = backend.path_for_key("a").unwrap();
        let b_path = backend.path_for_key("b").unwrap();
        std::fs::copy(&a_path, &b_path).unwrap();

        assert!(matches!(
            backend.get("b").await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open(dir.path(), "passphrase").await;
        assert!(matches!(
            backend.put("", Sensitive(Vec::new())).await,
            Err(BackendError::InvalidKey)
        ));
        let long = "k".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            backend.get(&long).await,
            Err(BackendError::InvalidKey)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_opens_of_new_vault_share_one_salt() {
        for _ in 0..4 {
            let dir = tempfile::tempdir().unwrap();
            let (a, b) = tokio::join!(open(dir.path(), "passphrase"), open(dir.path(), "passphrase"));

            a.put("from-a", Sensitive(b"abc123".to_vec())).await.unwrap();
            b.put("from-b", Sensitive(b"xyz789".to_vec())).await.unwrap();

            let reopened = open(dir.path(), "passphrase").await;
            let got_a = reopened.get("from-a").await.unwrap().unwrap();
            let got_b = reopened.get("from-b").await.unwrap().unwrap();
            assert_eq!(got_a.expose(), b"abc123");
            assert_eq!(got_b.expose(), b"xyz789");
        }
    }

    #[tokio::test]
    async fn no_temp_files_left_after_open_and_put() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open(dir.path(), "passphrase").await;
        backend.put("token", Sensitive(b"abc123".to_vec())).await.unwrap();
        let _ = open(dir.path(), "passphrase").await;

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("secrets"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn failed_temp_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("record.json");
        let err = write_atomic(&missing, b"data").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn options_debug_redacts_passphrase() {
        let opts = FileBackendOptions {
            root_dir: PathBuf::from("/tmp/vault"),
            passphrase: Sensitive("hunter2-pass".to_string()),
        };
        let out = format!("{opts:?}");
        assert!(!out.contains("hunter2-pass"));
        assert!(out.contains("[REDACTED]"));
    }
}
