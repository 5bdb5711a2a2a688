//! File-backed secret store.
//!
//! The whole store is one JSON document:
//!
//! ```text
//! { "secrets": { "<secret id>": { "versions": { "<token>": {
//!     "value": "<base64 sealed value>", "stages": ["AWSCURRENT"], "created_at": "..."
//! } }, "created_at": "..." } } }
//! ```
//!
//! Every mutation holds an exclusive advisory lock on `<path>.lock` for its
//! whole load-modify-save cycle, so separate processes sharing the document
//! never interleave. The document is replaced by writing a uniquely named
//! sibling and renaming it over the original, so a crash leaves either the
//! old or the new document on disk.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::table::SecretRecord;
use super::SecretStore;
use crate::encryption::MasterKey;
use crate::envelope::SecretString;
use crate::error::{Error, Result};
use crate::types::{SecretId, Stage, VersionId, VersionStages};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    secrets: BTreeMap<SecretId, SecretRecord<String>>,
}

/// Versioned secret store persisted to a JSON file, encrypted at rest.
pub struct FileSecretStore {
    path: PathBuf,
    key: MasterKey,
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    /// Creates a store over `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, key: MasterKey) -> Self {
        Self {
            path: path.into(),
            key,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a new secret whose single version `version` is `AWSCURRENT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the secret already exists, or a storage
    /// error if the document cannot be read or written.
    pub async fn seed_current(
        &self,
        secret_id: &SecretId,
        version: VersionId,
        value: &SecretString,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_document().await?;
        let mut doc = self.load().await?;
        if doc.secrets.contains_key(secret_id) {
            return Err(Error::conflict(secret_id.as_str(), "secret already exists"));
        }
        let sealed = self.key.seal(secret_id, &version, value)?;
        doc.secrets
            .insert(secret_id.clone(), SecretRecord::with_current(version, sealed));
        self.save(&doc).await?;
        debug!(secret_id = %secret_id, path = %self.path.display(), "seeded secret");
        Ok(())
    }

    /// Returns the ids of all stored secrets.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the document cannot be read.
    pub async fn list(&self) -> Result<Vec<SecretId>> {
        Ok(self.load().await?.secrets.into_keys().collect())
    }

    async fn load(&self) -> Result<Document> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => {
                return Err(Error::Storage {
                    reason: format!("failed to read '{}': {e}", self.path.display()),
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::Storage {
            reason: format!("corrupt store document '{}': {e}", self.path.display()),
        })
    }

    /// Takes the exclusive lock guarding the document across processes.
    ///
    /// The lock is released when the returned file is dropped.
    async fn lock_document(&self) -> Result<File> {
        self.create_parent().await?;
        let lock_path = sibling(&self.path, "lock");
        tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|e| Error::Storage {
                    reason: format!("failed to open lock '{}': {e}", lock_path.display()),
                })?;
            file.lock_exclusive().map_err(|e| Error::Storage {
                reason: format!("failed to lock '{}': {e}", lock_path.display()),
            })?;
            Ok(file)
        })
        .await
        .map_err(|e| Error::Storage {
            reason: format!("lock task failed: {e}"),
        })?
    }

    async fn create_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Storage {
                reason: format!("failed to create '{}': {e}", parent.display()),
            })?;
        }
        Ok(())
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = sibling(&self.path, &format!("tmp.{}", Uuid::new_v4()));

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| Error::Storage {
            reason: format!("failed to write '{}': {e}", tmp.display()),
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Storage {
                reason: format!("failed to replace '{}': {e}", self.path.display()),
            });
        }
        Ok(())
    }

    fn record<'a>(
        doc: &'a Document,
        secret_id: &SecretId,
    ) -> Result<&'a SecretRecord<String>> {
        doc.secrets
            .get(secret_id)
            .ok_or_else(|| Error::not_found(secret_id.as_str(), "secret does not exist"))
    }

    fn record_mut<'a>(
        doc: &'a mut Document,
        secret_id: &SecretId,
    ) -> Result<&'a mut SecretRecord<String>> {
        doc.secrets
            .get_mut(secret_id)
            .ok_or_else(|| Error::not_found(secret_id.as_str(), "secret does not exist"))
    }
}

impl SecretStore for FileSecretStore {
    async fn get_by_stage(
        &self,
        secret_id: &SecretId,
        stage: &Stage,
    ) -> Result<(SecretString, VersionId)> {
        let doc = self.load().await?;
        let (version, sealed) = Self::record(&doc, secret_id)?.by_stage(secret_id, stage)?;
        let value = self.key.open(secret_id, version, sealed)?;
        Ok((value, version.clone()))
    }

    async fn get_by_version(
        &self,
        secret_id: &SecretId,
        version: &VersionId,
        stage: &Stage,
    ) -> Result<SecretString> {
        let doc = self.load().await?;
        let sealed = Self::record(&doc, secret_id)?.by_version(secret_id, version, stage)?;
        self.key.open(secret_id, version, sealed)
    }

    async fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &VersionId,
        value: SecretString,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_document().await?;
        let mut doc = self.load().await?;
        let record = Self::record_mut(&mut doc, secret_id)?;

        // Sealing is randomized; reuse the stored ciphertext when the plaintext matches.
        let sealed = match record.versions.get(token) {
            Some(entry) if self.key.open(secret_id, token, &entry.value).ok() == Some(value.clone()) => {
                entry.value.clone()
            }
            _ => self.key.seal(secret_id, token, &value)?,
        };

        if record.put_pending(secret_id, token, sealed)? {
            self.save(&doc).await?;
        }
        Ok(())
    }

    async fn describe_versions(&self, secret_id: &SecretId) -> Result<VersionStages> {
        let doc = self.load().await?;
        Ok(Self::record(&doc, secret_id)?.describe())
    }

    async fn promote(
        &self,
        secret_id: &SecretId,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_document().await?;
        let mut doc = self.load().await?;
        if Self::record_mut(&mut doc, secret_id)?.promote(secret_id, to, from)? {
            self.save(&doc).await?;
        }
        Ok(())
    }
}

/// Returns `<path>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl std::fmt::Debug for FileSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecretStore")
            .field("path", &self.path)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
