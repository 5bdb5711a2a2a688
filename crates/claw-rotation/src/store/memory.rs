//! In-memory secret store.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::table::SecretRecord;
use super::SecretStore;
use crate::envelope::SecretString;
use crate::error::{Error, Result};
use crate::types::{SecretId, Stage, VersionId, VersionStages};

/// Process-local versioned secret store.
///
/// Every operation takes the lock once, so each call is atomic with respect
/// to the others.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<SecretId, SecretRecord<SecretString>>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new secret whose single version `version` is `AWSCURRENT`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the secret already exists.
    pub fn seed_current(
        &self,
        secret_id: &SecretId,
        version: VersionId,
        value: SecretString,
    ) -> Result<()> {
        let mut secrets = self.secrets.write();
        if secrets.contains_key(secret_id) {
            return Err(Error::conflict(secret_id.as_str(), "secret already exists"));
        }
        secrets.insert(secret_id.clone(), SecretRecord::with_current(version, value));
        debug!(secret_id = %secret_id, "seeded secret");
        Ok(())
    }

    /// Returns a snapshot of the label table, or `None` for an unknown secret.
    #[must_use]
    pub fn versions(&self, secret_id: &SecretId) -> Option<VersionStages> {
        self.secrets.read().get(secret_id).map(SecretRecord::describe)
    }

    /// Returns the value stored under `version` regardless of its labels.
    #[must_use]
    pub fn value_of(&self, secret_id: &SecretId, version: &VersionId) -> Option<SecretString> {
        self.secrets
            .read()
            .get(secret_id)
            .and_then(|record| record.versions.get(version))
            .map(|entry| entry.value.clone())
    }

    /// Returns the number of secrets in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    /// Returns true if the store holds no secrets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unknown(secret_id: &SecretId) -> Error {
    Error::not_found(secret_id.as_str(), "secret does not exist")
}

impl SecretStore for MemorySecretStore {
    async fn get_by_stage(
        &self,
        secret_id: &SecretId,
        stage: &Stage,
    ) -> Result<(SecretString, VersionId)> {
        let secrets = self.secrets.read();
        let record = secrets.get(secret_id).ok_or_else(|| unknown(secret_id))?;
        let (version, value) = record.by_stage(secret_id, stage)?;
        Ok((value.clone(), version.clone()))
    }

    async fn get_by_version(
        &self,
        secret_id: &SecretId,
        version: &VersionId,
        stage: &Stage,
    ) -> Result<SecretString> {
        let secrets = self.secrets.read();
        let record = secrets.get(secret_id).ok_or_else(|| unknown(secret_id))?;
        record.by_version(secret_id, version, stage).cloned()
    }

    async fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &VersionId,
        value: SecretString,
    ) -> Result<()> {
        let mut secrets = self.secrets.write();
        let record = secrets.get_mut(secret_id).ok_or_else(|| unknown(secret_id))?;
        record.put_pending(secret_id, token, value)?;
        Ok(())
    }

    async fn describe_versions(&self, secret_id: &SecretId) -> Result<VersionStages> {
        self.versions(secret_id).ok_or_else(|| unknown(secret_id))
    }

    async fn promote(
        &self,
        secret_id: &SecretId,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<()> {
        let mut secrets = self.secrets.write();
        let record = secrets.get_mut(secret_id).ok_or_else(|| unknown(secret_id))?;
        record.promote(secret_id, to, from)?;
        Ok(())
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("secrets_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretId {
        SecretId::new("db/main").expect("valid id")
    }

    fn version(token: &str) -> VersionId {
        VersionId::new(token).expect("valid token")
    }

    fn seeded() -> MemorySecretStore {
        let store = MemorySecretStore::new();
        store
            .seed_current(&secret(), version("old"), SecretString::new("v0"))
            .expect("seed");
        store
    }

    #[tokio::test]
    async fn get_current_after_seed() {
        let store = seeded();
        let (value, v) = store
            .get_by_stage(&secret(), &Stage::Current)
            .await
            .expect("current exists");
        assert_eq!(value.expose(), "v0");
        assert_eq!(v, version("old"));
    }

    #[tokio::test]
    async fn unknown_secret_is_not_found_everywhere() {
        let store = MemorySecretStore::new();
        let id = secret();
        let t = version("t1");

        assert!(store.get_by_stage(&id, &Stage::Current).await.expect_err("miss").is_not_found());
        assert!(store.get_by_version(&id, &t, &Stage::Pending).await.expect_err("miss").is_not_found());
        assert!(store.put_pending(&id, &t, SecretString::new("x")).await.expect_err("miss").is_not_found());
        assert!(store.describe_versions(&id).await.expect_err("miss").is_not_found());
        assert!(store.promote(&id, &t, None).await.expect_err("miss").is_not_found());
    }

    #[tokio::test]
    async fn seed_twice_conflicts() {
        let store = seeded();
        let result = store.seed_current(&secret(), version("other"), SecretString::new("v"));
        assert!(matches!(result, Err(Error::Conflict { .. })));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn pending_round_trip_and_promotion() {
        let store = seeded();
        let id = secret();
        let t1 = version("t1");

        store
            .put_pending(&id, &t1, SecretString::new("v1"))
            .await
            .expect("put");
        let pending = store
            .get_by_version(&id, &t1, &Stage::Pending)
            .await
            .expect("pending");
        assert_eq!(pending.expose(), "v1");

        store
            .promote(&id, &t1, Some(&version("old")))
            .await
            .expect("promote");
        let table = store.describe_versions(&id).await.expect("describe");
        assert_eq!(table.holder_of(&Stage::Current), Some(&t1));
        assert!(table.has_stage(&version("old"), &Stage::Previous));
    }

    #[test]
    fn debug_does_not_leak_values() {
        let store = seeded();
        let debug = format!("{store:?}");
        assert!(debug.contains("secrets_count"));
        assert!(!debug.contains("v0"));
    }
}
