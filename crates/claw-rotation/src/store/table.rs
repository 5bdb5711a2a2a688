//! Label bookkeeping shared by the bundled stores.
//!
//! A [`SecretRecord`] is the full version history of one secret. Its methods
//! enforce the staging rules: at most one `AWSPENDING`, at most one
//! `AWSCURRENT`, and `AWSCURRENT` only ever moves, never disappears.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{SecretId, Stage, VersionId, VersionStages};

/// One stored version of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry<V> {
    /// The stored value (plaintext or ciphertext, depending on the store).
    pub value: V,
    /// Labels attached to this version.
    pub stages: BTreeSet<Stage>,
    /// When the version was first written.
    pub created_at: DateTime<Utc>,
}

/// All versions of one secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord<V> {
    /// Versions keyed by token.
    pub versions: BTreeMap<VersionId, VersionEntry<V>>,
    /// When the secret was created.
    pub created_at: DateTime<Utc>,
}

impl<V: Clone + PartialEq> SecretRecord<V> {
    /// Creates a secret whose only version `version` holds `AWSCURRENT`.
    pub fn with_current(version: VersionId, value: V) -> Self {
        let now = Utc::now();
        let mut versions = BTreeMap::new();
        versions.insert(
            version,
            VersionEntry {
                value,
                stages: BTreeSet::from([Stage::Current]),
                created_at: now,
            },
        );
        Self {
            versions,
            created_at: now,
        }
    }

    /// Returns the version carrying `stage`.
    pub fn by_stage(&self, secret_id: &SecretId, stage: &Stage) -> Result<(&VersionId, &V)> {
        self.versions
            .iter()
            .find(|(_, entry)| entry.stages.contains(stage))
            .map(|(version, entry)| (version, &entry.value))
            .ok_or_else(|| Error::not_found(secret_id.as_str(), format!("no version labeled {stage}")))
    }

    /// Returns `version` if it carries `stage`.
    pub fn by_version(&self, secret_id: &SecretId, version: &VersionId, stage: &Stage) -> Result<&V> {
        let entry = self.versions.get(version).ok_or_else(|| {
            Error::not_found(secret_id.as_str(), format!("no version {version}"))
        })?;
        if !entry.stages.contains(stage) {
            return Err(Error::not_found(
                secret_id.as_str(),
                format!("version {version} is not labeled {stage}"),
            ));
        }
        Ok(&entry.value)
    }

    /// Upserts `token` with `value` and moves `AWSPENDING` onto it.
    ///
    /// A version that is not pending is immutable: writing different content
    /// to it is a conflict. Returns true if the record changed.
    pub fn put_pending(&mut self, secret_id: &SecretId, token: &VersionId, value: V) -> Result<bool> {
        let immutable = self.versions.get(token).is_some_and(|entry| {
            !entry.stages.contains(&Stage::Pending) && entry.value != value
        });
        if immutable {
            return Err(Error::conflict(
                secret_id.as_str(),
                format!("version {token} already exists with different content"),
            ));
        }

        let mut changed = false;
        for (version, entry) in &mut self.versions {
            if version != token && entry.stages.remove(&Stage::Pending) {
                changed = true;
            }
        }

        match self.versions.get_mut(token) {
            Some(entry) => {
                if entry.value != value {
                    entry.value = value;
                    changed = true;
                }
                changed |= entry.stages.insert(Stage::Pending);
            }
            None => {
                self.versions.insert(
                    token.clone(),
                    VersionEntry {
                        value,
                        stages: BTreeSet::from([Stage::Pending]),
                        created_at: Utc::now(),
                    },
                );
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Returns the label table.
    pub fn describe(&self) -> VersionStages {
        self.versions
            .iter()
            .map(|(version, entry)| (version.clone(), entry.stages.clone()))
            .collect()
    }

    /// Moves `AWSCURRENT` from `from` to `to`; the loser becomes `AWSPREVIOUS`.
    ///
    /// Returns true if the record changed.
    pub fn promote(
        &mut self,
        secret_id: &SecretId,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<bool> {
        if !self.versions.contains_key(to) {
            return Err(Error::not_found(secret_id.as_str(), format!("no version {to}")));
        }

        let holder = self
            .versions
            .iter()
            .find(|(_, entry)| entry.stages.contains(&Stage::Current))
            .map(|(version, _)| version.clone());

        match (from, holder.as_ref()) {
            (Some(from), Some(holder)) if from == holder => {}
            (Some(from), _) => {
                return Err(Error::conflict(
                    secret_id.as_str(),
                    format!("version {from} does not hold {}", Stage::Current),
                ));
            }
            (None, Some(holder)) if holder != to => {
                return Err(Error::conflict(
                    secret_id.as_str(),
                    format!(
                        "version {holder} holds {} but no source version was given",
                        Stage::Current
                    ),
                ));
            }
            (None, _) => {}
        }

        if holder.as_ref() == Some(to) {
            return Ok(false);
        }

        if let Some(previous) = holder {
            for entry in self.versions.values_mut() {
                entry.stages.remove(&Stage::Previous);
            }
            if let Some(entry) = self.versions.get_mut(&previous) {
                entry.stages.remove(&Stage::Current);
                entry.stages.insert(Stage::Previous);
            }
        }

        if let Some(entry) = self.versions.get_mut(to) {
            entry.stages.remove(&Stage::Previous);
            entry.stages.insert(Stage::Current);
        }
        Ok(true)
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

    fn record() -> SecretRecord<String> {
        SecretRecord::with_current(version("old"), "v0".to_string())
    }

    fn current_holders(record: &SecretRecord<String>) -> Vec<VersionId> {
        record
            .describe()
            .holders_of(&Stage::Current)
            .cloned()
            .collect()
    }

    #[test]
    fn new_record_has_single_current() {
        let record = record();
        let (v, value) = record.by_stage(&secret(), &Stage::Current).expect("current");
        assert_eq!(v, &version("old"));
        assert_eq!(value, "v0");
        assert!(record.by_stage(&secret(), &Stage::Pending).is_err());
    }

    #[test]
    fn by_version_requires_exact_stage() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");

        assert!(record.by_version(&secret(), &version("t1"), &Stage::Pending).is_ok());
        let err = record
            .by_version(&secret(), &version("t1"), &Stage::Current)
            .expect_err("t1 is not current");
        assert!(err.is_not_found());
        let err = record
            .by_version(&secret(), &version("nope"), &Stage::Pending)
            .expect_err("unknown version");
        assert!(err.is_not_found());
    }

    #[test]
    fn put_pending_is_idempotent() {
        let mut record = record();
        assert!(record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put"));
        let snapshot = record.clone();
        assert!(!record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put"));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn put_pending_moves_label_from_stale_attempt() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        record.put_pending(&secret(), &version("t2"), "v2".to_string()).expect("put");

        let table = record.describe();
        let pending: Vec<_> = table.holders_of(&Stage::Pending).collect();
        assert_eq!(pending, vec![&version("t2")]);
        assert!(table.stages_of(&version("t1")).is_some_and(|s| s.is_empty()));
    }

    #[test]
    fn put_pending_overwrites_value() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        assert!(record.put_pending(&secret(), &version("t1"), "v1b".to_string()).expect("put"));
        let value = record
            .by_version(&secret(), &version("t1"), &Stage::Pending)
            .expect("pending");
        assert_eq!(value, "v1b");
    }

    #[test]
    fn put_pending_refuses_to_rewrite_current_version() {
        let mut record = record();
        let snapshot = record.clone();

        let err = record
            .put_pending(&secret(), &version("old"), "forged".to_string())
            .expect_err("current version is immutable");
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn put_pending_refuses_to_rewrite_previous_version() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        record
            .promote(&secret(), &version("t1"), Some(&version("old")))
            .expect("promote");
        record.put_pending(&secret(), &version("t2"), "v2".to_string()).expect("put");
        let snapshot = record.clone();

        let err = record
            .put_pending(&secret(), &version("old"), "forged".to_string())
            .expect_err("previous version is immutable");
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(record, snapshot);
        let value = record
            .by_version(&secret(), &version("old"), &Stage::Previous)
            .expect("previous");
        assert_eq!(value, "v0");
        let pending: Vec<_> = record.describe().holders_of(&Stage::Pending).cloned().collect();
        assert_eq!(pending, vec![version("t2")]);
    }

    #[test]
    fn put_pending_refuses_to_rewrite_abandoned_attempt() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        record.put_pending(&secret(), &version("t2"), "v2".to_string()).expect("put");

        let err = record
            .put_pending(&secret(), &version("t1"), "v1b".to_string())
            .expect_err("t1 lost its label");
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn put_pending_same_content_on_labeled_version_is_accepted() {
        let mut record = record();
        let changed = record
            .put_pending(&secret(), &version("old"), "v0".to_string())
            .expect("same content");
        assert!(changed);
        let table = record.describe();
        assert!(table.has_stage(&version("old"), &Stage::Current));
        assert!(table.has_stage(&version("old"), &Stage::Pending));
    }

    #[test]
    fn promote_moves_current_and_marks_previous() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");

        let changed = record
            .promote(&secret(), &version("t1"), Some(&version("old")))
            .expect("promote");
        assert!(changed);

        let table = record.describe();
        assert!(table.has_stage(&version("t1"), &Stage::Current));
        assert!(table.has_stage(&version("t1"), &Stage::Pending));
        assert!(table.has_stage(&version("old"), &Stage::Previous));
        assert!(!table.has_stage(&version("old"), &Stage::Current));
        assert_eq!(current_holders(&record), vec![version("t1")]);
    }

    #[test]
    fn promote_with_stale_source_conflicts() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        record.put_pending(&secret(), &version("t2"), "v2".to_string()).expect("put");
        record
            .promote(&secret(), &version("t2"), Some(&version("old")))
            .expect("first promote");

        let err = record
            .promote(&secret(), &version("t1"), Some(&version("old")))
            .expect_err("old no longer current");
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(current_holders(&record), vec![version("t2")]);
    }

    #[test]
    fn promote_without_source_refuses_second_current() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        let err = record
            .promote(&secret(), &version("t1"), None)
            .expect_err("old still current");
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(current_holders(&record), vec![version("old")]);
    }

    #[test]
    fn promote_without_source_grants_when_nobody_holds_current() {
        let mut record = record();
        record.put_pending(&secret(), &version("t1"), "v1".to_string()).expect("put");
        if let Some(entry) = record.versions.get_mut(&version("old")) {
            entry.stages.clear();
        }

        assert!(record.promote(&secret(), &version("t1"), None).expect("promote"));
        assert_eq!(current_holders(&record), vec![version("t1")]);
    }

    #[test]
    fn promote_unknown_target_is_not_found() {
        let mut record = record();
        let err = record
            .promote(&secret(), &version("ghost"), Some(&version("old")))
            .expect_err("unknown target");
        assert!(err.is_not_found());
    }

    #[test]
    fn promote_onto_current_holder_is_noop() {
        let mut record = record();
        let changed = record
            .promote(&secret(), &version("old"), Some(&version("old")))
            .expect("noop");
        assert!(!changed);
    }
}
