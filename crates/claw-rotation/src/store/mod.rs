//! The secret store port and the bundled stores.
//!
//! [`SecretStore`] is the narrow contract the rotation steps need from a
//! versioned secret store. Two implementations ship with the crate:
//!
//! - [`MemorySecretStore`]: process-local, for tests and embedders
//! - [`FileSecretStore`]: a JSON document on disk, values encrypted at rest
//!
//! Both share the label bookkeeping in [`table`], so they agree on every edge
//! case of pending upserts and promotions.

use std::future::Future;

use crate::envelope::SecretString;
use crate::error::Result;
use crate::types::{SecretId, Stage, VersionId, VersionStages};

pub mod file;
pub mod memory;
pub mod table;

pub use file::FileSecretStore;
pub use memory::MemorySecretStore;

/// Versioned secret store with staging labels.
///
/// Each call must be atomic on its own; the steps never rely on atomicity
/// across calls.
pub trait SecretStore: Send + Sync {
    /// Reads the version carrying `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the secret is unknown or no
    /// version carries `stage`.
    fn get_by_stage(
        &self,
        secret_id: &SecretId,
        stage: &Stage,
    ) -> impl Future<Output = Result<(SecretString, VersionId)>> + Send;

    /// Reads `version` if, and only if, it carries `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the exact (version, stage) pair
    /// does not exist.
    fn get_by_version(
        &self,
        secret_id: &SecretId,
        version: &VersionId,
        stage: &Stage,
    ) -> impl Future<Output = Result<SecretString>> + Send;

    /// Creates or overwrites version `token` with `value` and labels it
    /// `AWSPENDING`.
    ///
    /// Calling twice with identical arguments leaves the store unchanged. Only
    /// a pending version may be overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the secret is unknown, and
    /// [`crate::Error::Conflict`] if `token` exists without `AWSPENDING` and
    /// holds different content.
    fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &VersionId,
        value: SecretString,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns every version of the secret with its labels.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the secret is unknown.
    fn describe_versions(
        &self,
        secret_id: &SecretId,
    ) -> impl Future<Output = Result<VersionStages>> + Send;

    /// Atomically moves `AWSCURRENT` from `from` to `to`.
    ///
    /// `to` keeps `AWSPENDING`. With `from = None` the label is granted only
    /// if no other version holds it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Conflict`] if `from` no longer holds
    /// `AWSCURRENT` (or, with `from = None`, another version does), and
    /// [`crate::Error::NotFound`] if `to` does not exist.
    fn promote(
        &self,
        secret_id: &SecretId,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> impl Future<Output = Result<()>> + Send;
}
