//! The four rotation steps.
//!
//! Each step is a short orchestration of store and target calls. None keeps
//! state between invocations: everything a later step needs is read back
//! from the store's label table.
//!
//! ```text
//! createSecret   AWSCURRENT ──generate──▶ new version <token> [AWSPENDING]
//! setSecret      <token>/AWSPENDING ──apply──▶ resource
//! testSecret     <token>/AWSPENDING ──connect──▶ resource
//! finishSecret   AWSCURRENT: <old> ──move──▶ <token>
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::envelope::{decode, encode};
use crate::error::{Error, Result};
use crate::store::SecretStore;
use crate::target::TargetResource;
use crate::types::{SecretId, Stage, VersionId};

/// Ensures version `token` exists with freshly generated material and the
/// `AWSPENDING` label.
///
/// An already-pending `token` is left untouched, so redelivery never
/// regenerates.
///
/// # Errors
///
/// Fails with [`Error::NotFound`] if the secret has no `AWSCURRENT` version
/// and with [`Error::Conflict`] if `token` names an existing version that is
/// not pending; store, serialization and generation failures propagate
/// unchanged.
pub async fn create_secret<S, T, E>(
    ctx: &InvocationContext,
    store: &S,
    target: &T,
    secret_id: &SecretId,
    token: &VersionId,
) -> Result<()>
where
    S: SecretStore,
    T: TargetResource<E>,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    let (current, current_version) = ctx
        .run(store.get_by_stage(secret_id, &Stage::Current))
        .await?;

    match ctx
        .run(store.get_by_version(secret_id, token, &Stage::Pending))
        .await
    {
        Ok(_) => {
            debug!(%secret_id, %token, "pending version already exists");
            return Ok(());
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let mut envelope: E = decode(&current)?;
    ctx.run(async {
        target
            .generate_secret(&mut envelope)
            .await
            .map_err(|e| reclassify(e, |reason| Error::GenerationFailed { reason }))
    })
    .await?;
    let pending = encode(&envelope)?;

    ctx.run(store.put_pending(secret_id, token, pending)).await?;
    info!(%secret_id, %token, from = %current_version, "created pending version");
    Ok(())
}

/// Applies the pending credential of `token` to the target resource.
///
/// # Errors
///
/// Fails with [`Error::NotFound`] if `token` is not pending, and with
/// [`Error::ApplyFailed`] if the target rejects the credential.
pub async fn set_secret<S, T, E>(
    ctx: &InvocationContext,
    store: &S,
    target: &T,
    secret_id: &SecretId,
    token: &VersionId,
) -> Result<()>
where
    S: SecretStore,
    T: TargetResource<E>,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    let pending = ctx
        .run(store.get_by_version(secret_id, token, &Stage::Pending))
        .await?;
    let envelope: E = decode(&pending)?;

    ctx.run(async {
        target
            .set_secret(&envelope)
            .await
            .map_err(|e| reclassify(e, |reason| Error::ApplyFailed { reason }))
    })
    .await?;
    info!(%secret_id, %token, "applied pending credential");
    Ok(())
}

/// Verifies that the pending credential of `token` authenticates.
///
/// Never changes the store.
///
/// # Errors
///
/// Fails with [`Error::VerificationFailed`] if the connection attempt fails;
/// the invoker must not proceed to `finishSecret`.
pub async fn test_secret<S, T, E>(
    ctx: &InvocationContext,
    store: &S,
    target: &T,
    secret_id: &SecretId,
    token: &VersionId,
) -> Result<()>
where
    S: SecretStore,
    T: TargetResource<E>,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    let pending = ctx
        .run(store.get_by_version(secret_id, token, &Stage::Pending))
        .await?;
    let envelope: E = decode(&pending)?;

    let verified = ctx
        .run(async {
            target
                .try_connection(&envelope)
                .await
                .map_err(|e| reclassify(e, |reason| Error::VerificationFailed { reason }))
        })
        .await;
    if let Err(e) = &verified {
        warn!(%secret_id, %token, error = %e, "pending credential failed verification");
    } else {
        info!(%secret_id, %token, "pending credential verified");
    }
    verified
}

/// Moves `AWSCURRENT` onto `token`.
///
/// Returns immediately if `token` already holds `AWSCURRENT`. The source
/// version is re-read from the store on every call.
///
/// # Errors
///
/// Fails with [`Error::Conflict`] if another writer moved `AWSCURRENT`
/// between the describe and the promote; retrying re-derives the source.
pub async fn finish_secret<S>(
    ctx: &InvocationContext,
    store: &S,
    secret_id: &SecretId,
    token: &VersionId,
) -> Result<()>
where
    S: SecretStore,
{
    let versions = ctx.run(store.describe_versions(secret_id)).await?;

    let mut from = None;
    for holder in versions.holders_of(&Stage::Current) {
        if holder == token {
            debug!(%secret_id, %token, "version already current");
            return Ok(());
        }
        if from.is_none() {
            from = Some(holder.clone());
        }
    }

    if from.is_none() {
        warn!(%secret_id, %token, "no version holds AWSCURRENT; promoting without a source");
    }

    ctx.run(store.promote(secret_id, token, from.as_ref())).await?;
    match &from {
        Some(from) => info!(%secret_id, %token, %from, "promoted pending version"),
        None => info!(%secret_id, %token, "promoted pending version"),
    }
    Ok(())
}

/// Maps a target failure onto the step's error kind, keeping errors that
/// already carry their own meaning.
fn reclassify(err: Error, into: impl FnOnce(String) -> Error) -> Error {
    match err {
        Error::GenerationFailed { .. }
        | Error::ApplyFailed { .. }
        | Error::VerificationFailed { .. }
        | Error::Cancelled
        | Error::DeadlineExceeded => err,
        other => into(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{DatabaseCredential, SecretString};
    use crate::store::MemorySecretStore;
    use crate::password::PasswordPolicy;
    use crate::target::CredentialFileTarget;
    use tempfile::TempDir;

    const CURRENT: &str = r#"{"user":"app","password":"P0","host":"dev"}"#;

    fn secret() -> SecretId {
        SecretId::new("db/main").expect("valid id")
    }

    fn version(token: &str) -> VersionId {
        VersionId::new(token).expect("valid token")
    }

    fn seeded() -> MemorySecretStore {
        let store = MemorySecretStore::new();
        store
            .seed_current(&secret(), version("old"), SecretString::new(CURRENT))
            .expect("seed");
        store
    }

    fn target(dir: &TempDir) -> CredentialFileTarget {
        CredentialFileTarget::new(dir.path().join("credentials"), PasswordPolicy::default())
            .expect("valid policy")
    }

    fn pending(store: &MemorySecretStore, token: &str) -> DatabaseCredential {
        let value = store
            .value_of(&secret(), &version(token))
            .expect("version exists");
        decode(&value).expect("valid envelope")
    }

    #[tokio::test]
    async fn create_secret_generates_pending_version() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded();
        let ctx = InvocationContext::new();

        create_secret::<_, _, DatabaseCredential>(&ctx, &store, &target(&dir), &secret(), &version("t1"))
            .await
            .expect("create");

        let table = store.versions(&secret()).expect("secret exists");
        assert!(table.has_stage(&version("t1"), &Stage::Pending));
        assert!(table.has_stage(&version("old"), &Stage::Current));

        let created = pending(&store, "t1");
        assert_ne!(created.password, "P0");
        assert_eq!(created.user, "app");
        assert_eq!(created.host, "dev");
    }

    #[tokio::test]
    async fn create_secret_without_current_fails() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemorySecretStore::new();
        let ctx = InvocationContext::new();

        let err = create_secret::<_, _, DatabaseCredential>(&ctx, &store, &target(&dir), &secret(), &version("t1"))
            .await
            .expect_err("nothing to rotate from");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_secret_with_malformed_current_is_serialization_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemorySecretStore::new();
        store
            .seed_current(&secret(), version("old"), SecretString::new("{"))
            .expect("seed");
        let ctx = InvocationContext::new();

        let err = create_secret::<_, _, DatabaseCredential>(&ctx, &store, &target(&dir), &secret(), &version("t1"))
            .await
            .expect_err("malformed");
        assert!(matches!(err, Error::Serialization { .. }));
        assert_eq!(store.versions(&secret()).map(|t| t.len()), Some(1));
    }

    #[tokio::test]
    async fn create_secret_never_rewrites_current_version() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded();
        let ctx = InvocationContext::new();

        let err = create_secret::<_, _, DatabaseCredential>(&ctx, &store, &target(&dir), &secret(), &version("old"))
            .await
            .expect_err("token names the current version");
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(
            store.value_of(&secret(), &version("old")).map(|v| v.expose().to_string()),
            Some(CURRENT.to_string())
        );
    }

    #[tokio::test]
    async fn set_secret_requires_pending_version() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded();
        let ctx = InvocationContext::new();

        let err = set_secret::<_, _, DatabaseCredential>(&ctx, &store, &target(&dir), &secret(), &version("t1"))
            .await
            .expect_err("no pending version");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_secret_fails_before_apply() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded();
        let target = target(&dir);
        let ctx = InvocationContext::new();

        create_secret::<_, _, DatabaseCredential>(&ctx, &store, &target, &secret(), &version("t1"))
            .await
            .expect("create");
        let before = store.versions(&secret());

        let err = test_secret::<_, _, DatabaseCredential>(&ctx, &store, &target, &secret(), &version("t1"))
            .await
            .expect_err("credential not applied yet");
        assert!(matches!(err, Error::VerificationFailed { .. }));
        assert_eq!(store.versions(&secret()), before);
    }

    #[tokio::test]
    async fn finish_secret_on_current_token_is_noop() {
        let store = MemorySecretStore::new();
        store
            .seed_current(&secret(), version("old"), SecretString::new(CURRENT))
            .expect("seed");
        store
            .put_pending(&secret(), &version("t1"), SecretString::new(CURRENT))
            .await
            .expect("put");
        store
            .promote(&secret(), &version("t1"), Some(&version("old")))
            .await
            .expect("promote");
        let ctx = InvocationContext::new();

        finish_secret(&ctx, &store, &secret(), &version("t1"))
            .await
            .expect("noop");
        let table = store.versions(&secret()).expect("secret exists");
        assert_eq!(table.holder_of(&Stage::Current), Some(&version("t1")));
    }

    #[tokio::test]
    async fn finish_secret_unknown_token_is_not_found() {
        let store = seeded();
        let ctx = InvocationContext::new();
        let err = finish_secret(&ctx, &store, &secret(), &version("ghost"))
            .await
            .expect_err("unknown version");
        assert!(err.is_not_found());
        let table = store.versions(&secret()).expect("secret exists");
        assert_eq!(table.holder_of(&Stage::Current), Some(&version("old")));
    }

    #[test]
    fn reclassify_keeps_meaningful_errors() {
        let kept = reclassify(Error::Cancelled, |reason| Error::ApplyFailed { reason });
        assert!(matches!(kept, Error::Cancelled));

        let mapped = reclassify(
            Error::Storage {
                reason: "disk full".to_string(),
            },
            |reason| Error::ApplyFailed { reason },
        );
        assert!(matches!(mapped, Error::ApplyFailed { ref reason } if reason.contains("disk full")));
    }
}
