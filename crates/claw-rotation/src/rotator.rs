//! Step routing.
//!
//! A [`Rotator`] owns the store and target for one deployment and routes each
//! incoming [`RotationRequest`] to its step. It keeps no state between
//! requests and never retries; retry policy belongs to the invoker.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, Instrument};

use crate::context::InvocationContext;
use crate::error::Result;
use crate::request::RotationRequest;
use crate::steps;
use crate::store::SecretStore;
use crate::target::TargetResource;
use crate::types::{SecretId, Step, VersionId};

/// Routes rotation steps to a store and target resource.
///
/// `E` is the envelope type the target understands.
pub struct Rotator<S, T, E> {
    store: S,
    target: T,
    _envelope: PhantomData<fn() -> E>,
}

impl<S, T, E> Rotator<S, T, E>
where
    S: SecretStore,
    T: TargetResource<E>,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    /// Creates a rotator over the given collaborators.
    #[must_use]
    pub fn new(store: S, target: T) -> Self {
        Self {
            store,
            target,
            _envelope: PhantomData,
        }
    }

    /// Returns the secret store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the target resource.
    #[must_use]
    pub const fn target(&self) -> &T {
        &self.target
    }

    /// Handles one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownStep`] for an unrecognized step name,
    /// [`crate::Error::InvalidRequest`] for a malformed secret id or token,
    /// and otherwise whatever the step returns.
    pub async fn handle(&self, ctx: &InvocationContext, request: &RotationRequest) -> Result<()> {
        let step = request.step()?;
        let secret_id = request.secret_id()?;
        let token = request.token()?;
        self.run_step(ctx, step, &secret_id, &token).await
    }

    /// Runs a single, already-parsed step.
    ///
    /// # Errors
    ///
    /// Returns whatever the step returns.
    pub async fn run_step(
        &self,
        ctx: &InvocationContext,
        step: Step,
        secret_id: &SecretId,
        token: &VersionId,
    ) -> Result<()> {
        let span = tracing::info_span!("rotation_step", %secret_id, %token, %step);
        async {
            match step {
                Step::CreateSecret => {
                    steps::create_secret(ctx, &self.store, &self.target, secret_id, token).await
                }
                Step::SetSecret => {
                    steps::set_secret(ctx, &self.store, &self.target, secret_id, token).await
                }
                Step::TestSecret => {
                    steps::test_secret(ctx, &self.store, &self.target, secret_id, token).await
                }
                Step::FinishSecret => steps::finish_secret(ctx, &self.store, secret_id, token).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Runs all four steps for `token` in protocol order, stopping at the
    /// first failure.
    ///
    /// A failed `testSecret` therefore never reaches `finishSecret`. Each
    /// step is idempotent, so calling this again with the same token resumes
    /// an interrupted rotation.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub async fn rotate(
        &self,
        ctx: &InvocationContext,
        secret_id: &SecretId,
        token: &VersionId,
    ) -> Result<()> {
        for step in Step::ALL {
            self.run_step(ctx, step, secret_id, token).await?;
        }
        info!(%secret_id, %token, "rotation complete");
        Ok(())
    }
}

impl<S, T, E> std::fmt::Debug for Rotator<S, T, E>
where
    S: std::fmt::Debug,
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotator")
            .field("store", &self.store)
            .field("target", &self.target)
            .finish()
    }
}
