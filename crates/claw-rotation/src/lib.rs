//! # Claw Rotation
//!
//! Four-step credential rotation for secrets kept in a versioned store with
//! staging labels:
//!
//! - **createSecret**: generate new material as version `<token>` labelled `AWSPENDING`
//! - **setSecret**: apply the pending credential to the backing resource
//! - **testSecret**: verify the pending credential authenticates
//! - **finishSecret**: move `AWSCURRENT` onto `<token>`
//!
//! Every step is idempotent and keeps no state between invocations, so an
//! at-least-once invoker can redeliver any step safely. The store and the
//! target resource are ports ([`SecretStore`], [`TargetResource`]); a
//! [`Rotator`] is built once with both and routes each request.
//!
//! ## Example
//!
//! ```rust
//! use claw_rotation::{
//!     CredentialFileTarget, DatabaseCredential, InvocationContext, MemorySecretStore,
//!     PasswordPolicy, Rotator, SecretId, SecretString, Stage, VersionId,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let secret_id = SecretId::new("db/main")?;
//!
//! let store = MemorySecretStore::new();
//! store.seed_current(
//!     &secret_id,
//!     VersionId::new("initial")?,
//!     SecretString::new(r#"{"user":"app","password":"changeme"}"#),
//! )?;
//! let target = CredentialFileTarget::new(dir.path().join("credentials"), PasswordPolicy::default())?;
//!
//! let rotator: Rotator<_, _, DatabaseCredential> = Rotator::new(store, target);
//! let token = VersionId::generate();
//! rotator.rotate(&InvocationContext::new(), &secret_id, &token).await?;
//!
//! let versions = rotator.store().versions(&secret_id).expect("secret exists");
//! assert_eq!(versions.holder_of(&Stage::Current), Some(&token));
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Considerations
//!
//! - Secret material is held in zeroizing buffers and redacted from `Debug`
//! - Passwords are compared in constant time
//! - [`FileSecretStore`] encrypts every version with ChaCha20-Poly1305

pub mod config;
pub mod context;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod password;
pub mod request;
pub mod rotator;
pub mod steps;
pub mod store;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{SecretId, Stage, Step, VersionId, VersionStages};

pub use config::RotatorConfig;
pub use context::InvocationContext;
pub use encryption::MasterKey;
pub use envelope::{DatabaseCredential, SecretString};
pub use password::PasswordPolicy;
pub use request::RotationRequest;
pub use rotator::Rotator;
pub use store::{FileSecretStore, MemorySecretStore, SecretStore};
pub use target::{CredentialFileTarget, TargetResource};
