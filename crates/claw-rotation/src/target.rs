//! The target resource port and the bundled credential-file target.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::envelope::DatabaseCredential;
use crate::error::{Error, Result};
use crate::password::PasswordPolicy;

/// The backing resource whose credential is being rotated.
///
/// `E` is the deployment's envelope type. The rotation steps never look
/// inside it; only the target does.
pub trait TargetResource<E>: Send + Sync
where
    E: Serialize + DeserializeOwned + Send + Sync,
{
    /// Replaces the credential material in `envelope` with fresh material,
    /// leaving every other field untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GenerationFailed`] if no material can be produced.
    fn generate_secret(&self, envelope: &mut E) -> impl Future<Output = Result<()>> + Send;

    /// Applies the envelope's credential to the resource.
    ///
    /// Applying the same envelope twice must succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApplyFailed`] if the resource rejects the change.
    fn set_secret(&self, envelope: &E) -> impl Future<Output = Result<()>> + Send;

    /// Authenticates against the resource with the envelope's credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VerificationFailed`] if authentication fails.
    fn try_connection(&self, envelope: &E) -> impl Future<Output = Result<()>> + Send;
}

/// A credential file of `user:password` lines, as read by services that
/// authenticate clients against a local password file.
#[derive(Debug, Clone)]
pub struct CredentialFileTarget {
    path: PathBuf,
    policy: PasswordPolicy,
}

impl CredentialFileTarget {
    /// Number of draws before giving up on producing a changed password.
    const MAX_GENERATION_ATTEMPTS: usize = 8;

    /// Creates a target over `path` generating passwords with `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the policy is invalid.
    pub fn new(path: impl Into<PathBuf>, policy: PasswordPolicy) -> Result<Self> {
        policy.validate().map_err(|e| Error::Config {
            reason: format!("invalid password policy: {e}"),
        })?;
        Ok(Self {
            path: path.into(),
            policy,
        })
    }

    /// Returns the path of the credential file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_lines(&self) -> std::io::Result<Zeroizing<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Zeroizing::new(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Zeroizing::new(String::new())),
            Err(e) => Err(e),
        }
    }
}

fn check_fields(credential: &DatabaseCredential) -> std::result::Result<(), String> {
    let user = credential.login();
    if user.is_empty() {
        return Err("credential has no user".to_string());
    }
    if user.contains([':', '\n', '\r']) {
        return Err("user name cannot contain ':' or line breaks".to_string());
    }
    if credential.password.contains(['\n', '\r']) {
        return Err("password cannot contain line breaks".to_string());
    }
    Ok(())
}

impl TargetResource<DatabaseCredential> for CredentialFileTarget {
    async fn generate_secret(&self, envelope: &mut DatabaseCredential) -> Result<()> {
        for _ in 0..Self::MAX_GENERATION_ATTEMPTS {
            let candidate = Zeroizing::new(self.policy.generate()?);
            if !bool::from(candidate.as_bytes().ct_eq(envelope.password.as_bytes())) {
                envelope.password.zeroize();
                envelope.password.push_str(&candidate);
                return Ok(());
            }
        }
        Err(Error::GenerationFailed {
            reason: "password policy keeps producing the current password".to_string(),
        })
    }

    async fn set_secret(&self, envelope: &DatabaseCredential) -> Result<()> {
        check_fields(envelope).map_err(|reason| Error::ApplyFailed { reason })?;

        let current = self.read_lines().await.map_err(|e| Error::ApplyFailed {
            reason: format!("failed to read '{}': {e}", self.path.display()),
        })?;

        let login = envelope.login();
        let entry = Zeroizing::new(format!("{login}:{}", envelope.password));
        let mut replaced = false;
        let mut lines: Vec<&str> = Vec::new();
        for line in current.lines() {
            let user = line.split_once(':').map_or(line, |(user, _)| user);
            if user == login {
                if !replaced {
                    lines.push(&entry);
                    replaced = true;
                }
            } else {
                lines.push(line);
            }
        }
        if !replaced {
            lines.push(&entry);
        }

        let mut updated = Zeroizing::new(lines.join("\n"));
        updated.push('\n');
        if *updated == *current {
            debug!(path = %self.path.display(), "credential already applied");
            return Ok(());
        }

        // Unique per write so overlapping applies never share a temporary.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".tmp.{}", Uuid::new_v4()));
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, updated.as_bytes())
            .await
            .map_err(|e| Error::ApplyFailed {
                reason: format!("failed to write '{}': {e}", tmp.display()),
            })?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::ApplyFailed {
                reason: format!("failed to replace '{}': {e}", self.path.display()),
            });
        }
        debug!(path = %self.path.display(), user = %login, "credential applied");
        Ok(())
    }

    async fn try_connection(&self, envelope: &DatabaseCredential) -> Result<()> {
        let current = self.read_lines().await.map_err(|e| Error::VerificationFailed {
            reason: format!("failed to read '{}': {e}", self.path.display()),
        })?;

        let stored = current
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(user, _)| *user == envelope.login())
            .map(|(_, password)| password)
            .ok_or_else(|| Error::VerificationFailed {
                reason: format!("user {} is unknown to the resource", envelope.login()),
            })?;

        if bool::from(stored.as_bytes().ct_eq(envelope.password.as_bytes())) {
            Ok(())
        } else {
            Err(Error::VerificationFailed {
                reason: format!("password rejected for user {}", envelope.login()),
            })
        }
    }
}
