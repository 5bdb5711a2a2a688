//! Core types for the rotation protocol.
//!
//! - [`SecretId`]: identifier (name or ARN) of a secret in the store
//! - [`VersionId`]: a version token; the `ClientRequestToken` of a rotation attempt
//! - [`Stage`]: a staging label such as `AWSCURRENT`
//! - [`VersionStages`]: the version → labels table of one secret
//! - [`Step`]: one of the four rotation steps

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a secret in the store.
///
/// Accepts plain names and ARNs. Must be non-empty, at most
/// [`SecretId::MAX_LENGTH`] characters, and free of whitespace and control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretId(String);

impl SecretId {
    /// Maximum length of a secret identifier.
    pub const MAX_LENGTH: usize = 2048;

    /// Creates a new `SecretId` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the identifier is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "secret id cannot be empty".to_string(),
            });
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "secret id exceeds maximum length of {} characters",
                    Self::MAX_LENGTH
                ),
            });
        }
        if let Some(c) = id.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidRequest {
                reason: format!("secret id contains invalid character {c:?}"),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SecretId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SecretId> for String {
    fn from(id: SecretId) -> Self {
        id.0
    }
}

/// A secret version identifier.
///
/// During rotation this is the invoker's `ClientRequestToken`, stable across
/// every step and retry of one rotation attempt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId(String);

impl VersionId {
    /// Maximum length of a version token.
    pub const MAX_LENGTH: usize = 64;

    /// Creates a new `VersionId` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the token is empty, too long, or
    /// contains characters outside printable ASCII.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "version token cannot be empty".to_string(),
            });
        }
        if token.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "version token exceeds maximum length of {} characters",
                    Self::MAX_LENGTH
                ),
            });
        }
        if !token.chars().all(|c| c.is_ascii_graphic()) {
            return Err(Error::InvalidRequest {
                reason: "version token must be printable ASCII without spaces".to_string(),
            });
        }
        Ok(Self(token))
    }

    /// Generates a fresh random token (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VersionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.0
    }
}

/// A staging label attached to a secret version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    /// `AWSCURRENT`: the credential live at the backing resource.
    Current,
    /// `AWSPENDING`: the candidate credential of an in-flight rotation.
    Pending,
    /// `AWSPREVIOUS`: the credential that was current before the last promotion.
    Previous,
    /// Any other operator-defined label.
    Custom(String),
}

impl Stage {
    /// Wire name of [`Stage::Current`].
    pub const CURRENT: &'static str = "AWSCURRENT";
    /// Wire name of [`Stage::Pending`].
    pub const PENDING: &'static str = "AWSPENDING";
    /// Wire name of [`Stage::Previous`].
    pub const PREVIOUS: &'static str = "AWSPREVIOUS";

    /// Returns the wire name of the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Current => Self::CURRENT,
            Self::Pending => Self::PENDING,
            Self::Previous => Self::PREVIOUS,
            Self::Custom(label) => label,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Stage {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::CURRENT => Self::Current,
            Self::PENDING => Self::Pending,
            Self::PREVIOUS => Self::Previous,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Stage {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Custom(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

/// The version → staging labels table of one secret.
///
/// Versions without labels are kept; the store decides when to forget them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStages(BTreeMap<VersionId, BTreeSet<Stage>>);

impl VersionStages {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `version` with the given labels, replacing any previous entry.
    pub fn insert(&mut self, version: VersionId, stages: impl IntoIterator<Item = Stage>) {
        self.0.insert(version, stages.into_iter().collect());
    }

    /// Returns the labels of a version, if the version is known.
    #[must_use]
    pub fn stages_of(&self, version: &VersionId) -> Option<&BTreeSet<Stage>> {
        self.0.get(version)
    }

    /// Returns true if `version` carries `stage`.
    #[must_use]
    pub fn has_stage(&self, version: &VersionId, stage: &Stage) -> bool {
        self.0.get(version).is_some_and(|s| s.contains(stage))
    }

    /// Returns every version carrying `stage`, in token order.
    pub fn holders_of<'a>(&'a self, stage: &Stage) -> impl Iterator<Item = &'a VersionId> + use<'a> {
        let stage = stage.clone();
        self.0
            .iter()
            .filter(move |(_, stages)| stages.contains(&stage))
            .map(|(version, _)| version)
    }

    /// Returns the first version, in token order, carrying `stage`.
    #[must_use]
    pub fn holder_of(&self, stage: &Stage) -> Option<&VersionId> {
        self.holders_of(stage).next()
    }

    /// Iterates over all versions and their labels.
    pub fn iter(&self) -> impl Iterator<Item = (&VersionId, &BTreeSet<Stage>)> {
        self.0.iter()
    }

    /// Returns the number of known versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret has no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(VersionId, BTreeSet<Stage>)> for VersionStages {
    fn from_iter<I: IntoIterator<Item = (VersionId, BTreeSet<Stage>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One step of the rotation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Generate new material into a pending version.
    CreateSecret,
    /// Apply the pending credential to the backing resource.
    SetSecret,
    /// Verify the pending credential authenticates.
    TestSecret,
    /// Promote the pending version to current.
    FinishSecret,
}

impl Step {
    /// All steps, in protocol order.
    pub const ALL: [Self; 4] = [
        Self::CreateSecret,
        Self::SetSecret,
        Self::TestSecret,
        Self::FinishSecret,
    ];

    /// Returns the wire name of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateSecret => "createSecret",
            Self::SetSecret => "setSecret",
            Self::TestSecret => "testSecret",
            Self::FinishSecret => "finishSecret",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| Error::UnknownStep {
                step: s.to_string(),
            })
    }
}
