//! The invocation event delivered to the rotator.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{SecretId, Step, VersionId};

/// One step invocation, as delivered by the secret store's scheduler.
///
/// Fields are kept as raw strings so that an unknown step name surfaces as
/// [`Error::UnknownStep`] rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRequest {
    /// Secret being rotated.
    #[serde(rename = "SecretId")]
    pub secret_id: String,
    /// Version id shared by all four steps of one rotation attempt.
    #[serde(rename = "ClientRequestToken")]
    pub token: String,
    /// Step name, e.g. `createSecret`.
    #[serde(rename = "Step")]
    pub step: String,
}

impl RotationRequest {
    /// Builds a request for a parsed step.
    #[must_use]
    pub fn new(secret_id: &SecretId, token: &VersionId, step: Step) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            token: token.to_string(),
            step: step.as_str().to_string(),
        }
    }

    /// Parses a request from its JSON event form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the event is not valid JSON or
    /// lacks one of the three fields.
    pub fn from_json(event: &str) -> Result<Self> {
        serde_json::from_str(event).map_err(|e| Error::InvalidRequest {
            reason: format!("malformed rotation event: {e}"),
        })
    }

    /// Returns the parsed step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStep`] for anything but the four step names.
    pub fn step(&self) -> Result<Step> {
        self.step.parse()
    }

    /// Returns the validated secret id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the id is malformed.
    pub fn secret_id(&self) -> Result<SecretId> {
        SecretId::new(self.secret_id.as_str())
    }

    /// Returns the validated client request token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the token is malformed.
    pub fn token(&self) -> Result<VersionId> {
        VersionId::new(self.token.as_str())
    }
}
