//! Error types for the rotation engine.

use thiserror::Error;

/// Errors that can occur while running a rotation step.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested secret, version or stage does not exist in the store.
    #[error("not found: {secret_id}: {detail}")]
    NotFound {
        /// The secret that was looked up.
        secret_id: String,
        /// What exactly was missing.
        detail: String,
    },

    /// A label promotion lost a race against another writer.
    #[error("conflict on {secret_id}: {detail}")]
    Conflict {
        /// The secret whose labels changed underneath us.
        secret_id: String,
        /// Description of the conflicting state.
        detail: String,
    },

    /// The target resource could not produce new credential material.
    #[error("credential generation failed: {reason}")]
    GenerationFailed {
        /// The reason generation failed.
        reason: String,
    },

    /// The target resource could not apply the pending credential.
    #[error("credential apply failed: {reason}")]
    ApplyFailed {
        /// The reason the apply failed.
        reason: String,
    },

    /// The pending credential did not authenticate against the target.
    #[error("verification failed: {reason}")]
    VerificationFailed {
        /// The reason verification failed.
        reason: String,
    },

    /// The invocation named a step outside the rotation protocol.
    #[error("unknown step {step}")]
    UnknownStep {
        /// The offending step name.
        step: String,
    },

    /// Envelope or document (de)serialization failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// The reason serialization failed.
        reason: String,
    },

    /// The invocation payload is malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// The reason the request was rejected.
        reason: String,
    },

    /// The backing storage of a secret store failed.
    #[error("storage error: {reason}")]
    Storage {
        /// The reason the storage operation failed.
        reason: String,
    },

    /// Encryption or decryption of stored secret values failed.
    #[error("encryption error: {reason}")]
    Encryption {
        /// The reason encryption failed.
        reason: String,
    },

    /// Configuration is missing or invalid.
    #[error("configuration error: {reason}")]
    Config {
        /// The reason the configuration was rejected.
        reason: String,
    },

    /// The invoker cancelled the invocation.
    #[error("invocation cancelled")]
    Cancelled,

    /// The invocation deadline elapsed before the step completed.
    #[error("invocation deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Returns true if the invoker may retry the same step later.
    ///
    /// The engine itself never retries; this only classifies failures for
    /// the transport that owns the retry policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::GenerationFailed { .. }
                | Self::ApplyFailed { .. }
                | Self::Storage { .. }
                | Self::Cancelled
                | Self::DeadlineExceeded
        )
    }

    /// Returns true for a store lookup miss.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(secret_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            secret_id: secret_id.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn conflict(secret_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            secret_id: secret_id.into(),
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;
