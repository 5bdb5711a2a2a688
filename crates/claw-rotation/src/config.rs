//! Rotator configuration.
//!
//! Configuration for the `claw-rotate` binary:
//! - Location of the encrypted secret store and its master key
//! - The credential file acting as the target resource
//! - Per-step timeout and password policy

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::password::PasswordPolicy;

const fn default_step_timeout_secs() -> u64 {
    30
}

/// Main rotator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotatorConfig {
    /// Path of the JSON secret store document.
    pub store_path: PathBuf,
    /// Path of the file holding the base64 master key.
    pub master_key_path: PathBuf,
    /// Path of the `user:password` credential file.
    pub credential_file: PathBuf,
    /// Time budget for one step invocation, in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Policy for generated passwords.
    #[serde(default)]
    pub password: PasswordPolicy,
}

impl RotatorConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
            reason: format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| Error::Config {
            reason: format!("invalid JSON: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("store_path", &self.store_path),
            ("master_key_path", &self.master_key_path),
            ("credential_file", &self.credential_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::Config {
                    reason: format!("{name} cannot be empty"),
                });
            }
        }

        if self.step_timeout_secs == 0 {
            return Err(Error::Config {
                reason: "step_timeout_secs must be greater than 0".to_string(),
            });
        }

        self.password.validate().map_err(|e| Error::Config {
            reason: format!("invalid password policy: {e}"),
        })
    }

    /// Returns the per-step time budget.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}
