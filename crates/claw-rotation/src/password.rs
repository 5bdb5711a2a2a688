//! Random password generation.
//!
//! [`PasswordPolicy`] exposes the usual "random password" knobs of managed
//! secret stores: length, excluded characters, excluded character classes,
//! and whether every included class must appear at least once.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &str = "0123456789";
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Constraints for generated passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Number of characters.
    pub length: usize,
    /// Characters that must never appear.
    pub exclude_characters: String,
    /// Leave out digits.
    pub exclude_numbers: bool,
    /// Leave out ASCII punctuation.
    pub exclude_punctuation: bool,
    /// Leave out uppercase letters.
    pub exclude_uppercase: bool,
    /// Leave out lowercase letters.
    pub exclude_lowercase: bool,
    /// Allow the space character.
    pub include_space: bool,
    /// Require at least one character from every included class.
    pub require_each_included_type: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 32,
            exclude_characters: String::new(),
            exclude_numbers: false,
            exclude_punctuation: false,
            exclude_uppercase: false,
            exclude_lowercase: false,
            include_space: false,
            require_each_included_type: true,
        }
    }
}

impl PasswordPolicy {
    /// Smallest allowed password length.
    pub const MIN_LENGTH: usize = 8;

    /// Largest allowed password length.
    pub const MAX_LENGTH: usize = 4096;

    /// Checks that the policy can produce at least one password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GenerationFailed`] if the length is out of range, the
    /// alphabet is empty, or the length cannot fit one of every required class.
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&self.length) {
            return Err(Error::GenerationFailed {
                reason: format!(
                    "password length {} outside {}..={}",
                    self.length,
                    Self::MIN_LENGTH,
                    Self::MAX_LENGTH
                ),
            });
        }

        let classes = self.classes();
        if classes.is_empty() {
            return Err(Error::GenerationFailed {
                reason: "password policy leaves no characters to choose from".to_string(),
            });
        }
        if self.require_each_included_type && classes.len() > self.length {
            return Err(Error::GenerationFailed {
                reason: format!(
                    "password length {} cannot hold one of each of {} character classes",
                    self.length,
                    classes.len()
                ),
            });
        }
        Ok(())
    }

    /// Generates a password conforming to the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GenerationFailed`] if the policy is invalid.
    pub fn generate(&self) -> Result<String> {
        self.validate()?;

        let classes = self.classes();
        let alphabet: Vec<char> = classes.iter().flatten().copied().collect();
        let mut rng = rand::thread_rng();
        let mut chars: Vec<char> = Vec::with_capacity(self.length);

        if self.require_each_included_type {
            for class in &classes {
                if let Some(c) = class.choose(&mut rng) {
                    chars.push(*c);
                }
            }
        }
        while chars.len() < self.length {
            chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        chars.shuffle(&mut rng);

        Ok(chars.into_iter().collect())
    }

    /// Returns the non-empty character classes left after exclusions.
    fn classes(&self) -> Vec<Vec<char>> {
        let mut sets: Vec<&str> = Vec::with_capacity(5);
        if !self.exclude_lowercase {
            sets.push(LOWERCASE);
        }
        if !self.exclude_uppercase {
            sets.push(UPPERCASE);
        }
        if !self.exclude_numbers {
            sets.push(NUMBERS);
        }
        if !self.exclude_punctuation {
            sets.push(PUNCTUATION);
        }
        if self.include_space {
            sets.push(" ");
        }

        sets.into_iter()
            .map(|set| {
                set.chars()
                    .filter(|c| !self.exclude_characters.contains(*c))
                    .collect::<Vec<_>>()
            })
            .filter(|class| !class.is_empty())
            .collect()
    }
}
