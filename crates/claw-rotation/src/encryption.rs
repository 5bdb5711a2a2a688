//! At-rest encryption for the file-backed store.
//!
//! Values are sealed with ChaCha20-Poly1305 under a key derived per secret
//! from a master key. The version token is bound as associated data, so a
//! ciphertext copied onto another version fails to open.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::envelope::SecretString;
use crate::error::{Error, Result};
use crate::types::{SecretId, VersionId};

/// Size of the master key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Master key of a [`crate::store::FileSecretStore`].
///
/// Zeroized on drop; debug output is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly [`KEY_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::Encryption {
                reason: format!("key must be exactly {KEY_SIZE} bytes, got {}", bytes.len()),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Parses a base64 key, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base64 or has the wrong length.
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(STANDARD.decode(text.trim()).map_err(|e| {
            Error::Encryption {
                reason: format!("master key is not valid base64: {e}"),
            }
        })?);
        Self::from_bytes(&bytes)
    }

    /// Encodes the key as base64 for a key file.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    fn derive_for_secret(&self, secret_id: &SecretId) -> Zeroizing<[u8; KEY_SIZE]> {
        let context = format!("claw-rotation v1 {}", secret_id.as_str());
        Zeroizing::new(blake3::derive_key(&context, &self.bytes))
    }

    fn cipher(&self, secret_id: &SecretId) -> Result<ChaCha20Poly1305> {
        let key = self.derive_for_secret(secret_id);
        ChaCha20Poly1305::new_from_slice(&key[..]).map_err(|e| Error::Encryption {
            reason: format!("failed to create cipher: {e}"),
        })
    }

    /// Encrypts a version's value; output is base64 of `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(
        &self,
        secret_id: &SecretId,
        version: &VersionId,
        value: &SecretString,
    ) -> Result<String> {
        let cipher = self.cipher(secret_id)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: value.expose().as_bytes(),
                    aad: version.as_str().as_bytes(),
                },
            )
            .map_err(|e| Error::Encryption {
                reason: format!("encryption failed: {e}"),
            })?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }

    /// Decrypts a value produced by [`MasterKey::seal`] for the same secret and version.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed, was sealed under another
    /// key, secret or version, or has been tampered with.
    pub fn open(
        &self,
        secret_id: &SecretId,
        version: &VersionId,
        sealed: &str,
    ) -> Result<SecretString> {
        let raw = STANDARD.decode(sealed).map_err(|e| Error::Encryption {
            reason: format!("sealed value is not valid base64: {e}"),
        })?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Encryption {
                reason: format!(
                    "ciphertext too short: expected at least {} bytes, got {}",
                    NONCE_SIZE + TAG_SIZE,
                    raw.len()
                ),
            });
        }

        let cipher = self.cipher(secret_id)?;
        let (nonce, encrypted) = raw.split_at(NONCE_SIZE);
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: encrypted,
                        aad: version.as_str().as_bytes(),
                    },
                )
                .map_err(|e| Error::Encryption {
                    reason: format!("decryption failed: {e}"),
                })?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|e| Error::Serialization {
            reason: format!("decrypted value is not UTF-8: {e}"),
        })?;
        Ok(SecretString::new(text))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
