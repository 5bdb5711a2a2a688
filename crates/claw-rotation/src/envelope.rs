//! Secret envelopes and their wire text.
//!
//! The store holds a secret version as UTF-8 JSON text ([`SecretString`]).
//! The rotation steps only ever touch that text at the [`encode`]/[`decode`]
//! boundary; everything in between works on the deployment's typed envelope.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;

/// The stored text of one secret version.
///
/// Zeroized on drop. Debug output is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps stored secret text.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the length of the text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretString")
            .field("len", &self.0.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecretString {}

/// Deserializes a typed envelope from stored secret text.
///
/// # Errors
///
/// Returns [`crate::Error::Serialization`] if the text is not a valid envelope.
pub fn decode<E: DeserializeOwned>(secret: &SecretString) -> Result<E> {
    Ok(serde_json::from_str(secret.expose())?)
}

/// Serializes a typed envelope into secret text.
///
/// # Errors
///
/// Returns [`crate::Error::Serialization`] if the envelope cannot be serialized.
pub fn encode<E: Serialize>(envelope: &E) -> Result<SecretString> {
    Ok(SecretString(serde_json::to_string(envelope)?))
}

/// Database-style login credential.
///
/// Fields the rotation does not know about are kept in `extra` so a rotated
/// version carries everything the operator stored in the original. That
/// includes a `username` key, which is written back under its own name.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCredential {
    /// Login name stored under `user`. See [`Self::login`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Login password; the field regenerated on every rotation.
    pub password: String,
    /// Host of the backing resource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Database name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dbname: String,
    /// Project the database belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// Branch of the project.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch_id: String,
    /// Any other fields present in the stored JSON.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DatabaseCredential {
    /// Returns the login name: `user`, or a string `username` field when
    /// `user` is absent.
    #[must_use]
    pub fn login(&self) -> &str {
        if !self.user.is_empty() {
            return &self.user;
        }
        self.extra
            .get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

impl fmt::Debug for DatabaseCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredential")
            .field("user", &self.login())
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("dbname", &self.dbname)
            .field("project_id", &self.project_id)
            .field("branch_id", &self.branch_id)
            .field("extra_fields", &self.extra.len())
            .finish()
    }
}

impl Drop for DatabaseCredential {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: &str = r#"{
"dbname": "foo",
"user": "bar",
"host": "dev",
"project_id": "baz",
"branch_id": "br-foo",
"password": "P0"}"#;

    fn stored_credential() -> DatabaseCredential {
        DatabaseCredential {
            user: "bar".to_string(),
            password: "P0".to_string(),
            host: "dev".to_string(),
            dbname: "foo".to_string(),
            project_id: "baz".to_string(),
            branch_id: "br-foo".to_string(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn decode_full_credential() {
        let decoded: DatabaseCredential =
            decode(&SecretString::new(STORED)).expect("valid envelope");
        assert_eq!(decoded, stored_credential());
    }

    #[test]
    fn decode_malformed_text_is_serialization_error() {
        let result: Result<DatabaseCredential> = decode(&SecretString::new("{"));
        assert!(matches!(result, Err(crate::Error::Serialization { .. })));
    }

    #[test]
    fn username_key_is_read_and_written_back_unchanged() {
        let decoded: DatabaseCredential =
            decode(&SecretString::new(r#"{"username":"app","password":"x"}"#))
                .expect("valid envelope");
        assert_eq!(decoded.login(), "app");
        assert!(decoded.user.is_empty());

        let encoded = encode(&decoded).expect("encode");
        let value: serde_json::Value = serde_json::from_str(encoded.expose()).expect("json");
        assert_eq!(value["username"], "app");
        assert!(value.get("user").is_none());
    }

    #[test]
    fn user_key_takes_precedence_for_login() {
        let decoded: DatabaseCredential =
            decode(&SecretString::new(r#"{"user":"app","username":"legacy","password":"x"}"#))
                .expect("valid envelope");
        assert_eq!(decoded.login(), "app");

        let encoded = encode(&decoded).expect("encode");
        let value: serde_json::Value = serde_json::from_str(encoded.expose()).expect("json");
        assert_eq!(value["user"], "app");
        assert_eq!(value["username"], "legacy");
    }

    #[test]
    fn missing_login_decodes_empty() {
        let decoded: DatabaseCredential =
            decode(&SecretString::new(r#"{"password":"x"}"#)).expect("valid envelope");
        assert_eq!(decoded.login(), "");
    }

    #[test]
    fn unknown_fields_survive_reencoding() {
        let text = r#"{"user":"app","password":"x","port":5432,"engine":"postgres"}"#;
        let decoded: DatabaseCredential = decode(&SecretString::new(text)).expect("decode");
        assert_eq!(decoded.extra.len(), 2);

        let encoded = encode(&decoded).expect("encode");
        let value: serde_json::Value = serde_json::from_str(encoded.expose()).expect("json");
        assert_eq!(value["port"], 5432);
        assert_eq!(value["engine"], "postgres");
    }

    #[test]
    fn debug_redacts_secrets() {
        let secret = SecretString::new(STORED);
        let debug = format!("{secret:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("P0"));

        let debug = format!("{:?}", stored_credential());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("P0"));
    }

    #[test]
    fn secret_string_equality() {
        assert_eq!(SecretString::new("abc"), SecretString::new("abc"));
        assert_ne!(SecretString::new("abc"), SecretString::new("abd"));
    }
}
