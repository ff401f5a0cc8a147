//! Credentials in the configuration are stored as secret strings.
//!
//! A key can be provided in different ways:
//!
//! # From an environment variable
//! key: "`env:LANGFUSE_SECRET_KEY`"
//!
//! # Directly in the configuration file
//! key: "text:sk-lf-..."
//!
//! # From a file
//! key: "<file:/run/secrets/openai>
//!
//! Given a configuration like:
//! ```toml
//! [langfuse]
//! secret_key = "env:LANGFUSE_SECRET_KEY"
//! ```
//!
//! The `secret_key` field will be deserialized into an [`ApiKey`]. The secret is never printed or
//! serialized; both render as `ApiKey(****)`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone)]
pub struct ApiKey(SecretString);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl ApiKey {
    pub fn new(secret: SecretString) -> Self {
        ApiKey(secret)
    }

    /// Reads the key from an environment variable, if it is set and not blank
    #[must_use]
    pub fn from_env(var_name: &str) -> Option<Self> {
        std::env::var(var_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(ApiKey::from)
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }
}

impl<T: AsRef<str>> From<T> for ApiKey {
    fn from(secret: T) -> Self {
        ApiKey(SecretString::from(secret.as_ref()))
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if let Some(var_name) = s.strip_prefix("env:") {
            let secret = std::env::var(var_name).map_err(|err| {
                serde::de::Error::custom(format!("could not read `{var_name}`: {err}"))
            })?;
            Ok(ApiKey(SecretString::from(secret)))
        } else if let Some(secret) = s.strip_prefix("text:") {
            Ok(ApiKey(SecretString::from(secret)))
        } else if let Some(path) = s.strip_prefix("file:") {
            let secret = std::fs::read_to_string(path).map_err(serde::de::Error::custom)?;
            Ok(ApiKey(SecretString::from(secret.trim().to_string())))
        } else {
            Err(serde::de::Error::custom(
                "Invalid API key format, expected one of `env:`, `text:` or `file:`",
            ))
        }
    }
}

impl Serialize for ApiKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        "ApiKey(****)".serialize(serializer)
    }
}
