//! Provider-managed secrets
//!
//! Secrets are resolved once per job, injected into step environments and
//! scrubbed from any captured output.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Opaque secret value; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for injection into a child process environment
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret '{name}' required by job '{job}' is not available")]
    Missing { name: String, job: String },
}

/// Source of secrets for a run
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SecretValue>;

    /// Resolve every name or report the first missing one
    fn resolve(&self, job: &str, names: &[String]) -> Result<HashMap<String, SecretValue>, SecretError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| SecretError::Missing {
                        name: name.clone(),
                        job: job.to_string(),
                    })
            })
            .collect()
    }
}

/// Reads secrets from the process environment, the way CI providers expose them
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretValue::new)
    }
}

/// Fixed set of secrets (tests, embedding)
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, SecretValue>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), SecretValue::new(value));
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        self.secrets.get(name).cloned()
    }
}

/// Replaces secret values with `***`
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    values: Vec<String>,
}

impl Redactor {
    pub fn new<'a>(secrets: impl IntoIterator<Item = &'a SecretValue>) -> Self {
        let mut values: Vec<String> = secrets
            .into_iter()
            .map(|s| s.expose().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        // Longest first so a secret containing another is fully masked
        values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        values.dedup();
        Self { values }
    }

    pub fn redact(&self, text: &str) -> String {
        self.values
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
