//! Secret resolution seam.
//!
//! The compiler only asks whether a named secret can be resolved; raw values
//! are fetched when a simulation is launched and handed straight to the
//! sandboxed process.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resolves named credentials to usable values.
pub trait SecretResolver: Send + Sync {
    /// Whether `name` refers to a secret this resolver can produce.
    fn contains(&self, name: &str) -> bool;

    /// Resolve `name` to its value.
    fn resolve(&self, name: &str) -> Option<SecretValue>;
}

/// A resolved secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Fixed set of secrets held in memory (tests, CLI, single-user setups).
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    values: BTreeMap<String, SecretValue>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), SecretValue::new(value));
    }
}

impl SecretResolver for StaticSecretResolver {
    fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn resolve(&self, name: &str) -> Option<SecretValue> {
        self.values.get(name).cloned()
    }
}

/// Names declared by the editor without values. Used for browser-side
/// compilation where no secret material is available.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSecrets {
    names: BTreeSet<String>,
}

impl DeclaredSecrets {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl SecretResolver for DeclaredSecrets {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn resolve(&self, _name: &str) -> Option<SecretValue> {
        None
    }
}
