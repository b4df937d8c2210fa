//! Spec fingerprinting.
//!
//! A fingerprint is the SHA-256 of the canonical JSON form of a resolved
//! spec: object keys sorted, no whitespace. Two parses of the same input
//! under the same environment and shell state produce the same fingerprint.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MuError, Result};

use super::spec::{EnvironmentSpec, Spec};

/// Hasher for computing spec fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new spec hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a whole spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be serialized.
    pub fn hash_spec(&self, spec: &Spec) -> Result<String> {
        Self::hash_canonical(spec)
    }

    /// Computes the fingerprint of one environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be serialized.
    pub fn hash_environment(&self, environment: &EnvironmentSpec) -> Result<String> {
        Self::hash_canonical(environment)
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    fn hash_canonical<T: Serialize>(value: &T) -> Result<String> {
        // `Value` maps are ordered, which makes the encoding canonical.
        let canonical = serde_json::to_value(value)
            .and_then(|v| serde_json::to_vec(&v))
            .map_err(|e| MuError::internal(format!("failed to serialize spec: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::preprocessor::EnvironmentLedger;
    use crate::config::spec::ResourceDeclaration;
    use serde_json::json;

    fn environment(name: &str) -> EnvironmentSpec {
        EnvironmentSpec {
            name: name.to_string(),
            resources: vec![ResourceDeclaration::Service(json!({ "name": "api", "port": 80 }))],
            environment_variables: EnvironmentLedger::new(),
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = SpecHasher::new();
        let hash1 = hasher.hash_environment(&environment("production")).unwrap();
        let hash2 = hasher.hash_environment(&environment("production")).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_environments_different_hash() {
        let hasher = SpecHasher::new();
        let hash1 = hasher.hash_environment(&environment("acceptance")).unwrap();
        let hash2 = hasher.hash_environment(&environment("production")).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let hasher = SpecHasher::new();
        let mut reordered = environment("production");
        reordered.resources = vec![ResourceDeclaration::Service(
            serde_json::from_str(r#"{ "port": 80, "name": "api" }"#).unwrap(),
        )];

        assert_eq!(
            hasher.hash_environment(&environment("production")).unwrap(),
            hasher.hash_environment(&reordered).unwrap()
        );
    }

    #[test]
    fn test_spec_hash_covers_environments() {
        let hasher = SpecHasher::new();
        let spec = Spec {
            actions: vec![],
            containers: vec![],
            environments: vec![environment("production")],
            environment_variables: EnvironmentLedger::new(),
        };
        let mut changed = spec.clone();
        changed.environments.push(environment("acceptance"));

        assert_ne!(hasher.hash_spec(&spec).unwrap(), hasher.hash_spec(&changed).unwrap());
    }

    #[test]
    fn test_short_hash() {
        let hasher = SpecHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }
}
