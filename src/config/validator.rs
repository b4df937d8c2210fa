//! JSON schema validation for loaded documents.
//!
//! Every document of every pass can be checked against the bundled
//! `mu.schema.json` (or a user supplied schema). Validation never stops at
//! the first problem: all violations are collected with their instance and
//! schema paths so the caller can report them together.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError, SchemaViolation};

/// Schema bundled with the crate.
pub const BUNDLED_SCHEMA: &str = include_str!("../../schema/mu.schema.json");

/// Compiled JSON schema.
pub struct SchemaValidator {
    /// Where the schema came from, for diagnostics.
    source_name: String,
    /// Compiled validator.
    validator: jsonschema::Validator,
}

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Every violation found.
    pub violations: Vec<SchemaViolation>,
}

impl SchemaValidator {
    /// Compiles the bundled schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled schema does not compile.
    pub fn new() -> Result<Self> {
        let schema: Value = serde_json::from_str(BUNDLED_SCHEMA).map_err(|e| {
            SchemaError::InvalidSchema {
                source_name: String::from("bundled schema"),
                message: e.to_string(),
            }
        })?;
        Self::compile("bundled schema", &schema)
    }

    /// Reads and compiles a schema file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, is not JSON, or is not a
    /// valid schema.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        debug!("Loading schema from {source_name}");

        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::InvalidSchema {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;
        let schema: Value = serde_json::from_str(&content).map_err(|e| {
            SchemaError::InvalidSchema {
                source_name: source_name.clone(),
                message: e.to_string(),
            }
        })?;

        Self::compile(&source_name, &schema)
    }

    /// Compiles an in-memory schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid schema.
    pub fn from_value(schema: &Value) -> Result<Self> {
        Self::compile("inline schema", schema)
    }

    fn compile(source_name: &str, schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError::InvalidSchema {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source_name: source_name.to_string(),
            validator,
        })
    }

    /// Returns where the schema was loaded from.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Validates a document and collects every violation.
    #[must_use]
    pub fn validate_object(&self, document: &Value) -> ValidationResult {
        let violations = self
            .validator
            .iter_errors(document)
            .map(|error| SchemaViolation {
                instance_path: error.instance_path.to_string(),
                schema_path: error.schema_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        ValidationResult { violations }
    }

    /// Validates a document, failing if it has any violation.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ValidationFailed`] carrying every violation.
    pub fn ensure_valid(&self, document: &Value, index: usize) -> Result<()> {
        let result = self.validate_object(document);
        if result.is_valid() {
            return Ok(());
        }

        debug!(
            "Document {index} failed schema validation with {} violation(s)",
            result.error_count()
        );
        Err(SchemaError::ValidationFailed {
            document: index,
            violations: result.violations,
        }
        .into())
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("source_name", &self.source_name)
            .finish_non_exhaustive()
    }
}

impl ValidationResult {
    /// Returns true if no violation was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the number of violations.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.violations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MuError;
    use serde_json::json;

    fn validator() -> SchemaValidator {
        SchemaValidator::new().unwrap()
    }

    #[test]
    fn test_bundled_schema_compiles() {
        assert_eq!(validator().source_name(), "bundled schema");
    }

    #[test]
    fn test_valid_documents() {
        let v = validator();
        let documents = [
            json!({ "environments": ["acceptance", { "production": { "x": 2 } }] }),
            json!({ "resources": [{ "service": { "name": "api" } }] }),
            json!({ "containers": [{ "docker": { "name": "app" } }] }),
            json!({ "version": 0.1, "mu": [{ "fargate": { "name": "app" } }] }),
            json!({ "environments": null }),
        ];
        for document in &documents {
            let result = v.validate_object(document);
            assert!(result.is_valid(), "{document}: {:?}", result.violations);
        }
    }

    #[test]
    fn test_collects_all_violations() {
        let document = json!({
            "environments": [],
            "resources": [{ "lambda": {} }],
        });
        let result = validator().validate_object(&document);
        assert!(result.error_count() >= 2);
        assert!(result.violations.iter().any(|v| v.instance_path == "/environments"));
        assert!(result.violations.iter().any(|v| v.instance_path.starts_with("/resources")));
    }

    #[test]
    fn test_top_level_must_be_object() {
        let result = validator().validate_object(&json!([1, 2]));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_ensure_valid_reports_document_index() {
        let err = validator()
            .ensure_valid(&json!({ "actions": "deploy" }), 3)
            .unwrap_err();
        match err {
            MuError::Schema(SchemaError::ValidationFailed { document, violations }) => {
                assert_eq!(document, 3);
                assert!(!violations.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_schema_from_value() {
        let schema = json!({ "type": "object", "required": ["name"] });
        let v = SchemaValidator::from_value(&schema).unwrap();
        assert!(v.validate_object(&json!({ "name": "x" })).is_valid());
        assert!(!v.validate_object(&json!({})).is_valid());
    }

    #[test]
    fn test_invalid_schema() {
        let result = SchemaValidator::from_value(&json!({ "type": 12 }));
        assert!(matches!(
            result,
            Err(MuError::Schema(SchemaError::InvalidSchema { .. }))
        ));
    }

    #[test]
    fn test_missing_schema_file() {
        let result = SchemaValidator::from_path("aliens.schema.json");
        assert!(matches!(
            result,
            Err(MuError::Schema(SchemaError::InvalidSchema { .. }))
        ));
    }

    #[test]
    fn test_schema_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{ "type": "object" }"#).unwrap();

        let v = SchemaValidator::from_path(&path).unwrap();
        assert!(v.validate_object(&json!({})).is_valid());
    }
}
