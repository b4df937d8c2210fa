//! Error types for the mu specification pipeline.
//!
//! This module provides the error hierarchy for every stage of a parse:
//! template preprocessing, document loading, schema validation, and
//! environment resolution. Every error aborts the whole parse; there is no
//! partial output.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the mu specification pipeline.
#[derive(Debug, Error)]
pub enum MuError {
    /// Template preprocessing errors.
    #[error("Preprocessor error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Document loading and conversion errors.
    #[error("Loader error: {0}")]
    Load(#[from] LoadError),

    /// Schema errors.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Environment and declaration resolution errors.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Invalid parser settings or `.env` file.
    #[error("Settings error: {0}")]
    Settings(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while rendering a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreprocessError {
    /// `env()` was called without a string argument.
    #[error("environment variable name \"{name}\" is invalid")]
    EnvironmentVariableNotValid {
        /// Rendering of the offending argument.
        name: String,
    },

    /// `cmd()` was called without a string argument.
    #[error("shell command \"{command}\" is invalid")]
    ShellCommandNotValid {
        /// Rendering of the offending argument.
        command: String,
    },

    /// A shell command exited non-zero, timed out, or could not run.
    #[error("shell command \"{command}\" failed: {reason}")]
    ShellCommandFailed {
        /// The command text as written in the template.
        command: String,
        /// Why the command failed.
        reason: String,
    },

    /// The template engine rejected the template.
    #[error("template failed to render: {message}")]
    RenderFailed {
        /// Engine diagnostic, including the line when known.
        message: String,
    },

    /// A template file could not be read.
    #[error("template file is inaccessible: {path}")]
    TemplateFileInaccessible {
        /// Path of the template file.
        path: PathBuf,
    },
}

/// Errors raised while loading YAML documents.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A document failed to parse under the strict policy.
    #[error("document {index} (line {line}) failed to parse: {message}")]
    DocumentParse {
        /// Zero-based index of the document in the stream.
        index: usize,
        /// One-based line where the document starts.
        line: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// The strict policy found more than one document.
    #[error("expected a single YAML document, found {count}")]
    MultipleDocuments {
        /// Number of documents found.
        count: usize,
    },

    /// A YAML value could not be turned into a JSON object.
    #[error("YAML to JSON conversion failed: {message}")]
    ConversionFailed {
        /// Description of the failure.
        message: String,
    },
}

/// Schema construction and validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema itself is missing or malformed.
    #[error("unable to load schema from {source_name}: {message}")]
    InvalidSchema {
        /// Where the schema was loaded from.
        source_name: String,
        /// Description of the problem.
        message: String,
    },

    /// A document does not conform to the schema.
    #[error("schema validation failed for document {document} with {} violation(s)", .violations.len())]
    ValidationFailed {
        /// Index of the failing document within its pass.
        document: usize,
        /// Every violation reported by the validator.
        violations: Vec<SchemaViolation>,
    },
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value.
    pub instance_path: String,
    /// JSON pointer to the schema keyword that failed.
    pub schema_path: String,
    /// Human-readable message.
    pub message: String,
}

/// Errors raised while resolving environments and declarations.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A unique root tag appears in more than one document.
    #[error("too many root tags: \"{tag}\" is declared in {count} documents")]
    TooManyRootTags {
        /// The root tag name.
        tag: String,
        /// Number of documents declaring it.
        count: usize,
    },

    /// A root tag holds something other than a list.
    #[error("root tag \"{tag}\" must be a list, found {found}")]
    InvalidRootTag {
        /// The root tag name.
        tag: String,
        /// JSON type that was found.
        found: String,
    },

    /// The environments list is malformed.
    #[error("invalid environments: {message}")]
    InvalidEnvironments {
        /// Description of the problem.
        message: String,
    },

    /// An element of a declaration list is malformed.
    #[error("invalid {tag} declaration at index {index}{}: {message}", scope_suffix(.scope))]
    InvalidDeclaration {
        /// Root tag the declaration belongs to.
        tag: String,
        /// Environment pass, when environment-scoped.
        scope: Option<String>,
        /// Index within the concatenated list.
        index: usize,
        /// Description of the problem.
        message: String,
    },
}

fn scope_suffix(scope: &Option<String>) -> String {
    scope
        .as_ref()
        .map(|name| format!(" in environment \"{name}\""))
        .unwrap_or_default()
}

/// Result type alias for mu operations.
pub type Result<T> = std::result::Result<T, MuError>;

impl MuError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a new settings error with the given message.
    #[must_use]
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }

    /// Returns the process exit code for this error class.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Preprocess(_) => 2,
            Self::Load(_) => 3,
            Self::Schema(_) => 4,
            Self::Resolve(_) => 5,
            Self::Settings(_) | Self::Io(_) | Self::Internal(_) => 1,
        }
    }

    /// Returns the preprocessor error, if this is one.
    #[must_use]
    pub const fn as_preprocess(&self) -> Option<&PreprocessError> {
        match self {
            Self::Preprocess(e) => Some(e),
            _ => None,
        }
    }
}

impl PreprocessError {
    /// Creates a shell failure for the given command.
    #[must_use]
    pub fn shell_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShellCommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout failure for the given command.
    #[must_use]
    pub fn shell_timed_out(command: impl Into<String>, timeout: Duration) -> Self {
        Self::ShellCommandFailed {
            command: command.into(),
            reason: format!("timed out after {timeout:?}"),
        }
    }
}

impl LoadError {
    /// Creates a conversion error with the given message.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::ConversionFailed {
            message: message.into(),
        }
    }
}

impl ResolveError {
    /// Creates an environments error with the given message.
    #[must_use]
    pub fn environments(message: impl Into<String>) -> Self {
        Self::InvalidEnvironments {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.instance_path.is_empty() {
            "/"
        } else {
            self.instance_path.as_str()
        };
        write!(f, "{path}: {}", self.message)
    }
}
