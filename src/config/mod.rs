//! Specification resolution pipeline for `mu.yml`.
//!
//! This module handles every stage of a parse:
//! - Rendering the template (`env()`, `cmd()`, `environment`, `build_time`)
//! - Loading multi-document YAML and converting it to JSON
//! - Optional schema validation
//! - Discovering environments and resolving each one
//! - Fingerprinting resolved specs

mod converter;
mod hash;
mod loader;
mod parser;
mod preprocessor;
mod settings;
mod shell;
mod spec;
mod validator;

pub use converter::{Converter, json_type_name};
pub use hash::SpecHasher;
pub use loader::{DroppedDocument, LoadPolicy, LoadedDocuments, Loader};
pub use parser::{DEFAULT_SPEC_FILES, Parser, find_spec_file};
pub use preprocessor::{EnvironmentLedger, EnvironmentSource, Preprocessor, ProcessEnvironment, Rendered};
pub use settings::{
    ENV_COMMAND_TIMEOUT, ENV_DEFAULT_ENVIRONMENT, ENV_SCHEMA_PATH, ENV_VALIDATE, ParserSettings,
    load_dotenv,
};
pub use shell::{DEFAULT_COMMAND_TIMEOUT, ShellError, run_command};
pub use spec::{
    ACTIONS_TAG, CONTAINERS_TAG, DEFAULT_ENVIRONMENT, Declaration, ENVIRONMENTS_TAG,
    EnvironmentEntry, EnvironmentSpec, LEGACY_TAG, LegacySpec, RESOURCES_TAG,
    ResourceDeclaration, ResourceKind, Spec,
};
pub use validator::{BUNDLED_SCHEMA, SchemaValidator, ValidationResult};
