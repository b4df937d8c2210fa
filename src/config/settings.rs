//! Parser settings and their environment overrides.
//!
//! Settings are read in this order, later sources winning:
//!
//! 1. Built-in defaults
//! 2. A `.env` file next to the specification file
//! 3. `MU_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{MuError, Result};

use super::preprocessor::{EnvironmentSource, ProcessEnvironment};
use super::shell::DEFAULT_COMMAND_TIMEOUT;
use super::spec::DEFAULT_ENVIRONMENT;
use super::validator::SchemaValidator;

/// Overrides the `cmd()` timeout, in seconds.
pub const ENV_COMMAND_TIMEOUT: &str = "MU_COMMAND_TIMEOUT_SECS";
/// Overrides the default environment name.
pub const ENV_DEFAULT_ENVIRONMENT: &str = "MU_DEFAULT_ENVIRONMENT";
/// Points at an external schema file.
pub const ENV_SCHEMA_PATH: &str = "MU_SCHEMA_PATH";
/// Enables or disables schema validation.
pub const ENV_VALIDATE: &str = "MU_VALIDATE";

/// Settings shared by every pass of a parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    /// Timeout applied to each `cmd()` call.
    pub command_timeout: Duration,
    /// Environment used when the specification declares none.
    pub default_environment: String,
    /// External schema, the bundled one when `None`.
    pub schema_path: Option<PathBuf>,
    /// Whether every loaded document is schema-validated.
    pub validate: bool,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            schema_path: None,
            validate: false,
        }
    }
}

impl ParserSettings {
    /// Returns the defaults with `MU_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_overrides(&ProcessEnvironment)?;
        Ok(settings)
    }

    /// Applies `MU_*` overrides read from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn apply_overrides(&mut self, source: &dyn EnvironmentSource) -> Result<()> {
        if let Some(secs) = source.var(ENV_COMMAND_TIMEOUT) {
            debug!("Overriding command timeout from environment");
            let secs: u64 = secs.trim().parse().map_err(|_| {
                MuError::settings(format!("{ENV_COMMAND_TIMEOUT} must be a whole number of seconds, got \"{secs}\""))
            })?;
            if secs == 0 {
                return Err(MuError::settings(format!("{ENV_COMMAND_TIMEOUT} must be greater than 0")));
            }
            self.command_timeout = Duration::from_secs(secs);
        }

        if let Some(name) = source.var(ENV_DEFAULT_ENVIRONMENT) {
            debug!("Overriding default environment from environment");
            if name.is_empty() {
                return Err(MuError::settings(format!("{ENV_DEFAULT_ENVIRONMENT} cannot be empty")));
            }
            self.default_environment = name;
        }

        if let Some(path) = source.var(ENV_SCHEMA_PATH) {
            debug!("Overriding schema path from environment");
            self.schema_path = Some(PathBuf::from(path));
        }

        if let Some(flag) = source.var(ENV_VALIDATE) {
            debug!("Overriding schema validation from environment");
            self.validate = parse_flag(&flag)
                .ok_or_else(|| MuError::settings(format!("{ENV_VALIDATE} must be a boolean, got \"{flag}\"")))?;
        }

        Ok(())
    }

    /// Compiles the configured schema when validation is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be loaded.
    pub fn schema_validator(&self) -> Result<Option<SchemaValidator>> {
        if !self.validate {
            return Ok(None);
        }

        let validator = match &self.schema_path {
            Some(path) => SchemaValidator::from_path(path)?,
            None => SchemaValidator::new()?,
        };
        Ok(Some(validator))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Loads `<dir>/.env` into the process environment if it exists.
///
/// Returns whether a file was loaded. Variables already set are kept.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_dotenv(dir: impl AsRef<Path>) -> Result<bool> {
    let env_path = dir.as_ref().join(".env");

    if !env_path.exists() {
        debug!(".env file not found at: {}", env_path.display());
        return Ok(false);
    }

    info!("Loading environment from: {}", env_path.display());
    dotenvy::from_path(&env_path).map_err(|e| {
        MuError::settings(format!("failed to load {}: {e}", env_path.display()))
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = ParserSettings::default();
        assert_eq!(settings.command_timeout, Duration::from_secs(10));
        assert_eq!(settings.default_environment, "development");
        assert!(settings.schema_path.is_none());
        assert!(!settings.validate);
    }

    #[test]
    fn test_overrides() {
        let mut settings = ParserSettings::default();
        settings
            .apply_overrides(&source(&[
                (ENV_COMMAND_TIMEOUT, "30"),
                (ENV_DEFAULT_ENVIRONMENT, "local"),
                (ENV_SCHEMA_PATH, "/etc/mu/schema.json"),
                (ENV_VALIDATE, "yes"),
            ]))
            .unwrap();

        assert_eq!(settings.command_timeout, Duration::from_secs(30));
        assert_eq!(settings.default_environment, "local");
        assert_eq!(settings.schema_path, Some(PathBuf::from("/etc/mu/schema.json")));
        assert!(settings.validate);
    }

    #[test]
    fn test_invalid_overrides() {
        for pairs in [
            [(ENV_COMMAND_TIMEOUT, "soon")],
            [(ENV_COMMAND_TIMEOUT, "0")],
            [(ENV_DEFAULT_ENVIRONMENT, "")],
            [(ENV_VALIDATE, "maybe")],
        ] {
            let mut settings = ParserSettings::default();
            let result = settings.apply_overrides(&source(&pairs));
            assert!(matches!(result, Err(MuError::Settings(_))), "{pairs:?}");
        }
    }

    #[test]
    fn test_schema_validator_only_when_enabled() {
        assert!(ParserSettings::default().schema_validator().unwrap().is_none());

        let settings = ParserSettings {
            validate: true,
            ..ParserSettings::default()
        };
        assert!(settings.schema_validator().unwrap().is_some());
    }

    #[test]
    fn test_missing_schema_path_fails() {
        let settings = ParserSettings {
            validate: true,
            schema_path: Some(PathBuf::from("aliens.json")),
            ..ParserSettings::default()
        };
        assert!(settings.schema_validator().is_err());
    }

    #[test]
    fn test_load_dotenv_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!load_dotenv(dir.path()).unwrap());
    }

    #[test]
    fn test_load_dotenv_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "MU_TEST_BROKEN='unterminated\n").unwrap();
        assert!(load_dotenv(dir.path()).is_err());
    }
}
