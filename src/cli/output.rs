//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{EnvironmentEntry, LegacySpec, ResourceKind, Spec, SpecHasher};
use crate::error::{MuError, Result};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Environment row for table display.
#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Environment")]
    name: String,
    #[tabled(rename = "Services")]
    services: usize,
    #[tabled(rename = "Networks")]
    networks: usize,
    #[tabled(rename = "Storage")]
    storage: usize,
    #[tabled(rename = "Databases")]
    databases: usize,
    #[tabled(rename = "Env vars")]
    variables: usize,
    #[tabled(rename = "Hash")]
    hash: String,
}

/// Legacy construct row for table display.
#[derive(Tabled)]
struct ConstructRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Kind")]
    kind: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a resolved spec for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be serialized or hashed.
    pub fn format_spec(&self, spec: &Spec) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(spec),
            OutputFormat::Text => Self::format_spec_text(spec),
        }
    }

    /// Formats a spec as text.
    fn format_spec_text(spec: &Spec) -> Result<String> {
        let hasher = SpecHasher::new();
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} Specification {}",
            "▸".cyan(),
            hasher.short_hash(&hasher.hash_spec(spec)?).dimmed()
        );
        let _ = writeln!(output, "   Containers: {}", spec.containers.len());
        let _ = writeln!(output, "   Actions: {}\n", spec.actions.len());

        let rows = spec
            .environments
            .iter()
            .map(|env| {
                Ok(EnvironmentRow {
                    name: env.name.clone(),
                    services: env.resources_of(ResourceKind::Service).count(),
                    networks: env.resources_of(ResourceKind::Network).count(),
                    storage: env.resources_of(ResourceKind::Storage).count(),
                    databases: env.resources_of(ResourceKind::Database).count(),
                    variables: env.environment_variables.len(),
                    hash: hasher.short_hash(&hasher.hash_environment(env)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if !spec.environment_variables.is_empty() {
            let names: Vec<&str> = spec.environment_variables.keys().map(String::as_str).collect();
            let _ = writeln!(output, "\nEnvironment variables used: {}", names.join(", "));
        }

        Ok(output)
    }

    /// Formats the discovered environments.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn format_environments(&self, entries: &[EnvironmentEntry]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(entries),
            OutputFormat::Text => {
                let mut output = String::new();
                for entry in entries {
                    if entry.config.is_empty() {
                        let _ = writeln!(output, "{}", entry.name.green());
                    } else {
                        let keys: Vec<&str> = entry.config.keys().map(String::as_str).collect();
                        let _ = writeln!(output, "{} ({})", entry.name.green(), keys.join(", "));
                    }
                }
                Ok(output)
            }
        }
    }

    /// Formats a legacy spec.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn format_legacy(&self, legacy: &LegacySpec) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(legacy),
            OutputFormat::Text => {
                let mut output = String::new();
                if let Some(version) = &legacy.version {
                    let _ = writeln!(output, "Version: {version}");
                }
                let rows: Vec<ConstructRow> = legacy
                    .constructs
                    .iter()
                    .enumerate()
                    .map(|(i, c)| ConstructRow {
                        index: i + 1,
                        kind: c.kind.clone(),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                Ok(output)
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "success", "message": message });
                format!("{json}\n")
            }
            OutputFormat::Text => format!("{} {message}\n", "✓".green()),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| MuError::internal(format!("failed to serialize output: {e}")))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Declaration, EnvironmentLedger, EnvironmentSpec, ResourceDeclaration};
    use serde_json::json;

    fn spec() -> Spec {
        Spec {
            actions: vec![],
            containers: vec![Declaration {
                kind: String::from("docker"),
                body: json!({ "name": "app" }),
            }],
            environments: vec![EnvironmentSpec {
                name: String::from("production"),
                resources: vec![
                    ResourceDeclaration::Service(json!({ "name": "api" })),
                    ResourceDeclaration::Environment(serde_json::Map::new()),
                ],
                environment_variables: EnvironmentLedger::from([(
                    String::from("REGION"),
                    String::from("eu-west-1"),
                )]),
            }],
            environment_variables: EnvironmentLedger::from([(
                String::from("REGION"),
                String::from("eu-west-1"),
            )]),
        }
    }

    #[test]
    fn test_format_spec_json() {
        let output = OutputFormatter::new(OutputFormat::Json).format_spec(&spec()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["containers"][0], json!({ "docker": { "name": "app" } }));
        assert_eq!(value["environments"][0]["name"], "production");
    }

    #[test]
    fn test_format_spec_text() {
        let output = OutputFormatter::new(OutputFormat::Text).format_spec(&spec()).unwrap();
        assert!(output.contains("production"));
        assert!(output.contains("REGION"));
    }

    #[test]
    fn test_format_environments() {
        let mut configured = EnvironmentEntry::named("production");
        configured.config.insert(String::from("events"), json!({}));
        let entries = vec![EnvironmentEntry::named("acceptance"), configured];

        let text = OutputFormatter::new(OutputFormat::Text).format_environments(&entries).unwrap();
        assert!(text.contains("acceptance"));
        assert!(text.contains("events"));

        let json = OutputFormatter::new(OutputFormat::Json).format_environments(&entries).unwrap();
        assert!(json.contains("\"name\": \"production\""));
    }

    #[test]
    fn test_format_legacy_text() {
        let legacy = LegacySpec {
            version: Some(json!(0.1)),
            constructs: vec![Declaration {
                kind: String::from("fargate"),
                body: json!({ "name": "app" }),
            }],
        };
        let output = OutputFormatter::new(OutputFormat::Text).format_legacy(&legacy).unwrap();
        assert!(output.contains("Version: 0.1"));
        assert!(output.contains("fargate"));
    }
}
