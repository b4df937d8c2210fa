//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// mu - Resolve templated multi-environment deployment specifications.
#[derive(Parser, Debug)]
#[command(name = "mu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the specification file (searched upwards when omitted).
    #[arg(short = 'f', long = "file", global = true, env = "MU_SPEC_FILE")]
    pub file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the template once and print the result.
    Render {
        /// Environment binding (empty for the discovery pass).
        #[arg(short, long, default_value = "")]
        environment: String,

        /// Extra template variables.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },

    /// List the environments declared by the specification.
    Environments,

    /// Resolve every environment and print the result.
    Parse {
        /// Extra template variables.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },

    /// Schema-validate every document of every pass.
    Validate {
        /// Schema file to use instead of the bundled one.
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Parse the legacy single-document `mu:` form.
    Legacy,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per log line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Commands {
    /// Returns the `--var` pairs as template context.
    #[must_use]
    pub fn context(&self) -> BTreeMap<String, String> {
        match self {
            Self::Render { vars, .. } | Self::Parse { vars } => vars.iter().cloned().collect(),
            Self::Environments | Self::Validate { .. } | Self::Legacy => BTreeMap::new(),
        }
    }
}

/// Parses a `KEY=VALUE` argument.
fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got \"{arg}\""))?;
    if key.is_empty() {
        return Err(String::from("variable name cannot be empty"));
    }
    Ok((key.to_string(), value.to_string()))
}
