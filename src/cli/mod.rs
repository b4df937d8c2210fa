//! CLI module for the mu specification tool.
//!
//! This module provides the command-line interface for rendering,
//! validating and resolving `mu.yml` files.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
