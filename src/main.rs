//! mu CLI entrypoint.
//!
//! This is the main entrypoint for the mu command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mu_spec::cli::{Cli, Commands, LogFormat, OutputFormatter};
use mu_spec::config::{Parser, ParserSettings, SchemaValidator, find_spec_file, load_dotenv};
use mu_spec::error::{MuError, PreprocessError, Result};

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system. Logs go to stderr.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_env("MU_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Dispatches the selected command.
fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let spec_file = resolve_spec_path(cli.file.as_ref())?;

    // .env must be loaded before any render so env() sees it
    let base_dir = spec_file.parent().unwrap_or_else(|| Path::new("."));
    load_dotenv(base_dir)?;

    let settings = ParserSettings::from_env()?;
    let input = std::fs::read_to_string(&spec_file).map_err(|e| {
        debug!("Cannot read {}: {e}", spec_file.display());
        PreprocessError::TemplateFileInaccessible {
            path: spec_file.clone(),
        }
    })?;
    let context = cli.command.context();

    match cli.command {
        Commands::Render { environment, .. } => {
            let parser = Parser::new().with_settings(settings).with_context(context);
            let rendered = parser.render(&input, &environment)?;
            write_stdout(&rendered.output)
        }
        Commands::Environments => {
            let parser = Parser::from_settings(settings)?;
            let entries = parser.discover_environments(&input)?;
            write_stdout(&formatter.format_environments(&entries)?)
        }
        Commands::Parse { .. } => {
            let parser = Parser::from_settings(settings)?.with_context(context);
            let spec = parser.parse(&input)?;
            write_stdout(&formatter.format_spec(&spec)?)
        }
        Commands::Validate { schema } => {
            let validator = match schema.or_else(|| settings.schema_path.clone()) {
                Some(path) => SchemaValidator::from_path(path)?,
                None => SchemaValidator::new()?,
            };
            let parser = Parser::new().with_settings(settings).with_validator(validator);
            let spec = parser.parse(&input)?;
            write_stdout(&formatter.success(&format!(
                "{} is valid ({} environment(s))",
                spec_file.display(),
                spec.environments.len()
            )))
        }
        Commands::Legacy => {
            let parser = Parser::from_settings(settings)?;
            let legacy = parser.parse_legacy(&input)?;
            write_stdout(&formatter.format_legacy(&legacy)?)
        }
    }
}

/// Resolves the specification file path.
fn resolve_spec_path(path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(p) = path {
        return Ok(p.clone());
    }

    let cwd = std::env::current_dir()?;
    find_spec_file(cwd)
}

/// Writes command output to stdout.
fn write_stdout(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush().map_err(MuError::from)
}
