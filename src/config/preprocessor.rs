//! Template preprocessing for `mu.yml`.
//!
//! The specification file is a Jinja-style template rendered through
//! `minijinja` before it is read as YAML. Two helpers are available to
//! template authors:
//!
//! - `env(name)`: value of an environment variable, or `""` when unset
//! - `cmd(command)`: trimmed stdout of a shell command
//!
//! and two implicit variables: `build_time` (epoch millis) and
//! `environment` (the environment being rendered, `""` during discovery).
//!
//! Rendering is strict: an undefined variable is an error, never a blank.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, Value};
use tracing::{debug, info, warn};

use crate::error::{PreprocessError, Result};

use super::shell::{run_command, DEFAULT_COMMAND_TIMEOUT};

/// Environment variables read through `env()`, keyed by name.
pub type EnvironmentLedger = BTreeMap<String, String>;

/// Source of values for the `env()` helper.
pub trait EnvironmentSource: Send + Sync + std::fmt::Debug {
    /// Returns the value of `name`, or `None` when it is not set.
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads variables from the live process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentSource for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|value| decode_os_value(name, value))
    }
}

/// Keeps a non UTF-8 value, replacing the invalid bytes.
fn decode_os_value(name: &str, value: OsString) -> String {
    value.into_string().unwrap_or_else(|raw| {
        warn!("Environment variable {name} is not valid UTF-8, replacing invalid bytes");
        raw.to_string_lossy().into_owned()
    })
}

impl EnvironmentSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Output of a single render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The rendered text.
    pub output: String,
    /// Every variable `env()` looked up during this render.
    pub environment_variables: EnvironmentLedger,
}

/// Renders `mu.yml` templates for one environment binding.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Environment name exposed as `environment`.
    environment: String,
    /// Extra string context, overridden by the implicit variables.
    context: BTreeMap<String, String>,
    /// Epoch millis exposed as `build_time`.
    build_time: i64,
    /// Timeout applied to each `cmd()` call.
    command_timeout: Duration,
    /// Where `env()` reads from.
    source: Arc<dyn EnvironmentSource>,
}

impl Preprocessor {
    /// Creates a preprocessor bound to `environment`, stamping the build time.
    #[must_use]
    pub fn new(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        let build_time = chrono::Utc::now().timestamp_millis();
        debug!("New preprocessor for environment \"{environment}\" at build time {build_time}");

        Self {
            environment,
            context: BTreeMap::new(),
            build_time,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            source: Arc::new(ProcessEnvironment),
        }
    }

    /// Adds extra context variables.
    #[must_use]
    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context.extend(context);
        self
    }

    /// Overrides the build time.
    #[must_use]
    pub const fn with_build_time(mut self, build_time: i64) -> Self {
        self.build_time = build_time;
        self
    }

    /// Sets the timeout applied to each `cmd()` call.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets where `env()` reads variables from.
    #[must_use]
    pub fn with_environment_source(mut self, source: Arc<dyn EnvironmentSource>) -> Self {
        self.source = source;
        self
    }

    /// Returns the environment binding.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the build time exposed to templates.
    #[must_use]
    pub const fn build_time(&self) -> i64 {
        self.build_time
    }

    /// Renders a template string.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is invalid, references an undefined
    /// variable, or one of the helpers fails.
    pub fn render(&self, input: &str) -> Result<Rendered> {
        debug!(
            "Rendering template for environment \"{}\" ({} bytes)",
            self.environment,
            input.len()
        );

        let ledger = Arc::new(Mutex::new(EnvironmentLedger::new()));
        let env = self.build_environment(&ledger);

        let output = env
            .render_str(input, self.template_context())
            .map_err(|e| recover_helper_error(&e))?;

        let environment_variables = std::mem::take(
            &mut *ledger.lock().unwrap_or_else(PoisonError::into_inner),
        );

        Ok(Rendered {
            output,
            environment_variables,
        })
    }

    /// Renders a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or rendering fails.
    pub fn render_file(&self, path: impl AsRef<Path>) -> Result<Rendered> {
        let path = path.as_ref();
        info!("Rendering template file: {}", path.display());

        let input = std::fs::read_to_string(path).map_err(|e| {
            debug!("Cannot read template file {}: {e}", path.display());
            PreprocessError::TemplateFileInaccessible {
                path: path.to_path_buf(),
            }
        })?;

        self.render(&input)
    }

    /// Builds a fresh engine; nothing is cached between renders.
    fn build_environment(&self, ledger: &Arc<Mutex<EnvironmentLedger>>) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let source = Arc::clone(&self.source);
        let env_ledger = Arc::clone(ledger);
        env.add_function("env", move |name: Option<Value>| -> std::result::Result<String, Error> {
            let Some(name) = name.as_ref().and_then(Value::as_str) else {
                return Err(helper_error(PreprocessError::EnvironmentVariableNotValid {
                    name: describe_argument(name.as_ref()),
                }));
            };
            debug!("Resolving environment variable {name}");
            let value = source.var(name).unwrap_or_default();
            env_ledger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), value.clone());
            Ok(value)
        });

        let timeout = self.command_timeout;
        env.add_function("cmd", move |command: Option<Value>| -> std::result::Result<String, Error> {
            let Some(command) = command.as_ref().and_then(Value::as_str) else {
                return Err(helper_error(PreprocessError::ShellCommandNotValid {
                    command: describe_argument(command.as_ref()),
                }));
            };
            run_command(command, timeout).map_err(|e| helper_error(e.into_preprocess(command)))
        });

        env
    }

    /// Extra context first, then the implicit variables, which win.
    fn template_context(&self) -> BTreeMap<String, Value> {
        let mut ctx: BTreeMap<String, Value> = self
            .context
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        ctx.insert(String::from("build_time"), Value::from(self.build_time));
        ctx.insert(String::from("environment"), Value::from(self.environment.as_str()));
        ctx
    }
}

/// Wraps a helper failure so it survives the trip through the engine.
fn helper_error(error: PreprocessError) -> Error {
    Error::new(ErrorKind::InvalidOperation, error.to_string()).with_source(error)
}

/// Recovers the typed helper failure behind an engine error, if any.
fn recover_helper_error(error: &Error) -> PreprocessError {
    let mut cause = std::error::Error::source(error);
    while let Some(current) = cause {
        if let Some(typed) = current.downcast_ref::<PreprocessError>() {
            return typed.clone();
        }
        cause = current.source();
    }

    PreprocessError::RenderFailed {
        message: error.to_string(),
    }
}

fn describe_argument(value: Option<&Value>) -> String {
    value.map_or_else(|| String::from("undefined"), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new("")
    }

    fn preprocess_error(result: Result<Rendered>) -> PreprocessError {
        let err = result.unwrap_err();
        err.as_preprocess()
            .cloned()
            .unwrap_or_else(|| panic!("expected a preprocessor error, got {err:?}"))
    }

    #[test]
    fn test_render_build_time() {
        let pp = preprocessor().with_build_time(1234);
        let result = pp.render("time: {{ build_time }}").unwrap();
        assert_eq!(result.output, "time: 1234");
    }

    #[test]
    fn test_build_time_is_stamped() {
        let pp = preprocessor();
        let result = pp.render("time: {{ build_time }}").unwrap();
        assert!(!result.output.contains("{{"));
        assert!(pp.build_time() > 0);
    }

    #[test]
    fn test_undefined_variable_fails() {
        let err = preprocess_error(preprocessor().render("time: {{ invalid }}"));
        assert!(matches!(err, PreprocessError::RenderFailed { .. }));
    }

    #[test]
    fn test_syntax_error_fails() {
        let err = preprocess_error(preprocessor().render("{% if %}"));
        assert!(matches!(err, PreprocessError::RenderFailed { .. }));
    }

    #[test]
    fn test_environment_binding() {
        let template = r#"x: {{ 1 if environment == "acceptance" else 3 }}"#;
        let acceptance = Preprocessor::new("acceptance").render(template).unwrap();
        let production = Preprocessor::new("production").render(template).unwrap();
        assert_eq!(acceptance.output, "x: 1");
        assert_eq!(production.output, "x: 3");
    }

    #[test]
    fn test_implicit_variables_override_context() {
        let context = BTreeMap::from([
            (String::from("environment"), String::from("spoofed")),
            (String::from("region"), String::from("eu-west-1")),
        ]);
        let pp = Preprocessor::new("production").with_context(context);
        let result = pp.render("{{ environment }} {{ region }}").unwrap();
        assert_eq!(result.output, "production eu-west-1");
    }

    #[test]
    fn test_trailing_newline_is_kept() {
        let result = preprocessor().render("a: 1\n").unwrap();
        assert_eq!(result.output, "a: 1\n");
    }

    #[test]
    fn test_env_reads_process_environment() {
        let expected = std::env::var("PATH").unwrap_or_default();
        let result = preprocessor().render(r#"{{ env("PATH") }}"#).unwrap();
        assert_eq!(result.output, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_value_is_kept() {
        use std::os::unix::ffi::OsStringExt;

        let value = OsString::from_vec(vec![b'e', b'u', 0xff]);
        assert_eq!(decode_os_value("REGION", value), "eu\u{fffd}");
        assert_eq!(decode_os_value("REGION", OsString::from("eu")), "eu");
    }

    #[test]
    fn test_env_records_ledger() {
        let source = HashMap::from([(String::from("USER"), String::from("mu"))]);
        let pp = preprocessor().with_environment_source(Arc::new(source));
        let result = pp.render(r#"user: {{ env("USER") }} {{ env("MISSING") }}"#).unwrap();
        assert_eq!(result.output, "user: mu ");
        assert_eq!(result.environment_variables.get("USER").map(String::as_str), Some("mu"));
        assert_eq!(result.environment_variables.get("MISSING").map(String::as_str), Some(""));
    }

    #[test]
    fn test_env_rejects_non_string() {
        let err = preprocess_error(preprocessor().render("{{ env(123) }}"));
        assert!(matches!(err, PreprocessError::EnvironmentVariableNotValid { .. }));

        let err = preprocess_error(preprocessor().render("{{ env() }}"));
        assert!(matches!(err, PreprocessError::EnvironmentVariableNotValid { .. }));

        assert!(preprocessor().render("{{ env(USER) }}").is_err());
    }

    #[test]
    fn test_cmd_rejects_non_string() {
        let err = preprocess_error(preprocessor().render("{{ cmd(123) }}"));
        assert!(matches!(err, PreprocessError::ShellCommandNotValid { .. }));

        let err = preprocess_error(preprocessor().render("{{ cmd() }}"));
        assert!(matches!(err, PreprocessError::ShellCommandNotValid { .. }));

        assert!(preprocessor().render("{{ cmd(whoami) }}").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_cmd_output() {
        let result = preprocessor()
            .render(r#"user: {{ cmd("echo mu | xargs echo") }}"#)
            .unwrap();
        assert_eq!(result.output, "user: mu");
    }

    #[cfg(unix)]
    #[test]
    fn test_cmd_sees_environment_binding() {
        let result = Preprocessor::new("staging")
            .render(r#"{{ cmd("echo " ~ environment) }}"#)
            .unwrap();
        assert_eq!(result.output, "staging");
    }

    #[cfg(unix)]
    #[test]
    fn test_cmd_failure_is_typed() {
        let err = preprocess_error(preprocessor().render(r#"user: {{ cmd("exit 1") }}"#));
        assert!(matches!(err, PreprocessError::ShellCommandFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_cmd_timeout() {
        let pp = preprocessor().with_command_timeout(Duration::from_millis(200));
        let err = preprocess_error(pp.render(r#"{{ cmd("sleep 5") }}"#));
        assert!(matches!(err, PreprocessError::ShellCommandFailed { .. }));
    }

    #[test]
    fn test_render_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mu.yml");
        std::fs::write(&path, "env: {{ environment }}\n").unwrap();

        let result = Preprocessor::new("development").render_file(&path).unwrap();
        assert_eq!(result.output, "env: development\n");
    }

    #[test]
    fn test_render_missing_file() {
        let err = preprocess_error(preprocessor().render_file("aliens.yml"));
        assert!(matches!(err, PreprocessError::TemplateFileInaccessible { .. }));
    }
}
