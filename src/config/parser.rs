//! Two-pass resolution of `mu.yml` into a [`Spec`].
//!
//! The first pass renders the template with an empty environment binding to
//! discover the environments, containers and actions. The second pass renders
//! it again once per environment, so `{{ environment }}` and conditionals on
//! it resolve, and collects that environment's resources.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{LoadError, MuError, PreprocessError, ResolveError, Result};

use super::converter::json_type_name;
use super::loader::Loader;
use super::preprocessor::{EnvironmentLedger, EnvironmentSource, Preprocessor, ProcessEnvironment, Rendered};
use super::settings::ParserSettings;
use super::spec::{
    ACTIONS_TAG, CONTAINERS_TAG, Declaration, ENVIRONMENTS_TAG, EnvironmentEntry, EnvironmentSpec,
    LEGACY_TAG, LegacySpec, RESOURCES_TAG, ResourceDeclaration, ResourceKind, Spec,
};
use super::validator::SchemaValidator;

/// Specification file names searched for, in order.
pub const DEFAULT_SPEC_FILES: &[&str] = &["mu.yml", "mu.yaml"];

/// Resolves `mu.yml` templates.
#[derive(Debug, Clone)]
pub struct Parser {
    /// Shared settings.
    settings: ParserSettings,
    /// Extra template context.
    context: BTreeMap<String, String>,
    /// Validator applied to every document, if any.
    validator: Option<Arc<SchemaValidator>>,
    /// Where `env()` reads from.
    source: Arc<dyn EnvironmentSource>,
}

/// Documents produced by one render and load.
#[derive(Debug)]
struct Pass {
    documents: Vec<Value>,
    environment_variables: EnvironmentLedger,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser with default settings and no schema validation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: ParserSettings::default(),
            context: BTreeMap::new(),
            validator: None,
            source: Arc::new(ProcessEnvironment),
        }
    }

    /// Creates a parser from settings, compiling the schema when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if validation is enabled and the schema cannot be
    /// loaded.
    pub fn from_settings(settings: ParserSettings) -> Result<Self> {
        let validator = settings.schema_validator()?;
        let parser = Self::new().with_settings(settings);
        Ok(match validator {
            Some(validator) => parser.with_validator(validator),
            None => parser,
        })
    }

    /// Replaces the settings. Does not touch the validator.
    #[must_use]
    pub fn with_settings(mut self, settings: ParserSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds extra template context.
    #[must_use]
    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context.extend(context);
        self
    }

    /// Validates every loaded document against `validator`.
    #[must_use]
    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Sets where `env()` reads variables from.
    #[must_use]
    pub fn with_environment_source(mut self, source: Arc<dyn EnvironmentSource>) -> Self {
        self.source = source;
        self
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// Parses a specification into its per-environment resources.
    ///
    /// # Errors
    ///
    /// Any failure in any pass aborts the whole parse.
    pub fn parse(&self, input: &str) -> Result<Spec> {
        let build_time = chrono::Utc::now().timestamp_millis();
        info!("Parsing specification (build time {build_time})");

        let discovery = self.run_pass(input, "", build_time)?;
        let entries = self.environment_entries(&discovery.documents)?;
        let containers = decode_declarations(&discovery.documents, CONTAINERS_TAG)?;
        let actions = decode_declarations(&discovery.documents, ACTIONS_TAG)?;

        info!(
            "Discovered {} environment(s), {} container(s), {} action(s)",
            entries.len(),
            containers.len(),
            actions.len()
        );

        let mut environment_variables = discovery.environment_variables;
        let mut environments = Vec::with_capacity(entries.len());

        for entry in entries {
            let pass = self.run_pass(input, &entry.name, build_time)?;
            let mut resources = decode_resources(&pass.documents, &entry.name)?;
            resources.push(ResourceDeclaration::Environment(entry.config));

            debug!(
                "Environment \"{}\" resolved {} declaration(s)",
                entry.name,
                resources.len()
            );

            environment_variables.extend(pass.environment_variables.clone());
            environments.push(EnvironmentSpec {
                name: entry.name,
                resources,
                environment_variables: pass.environment_variables,
            });
        }

        Ok(Spec {
            actions,
            containers,
            environments,
            environment_variables,
        })
    }

    /// Reads and parses a specification file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the parse fails.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Spec> {
        let input = read_spec_file(path.as_ref())?;
        self.parse(&input)
    }

    /// Runs the discovery pass only and returns the declared environments.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or `environments` is malformed.
    pub fn discover_environments(&self, input: &str) -> Result<Vec<EnvironmentEntry>> {
        let build_time = chrono::Utc::now().timestamp_millis();
        let discovery = self.run_pass(input, "", build_time)?;
        self.environment_entries(&discovery.documents)
    }

    /// Renders `input` once for `environment`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render(&self, input: &str, environment: &str) -> Result<Rendered> {
        let build_time = chrono::Utc::now().timestamp_millis();
        self.preprocessor(environment, build_time).render(input)
    }

    /// Parses the legacy single-document form with a `mu:` root.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly one mapping document or
    /// `mu:` is malformed.
    pub fn parse_legacy(&self, input: &str) -> Result<LegacySpec> {
        let build_time = chrono::Utc::now().timestamp_millis();
        let rendered = self.preprocessor("", build_time).render(input)?;

        let document = Loader::new().load_strict(&rendered.output)?;
        let mut object = match document {
            Value::Object(object) => object,
            other => {
                return Err(LoadError::conversion(format!(
                    "top level must be a mapping, found {}",
                    json_type_name(&other)
                ))
                .into());
            }
        };

        if let Some(validator) = &self.validator {
            validator.ensure_valid(&Value::Object(object.clone()), 0)?;
        }

        let version = object.remove("version");
        let constructs = match object.remove(LEGACY_TAG) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    Declaration::from_value(item).map_err(|message| invalid_declaration(LEGACY_TAG, None, index, message))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(kind, body)| Declaration { kind, body })
                .collect(),
            Some(other) => {
                return Err(ResolveError::InvalidRootTag {
                    tag: LEGACY_TAG.to_string(),
                    found: json_type_name(&other).to_string(),
                }
                .into());
            }
        };

        debug!("Legacy specification holds {} construct(s)", constructs.len());
        Ok(LegacySpec { version, constructs })
    }

    fn preprocessor(&self, environment: &str, build_time: i64) -> Preprocessor {
        Preprocessor::new(environment)
            .with_context(self.context.clone())
            .with_build_time(build_time)
            .with_command_timeout(self.settings.command_timeout)
            .with_environment_source(Arc::clone(&self.source))
    }

    /// Renders, loads and optionally validates the input for one binding.
    fn run_pass(&self, input: &str, environment: &str, build_time: i64) -> Result<Pass> {
        debug!("Starting pass for environment \"{environment}\"");

        let rendered = self.preprocessor(environment, build_time).render(input)?;
        let loaded = Loader::new().load(&rendered.output)?;

        if let Some(validator) = &self.validator {
            for (index, document) in loaded.documents.iter().enumerate() {
                validator.ensure_valid(document, index)?;
            }
        }

        Ok(Pass {
            documents: loaded.documents,
            environment_variables: rendered.environment_variables,
        })
    }

    fn environment_entries(&self, documents: &[Value]) -> Result<Vec<EnvironmentEntry>> {
        let Some(items) = query_unique_list(documents, ENVIRONMENTS_TAG)? else {
            debug!(
                "No environments declared, using \"{}\"",
                self.settings.default_environment
            );
            return Ok(vec![EnvironmentEntry::named(self.settings.default_environment.clone())]);
        };

        if items.is_empty() {
            return Err(ResolveError::environments("the environments list is empty").into());
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let entry = EnvironmentEntry::from_value(item)
                .map_err(|message| ResolveError::environments(format!("entry {index}: {message}")))?;
            if !seen.insert(entry.name.clone()) {
                return Err(ResolveError::environments(format!(
                    "environment \"{}\" is declared more than once",
                    entry.name
                ))
                .into());
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

/// Returns the list under a root tag that may appear in one document only.
fn query_unique_list<'a>(documents: &'a [Value], tag: &str) -> Result<Option<&'a [Value]>> {
    let found: Vec<&Value> = documents
        .iter()
        .filter_map(|document| document.get(tag))
        .filter(|value| !value.is_null())
        .collect();

    match found.as_slice() {
        [] => Ok(None),
        [value] => root_list(tag, *value).map(Some),
        _ => Err(ResolveError::TooManyRootTags {
            tag: tag.to_string(),
            count: found.len(),
        }
        .into()),
    }
}

/// Concatenates the lists under a root tag across documents.
fn collect_lists<'a>(documents: &'a [Value], tag: &str) -> Result<Vec<&'a Value>> {
    let mut items = Vec::new();
    for value in documents
        .iter()
        .filter_map(|document| document.get(tag))
        .filter(|value| !value.is_null())
    {
        items.extend(root_list(tag, value)?);
    }
    debug!("Root tag \"{tag}\" holds {} item(s)", items.len());
    Ok(items)
}

fn root_list<'a>(tag: &str, value: &'a Value) -> Result<&'a [Value]> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        ResolveError::InvalidRootTag {
            tag: tag.to_string(),
            found: json_type_name(value).to_string(),
        }
        .into()
    })
}

fn decode_declarations(documents: &[Value], tag: &str) -> Result<Vec<Declaration>> {
    collect_lists(documents, tag)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            Declaration::from_value(item.clone()).map_err(|message| invalid_declaration(tag, None, index, message))
        })
        .collect()
}

fn decode_resources(documents: &[Value], environment: &str) -> Result<Vec<ResourceDeclaration>> {
    collect_lists(documents, RESOURCES_TAG)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let declaration = ResourceDeclaration::from_value(item.clone())
                .map_err(|message| invalid_declaration(RESOURCES_TAG, Some(environment), index, message))?;
            if declaration.kind() == ResourceKind::Environment {
                return Err(invalid_declaration(
                    RESOURCES_TAG,
                    Some(environment),
                    index,
                    String::from("environment blocks come from the environments list"),
                ));
            }
            Ok(declaration)
        })
        .collect()
}

fn invalid_declaration(tag: &str, scope: Option<&str>, index: usize, message: String) -> MuError {
    ResolveError::InvalidDeclaration {
        tag: tag.to_string(),
        scope: scope.map(ToString::to_string),
        index,
        message,
    }
    .into()
}

fn read_spec_file(path: &Path) -> Result<String> {
    info!("Loading specification from: {}", path.display());
    std::fs::read_to_string(path).map_err(|e| {
        debug!("Cannot read {}: {e}", path.display());
        PreprocessError::TemplateFileInaccessible {
            path: path.to_path_buf(),
        }
        .into()
    })
}

/// Finds the specification file in `start_dir` or its parents.
///
/// # Errors
///
/// Returns an error if no specification file is found.
pub fn find_spec_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_SPEC_FILES {
            let spec_path = current.join(filename);
            if spec_path.exists() {
                info!("Found specification file: {}", spec_path.display());
                return Ok(spec_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(PreprocessError::TemplateFileInaccessible {
        path: start.join(DEFAULT_SPEC_FILES[0]),
    }
    .into())
}
