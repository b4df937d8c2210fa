//! Multi-document YAML loading.
//!
//! A rendered `mu.yml` is usually split into several `---` separated
//! documents (environments, containers, actions, resources). The default
//! policy parses each document on its own and drops the ones that fail,
//! so one broken block never hides its siblings. Dropped documents are
//! reported back and logged.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LoadError, Result};

use super::converter::Converter;

/// How the loader treats malformed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Drop malformed documents and keep the rest.
    #[default]
    FaultTolerant,
    /// Require exactly one well-formed document.
    Strict,
}

/// A document that failed to load and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedDocument {
    /// Zero-based index among non-empty documents.
    pub index: usize,
    /// One-based line of the error, or of the document start.
    pub line: usize,
    /// Parser diagnostic.
    pub message: String,
}

/// Result of loading a document stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedDocuments {
    /// Successfully loaded documents, in stream order.
    pub documents: Vec<Value>,
    /// Documents that were dropped.
    pub dropped: Vec<DroppedDocument>,
}

/// Loader for YAML document streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct Loader {
    /// Active policy.
    policy: LoadPolicy,
    /// YAML to JSON converter.
    converter: Converter,
}

/// Raw text of one document and where it starts.
#[derive(Debug)]
struct RawDocument {
    line: usize,
    text: String,
}

impl Loader {
    /// Creates a fault-tolerant loader.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: LoadPolicy::FaultTolerant,
            converter: Converter::new(),
        }
    }

    /// Sets the loading policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the loading policy.
    #[must_use]
    pub const fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Loads every document of `input` according to the active policy.
    ///
    /// # Errors
    ///
    /// Under [`LoadPolicy::FaultTolerant`] this never fails. Under
    /// [`LoadPolicy::Strict`] it fails as [`Loader::load_strict`] does.
    pub fn load(&self, input: &str) -> Result<LoadedDocuments> {
        match self.policy {
            LoadPolicy::FaultTolerant => Ok(self.load_tolerant(input)),
            LoadPolicy::Strict => {
                let document = self.load_strict(input)?;
                let documents = if document.is_null() {
                    Vec::new()
                } else {
                    vec![document]
                };
                Ok(LoadedDocuments {
                    documents,
                    dropped: Vec::new(),
                })
            }
        }
    }

    /// Loads exactly one document.
    ///
    /// Input without any document yields `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input holds more than one document or the
    /// document fails to parse or convert.
    pub fn load_strict(&self, input: &str) -> Result<Value> {
        let raw = split_documents(input);
        match raw.as_slice() {
            [] => Ok(Value::Null),
            [document] => self.parse_document(0, document).map_err(|dropped| {
                LoadError::DocumentParse {
                    index: dropped.index,
                    line: dropped.line,
                    message: dropped.message,
                }
                .into()
            }),
            _ => Err(LoadError::MultipleDocuments { count: raw.len() }.into()),
        }
    }

    fn load_tolerant(&self, input: &str) -> LoadedDocuments {
        let mut loaded = LoadedDocuments::default();

        for (index, raw) in split_documents(input).iter().enumerate() {
            match self.parse_document(index, raw) {
                Ok(document) => loaded.documents.push(document),
                Err(dropped) => {
                    warn!(
                        "Dropping YAML document {} (line {}): {}",
                        dropped.index, dropped.line, dropped.message
                    );
                    loaded.dropped.push(dropped);
                }
            }
        }

        debug!(
            "Loaded {} document(s), dropped {}",
            loaded.documents.len(),
            loaded.dropped.len()
        );
        loaded
    }

    fn parse_document(&self, index: usize, raw: &RawDocument) -> std::result::Result<Value, DroppedDocument> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(&raw.text).map_err(|e| {
            let line = e
                .location()
                .map_or(raw.line, |location| raw.line + location.line() - 1);
            DroppedDocument {
                index,
                line,
                message: e.to_string(),
            }
        })?;

        self.converter.to_json(yaml).map_err(|e| DroppedDocument {
            index,
            line: raw.line,
            message: e.to_string(),
        })
    }
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
}

/// True if the line carries anything besides markers and comments.
fn has_content(line: &str) -> bool {
    let rest = if is_marker(line, "---") || is_marker(line, "...") {
        &line[3..]
    } else {
        line
    };
    let rest = rest.trim();
    !rest.is_empty() && !rest.starts_with('#')
}

/// Splits a stream into its documents, skipping empty ones.
///
/// Each document keeps its own start marker so `serde_yaml` sees a single
/// document. Directives are carried over to the document that follows them.
fn split_documents(input: &str) -> Vec<RawDocument> {
    let mut documents = Vec::new();
    let mut current = RawDocument {
        line: 1,
        text: String::new(),
    };
    let mut content = false;
    let mut directives = String::new();

    let mut flush = |current: &mut RawDocument, content: &mut bool, next_line: usize| {
        let finished = std::mem::replace(
            current,
            RawDocument {
                line: next_line,
                text: String::new(),
            },
        );
        if std::mem::take(content) {
            documents.push(finished);
        }
    };

    for (i, line) in input.lines().enumerate() {
        let number = i + 1;

        if line.starts_with('%') && !content {
            directives.push_str(line);
            directives.push('\n');
        } else if is_marker(line, "---") {
            flush(&mut current, &mut content, number);
            current.text.push_str(&std::mem::take(&mut directives));
            current.text.push_str(line);
            current.text.push('\n');
            content = has_content(line);
        } else if is_marker(line, "...") {
            flush(&mut current, &mut content, number + 1);
        } else {
            content |= has_content(line);
            current.text.push_str(line);
            current.text.push('\n');
        }
    }

    if !directives.is_empty() {
        current.text.push_str(&directives);
        content = true;
    }
    flush(&mut current, &mut content, 0);

    documents
}
