//! YAML to JSON conversion.
//!
//! Loaded YAML documents are handed to the rest of the pipeline as
//! `serde_json` values so that schema validation and declaration decoding
//! operate on one data model.

use serde_json::{Map, Number, Value};
use serde_yaml::Value as YamlValue;

use crate::error::{LoadError, MuError, Result};

use super::loader::Loader;

/// Converts YAML values into JSON-compatible values.
#[derive(Debug, Default, Clone, Copy)]
pub struct Converter;

impl Converter {
    /// Creates a new converter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Converts a parsed YAML value into a JSON value.
    ///
    /// Tags are dropped, scalar mapping keys are stringified, and
    /// non-finite floats become `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping key is itself a sequence or mapping.
    pub fn to_json(&self, value: YamlValue) -> Result<Value> {
        Ok(match value {
            YamlValue::Null => Value::Null,
            YamlValue::Bool(b) => Value::Bool(b),
            YamlValue::Number(n) => convert_number(&n),
            YamlValue::String(s) => Value::String(s),
            YamlValue::Sequence(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.to_json(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            YamlValue::Mapping(mapping) => {
                let mut object = Map::with_capacity(mapping.len());
                for (key, item) in mapping {
                    object.insert(convert_key(&key)?, self.to_json(item)?);
                }
                Value::Object(object)
            }
            YamlValue::Tagged(tagged) => self.to_json(tagged.value)?,
        })
    }

    /// Converts a single YAML document into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the input does not parse as exactly one
    /// document or its top level is not a mapping.
    pub fn convert_str(&self, input: &str) -> Result<Map<String, Value>> {
        let value = Loader::new().load_strict(input).map_err(|e| match e {
            MuError::Load(LoadError::ConversionFailed { .. }) => e,
            MuError::Load(other) => LoadError::conversion(other.to_string()).into(),
            other => other,
        })?;

        match value {
            Value::Object(object) => Ok(object),
            other => Err(LoadError::conversion(format!(
                "top level must be a mapping, found {}",
                json_type_name(&other)
            ))
            .into()),
        }
    }
}

fn convert_number(number: &serde_yaml::Number) -> Value {
    if let Some(i) = number.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = number.as_u64() {
        Value::Number(u.into())
    } else {
        number
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

fn convert_key(key: &YamlValue) -> Result<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Null => Ok(String::new()),
        YamlValue::Tagged(tagged) => convert_key(&tagged.value),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => Err(LoadError::conversion(
            "mapping keys must be scalars",
        )
        .into()),
    }
}

/// Returns the JSON type name of a value, for diagnostics.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
