//! Resolved specification types.
//!
//! This module defines what a parse of `mu.yml` produces: global container
//! and action declarations, and for every environment an ordered list of
//! typed resource declarations.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use super::converter::json_type_name;
use super::preprocessor::EnvironmentLedger;

/// Root tag listing the target environments.
pub const ENVIRONMENTS_TAG: &str = "environments";
/// Root tag listing environment-scoped resources.
pub const RESOURCES_TAG: &str = "resources";
/// Root tag listing containers.
pub const CONTAINERS_TAG: &str = "containers";
/// Root tag listing pipeline actions.
pub const ACTIONS_TAG: &str = "actions";
/// Root tag of the legacy single-document form.
pub const LEGACY_TAG: &str = "mu";
/// Environment used when none are declared.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Kind of an environment-scoped resource declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A containerized service.
    Service,
    /// A network.
    Network,
    /// A storage bucket.
    Storage,
    /// A database.
    Database,
    /// The environment's own configuration block.
    Environment,
}

/// A single resource declaration, decoded from a one-key mapping such as
/// `{ service: {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceDeclaration {
    /// A containerized service.
    Service(Value),
    /// A network.
    Network(Value),
    /// A storage bucket.
    Storage(Value),
    /// A database.
    Database(Value),
    /// Synthesized from the environment's entry in `environments`.
    Environment(Map<String, Value>),
}

/// A declaration whose kinds are owned by the downstream layers
/// (containers, actions, legacy constructs).
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// The single top-level key.
    pub kind: String,
    /// The value under that key.
    pub body: Value,
}

/// One entry of the `environments` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentEntry {
    /// Environment name.
    pub name: String,
    /// Configuration block, empty for bare names.
    pub config: Map<String, Value>,
}

/// Resources resolved for a single environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentSpec {
    /// Environment name.
    pub name: String,
    /// Declarations in document order, ending with the environment block.
    pub resources: Vec<ResourceDeclaration>,
    /// Variables read through `env()` while rendering this environment.
    pub environment_variables: EnvironmentLedger,
}

/// The fully resolved specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spec {
    /// Pipeline actions (not environment-scoped).
    pub actions: Vec<Declaration>,
    /// Containers (not environment-scoped).
    pub containers: Vec<Declaration>,
    /// Environments in declaration order.
    pub environments: Vec<EnvironmentSpec>,
    /// Every variable read through `env()` during any pass.
    pub environment_variables: EnvironmentLedger,
}

/// The legacy single-document form: a `mu:` root holding constructs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySpec {
    /// Optional `version` field.
    pub version: Option<Value>,
    /// Constructs in declaration order.
    pub constructs: Vec<Declaration>,
}

impl ResourceKind {
    /// Returns the tag used in `mu.yml` and by construct factories.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Database => "database",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceDeclaration {
    /// Decodes a declaration from a one-key mapping.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the value is not a one-key
    /// mapping of a known kind.
    pub fn from_value(value: Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!(
                "expected a single-key mapping, found {}",
                json_type_name(&value)
            ));
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// Returns the declaration kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Service(_) => ResourceKind::Service,
            Self::Network(_) => ResourceKind::Network,
            Self::Storage(_) => ResourceKind::Storage,
            Self::Database(_) => ResourceKind::Database,
            Self::Environment(_) => ResourceKind::Environment,
        }
    }

    /// Returns the properties of a resource, `None` for the environment block.
    #[must_use]
    pub const fn props(&self) -> Option<&Value> {
        match self {
            Self::Service(v) | Self::Network(v) | Self::Storage(v) | Self::Database(v) => Some(v),
            Self::Environment(_) => None,
        }
    }
}

impl Declaration {
    /// Decodes a declaration from a one-key mapping.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the value is not a mapping
    /// with exactly one key.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!(
                "expected a single-key mapping, found {}",
                json_type_name(&value)
            ));
        };

        let count = map.len();
        let mut entries = map.into_iter();
        match (entries.next(), count) {
            (Some((kind, body)), 1) => Ok(Self { kind, body }),
            _ => Err(format!("expected exactly one key, found {count}")),
        }
    }
}

impl Serialize for Declaration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.kind, &self.body)?;
        map.end()
    }
}

impl EnvironmentEntry {
    /// Decodes an entry from a bare name or a `{ name: {...} }` mapping.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the entry is malformed.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(name) if !name.is_empty() => Ok(Self {
                name: name.clone(),
                config: Map::new(),
            }),
            Value::Object(map) if map.len() == 1 => {
                let Some((name, config)) = map.iter().next() else {
                    return Err(String::from("empty environment mapping"));
                };
                if name.is_empty() {
                    return Err(String::from("environment name cannot be empty"));
                }
                let config = match config {
                    Value::Object(config) => config.clone(),
                    Value::Null => Map::new(),
                    other => {
                        return Err(format!(
                            "configuration of \"{name}\" must be a mapping, found {}",
                            json_type_name(other)
                        ));
                    }
                };
                Ok(Self {
                    name: name.clone(),
                    config,
                })
            }
            Value::Object(map) => Err(format!(
                "an environment mapping must have exactly one key, found {}",
                map.len()
            )),
            Value::String(_) => Err(String::from("environment name cannot be empty")),
            other => Err(format!(
                "expected a name or a single-key mapping, found {}",
                json_type_name(other)
            )),
        }
    }

    /// Creates an entry without configuration.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Map::new(),
        }
    }
}

impl EnvironmentSpec {
    /// Returns the environment's configuration block.
    #[must_use]
    pub fn environment(&self) -> Option<&Map<String, Value>> {
        self.resources.iter().rev().find_map(|r| match r {
            ResourceDeclaration::Environment(config) => Some(config),
            _ => None,
        })
    }

    /// Returns the `events` block (pre/post-deploy hooks), if any.
    #[must_use]
    pub fn events(&self) -> Option<&Value> {
        self.environment().and_then(|config| config.get("events"))
    }

    /// Returns the declarations of the given kind.
    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceDeclaration> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }
}

impl Spec {
    /// Returns the resolved environment with the given name.
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Returns environment names in declaration order.
    #[must_use]
    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.iter().map(|e| e.name.as_str()).collect()
    }
}
