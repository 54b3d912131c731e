//! Configuration loading for FieldMesh components.
//!
//! Config structs are plain serde types with `Default` impls. They are read from a
//! TOML or JSON file and then patched from `FIELDMESH_`-prefixed environment
//! variables. Nested keys use a double underscore:
//! `FIELDMESH_DELIVERY__CAPACITY=500` sets `delivery.capacity`.

use crate::{FieldMeshError, FieldMeshResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "FIELDMESH_";

/// Trait for configuration that can check its own consistency
pub trait Validatable {
    /// Validate this object
    fn validate(&self) -> FieldMeshResult<()>;

    /// Check if this object is valid
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn auto_detect<P: AsRef<Path>>(path: P) -> FieldMeshResult<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(FieldMeshError::config(
                "Cannot detect config format from file extension",
            )),
        }
    }

    /// Parse text in this format into a JSON value tree
    pub fn parse(self, content: &str) -> FieldMeshResult<Value> {
        match self {
            Self::Toml => {
                let value: toml::Value = content
                    .parse()
                    .map_err(|e| FieldMeshError::config(format!("Failed to parse TOML: {e}")))?;
                serde_json::to_value(value)
                    .map_err(|e| FieldMeshError::config(format!("Failed to convert TOML: {e}")))
            }
            Self::Json => serde_json::from_str(content)
                .map_err(|e| FieldMeshError::config(format!("Failed to parse JSON: {e}"))),
        }
    }
}

/// Load a config file and apply `FIELDMESH_` environment overrides.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> FieldMeshResult<T> {
    load_config_with_prefix(path, ENV_PREFIX)
}

/// Load a config file and apply environment overrides using a custom prefix.
pub fn load_config_with_prefix<T: DeserializeOwned>(
    path: impl AsRef<Path>,
    prefix: &str,
) -> FieldMeshResult<T> {
    let path = path.as_ref();
    let format = ConfigFormat::auto_detect(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        FieldMeshError::config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    let mut value = format.parse(&content)?;
    apply_env_overrides(&mut value, std::env::vars(), prefix);
    debug!(path = %path.display(), "loaded configuration");

    serde_json::from_value(value)
        .map_err(|e| FieldMeshError::config(format!("Invalid configuration: {e}")))
}

/// Patch a value tree with `prefix`-ed variables.
///
/// Variable values that parse as JSON scalars (numbers, booleans) keep their type;
/// everything else is inserted as a string.
pub fn apply_env_overrides<I>(value: &mut Value, vars: I, prefix: &str)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw) in vars {
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };
        let path: Vec<String> = stripped
            .split("__")
            .map(|segment| segment.trim_matches('_').to_lowercase())
            .filter(|segment| !segment.is_empty())
            .collect();
        if path.is_empty() {
            continue;
        }

        let parsed = match serde_json::from_str::<Value>(&raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(raw),
        };
        set_path(value, &path, parsed);
    }
}

fn set_path(root: &mut Value, path: &[String], new_value: Value) {
    let mut current = root;
    for segment in &path[..path.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let (Value::Object(map), Some(last)) = (current, path.last()) {
        map.insert(last.clone(), new_value);
    }
}
