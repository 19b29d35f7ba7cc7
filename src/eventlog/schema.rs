//! Event schema registration
//!
//! A schema declares the properties an event may carry and the data
//! categories each property belongs to. Only registered `(id, version)`
//! pairs can be recorded.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::telemetry::{COMMAND_INVOCATIONS_SCHEMA, COMMAND_INVOCATIONS_VERSION};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{0} is required in schema specification")]
    MissingField(&'static str),

    #[error("Schema field {field} is malformed: {reason}")]
    Malformed { field: String, reason: String },

    #[error("Schema {id} version {version} has already been registered")]
    Duplicate { id: String, version: u64 },

    #[error("Schema {id} has property {property} beginning with __, which is not allowed")]
    ReservedProperty { id: String, property: String },

    #[error("Property {property} of schema {id} has no categories list")]
    MissingCategories { id: String, property: String },

    #[error("Schema {id} is not a valid JSON schema: {reason}")]
    Compile { id: String, reason: String },

    #[error("Failed to read schema file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One declared event property
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PropertySpec {
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Draft 7 validator compiled from a schema document
#[derive(Clone)]
pub struct CompiledSchema(Arc<jsonschema::Validator>);

impl CompiledSchema {
    fn compile(id: &str, raw: &Value) -> Result<Self, SchemaError> {
        // Schema ids are names, not resolvable URIs
        let mut doc = raw.clone();
        if let Some(fields) = doc.as_object_mut() {
            fields.remove("$id");
        }

        let validator = jsonschema::draft7::new(&doc).map_err(|e| SchemaError::Compile {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(Arc::new(validator)))
    }

    /// First violation of the schema, if any
    pub fn first_error(&self, instance: &Value) -> Option<String> {
        self.0.iter_errors(instance).next().map(|e| e.to_string())
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledSchema")
    }
}

/// A validated event schema
#[derive(Debug, Clone, Serialize)]
pub struct EventSchema {
    pub id: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub properties: IndexMap<String, PropertySpec>,
    pub required: Vec<String>,
    #[serde(skip)]
    pub validator: CompiledSchema,
}

impl EventSchema {
    /// Validate a raw schema document
    pub fn from_value(raw: &Value) -> Result<Self, SchemaError> {
        let doc = raw.as_object().ok_or_else(|| SchemaError::Malformed {
            field: "$schema".to_string(),
            reason: "schema must be an object".to_string(),
        })?;

        let id = doc
            .get("$id")
            .ok_or(SchemaError::MissingField("$id"))?
            .as_str()
            .ok_or_else(|| malformed("$id", "must be a string"))?
            .to_string();
        let version = doc
            .get("version")
            .ok_or(SchemaError::MissingField("version"))?
            .as_u64()
            .ok_or_else(|| malformed("version", "must be a non-negative integer"))?;
        let raw_properties = doc
            .get("properties")
            .ok_or(SchemaError::MissingField("properties"))?
            .as_object()
            .ok_or_else(|| malformed("properties", "must be an object"))?;

        let mut properties = IndexMap::new();
        for (name, attrs) in raw_properties {
            if name.starts_with("__") {
                return Err(SchemaError::ReservedProperty {
                    id,
                    property: name.clone(),
                });
            }

            let categories = match attrs.get("categories") {
                Some(Value::Array(cats)) => cats
                    .iter()
                    .map(|c| c.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed(&format!("properties.{}.categories", name), "must be strings"))?,
                Some(_) => {
                    return Err(malformed(
                        &format!("properties.{}.categories", name),
                        "the \"categories\" field must be a list",
                    ));
                }
                None => {
                    return Err(SchemaError::MissingCategories {
                        id,
                        property: name.clone(),
                    });
                }
            };

            properties.insert(
                name.clone(),
                PropertySpec {
                    categories,
                    description: attrs.get("description").and_then(|d| d.as_str()).map(str::to_string),
                },
            );
        }

        let required = match doc.get("required") {
            Some(Value::Array(names)) => names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };

        let validator = CompiledSchema::compile(&id, raw)?;

        Ok(Self {
            id,
            version,
            title: doc.get("title").and_then(|t| t.as_str()).map(str::to_string),
            properties,
            required,
            validator,
        })
    }
}

fn malformed(field: &str, reason: &str) -> SchemaError {
    SchemaError::Malformed {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// The schema describing command-invocation envelopes sent by the client
pub fn command_invocations_schema() -> Value {
    json!({
        "$id": COMMAND_INVOCATIONS_SCHEMA,
        "version": COMMAND_INVOCATIONS_VERSION,
        "title": "Command invocations",
        "description": "Commands executed in the host application",
        "type": "object",
        "required": ["session_id", "command_id", "command_args"],
        "properties": {
            "session_id": {
                "description": "Random id of the session the command ran in",
                "categories": ["unrestricted"],
                "type": "string"
            },
            "command_id": {
                "description": "Id of the executed command",
                "categories": ["unrestricted"],
                "type": "string"
            },
            "command_args": {
                "description": "Arguments the command was invoked with",
                "categories": ["action-identifiable-information"],
                "type": "object"
            }
        }
    })
}

/// Registered schemas, keyed by id and version
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<(String, u64), EventSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the command-invocations schema
    pub fn with_builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register(&command_invocations_schema())?;
        Ok(registry)
    }

    /// Validate and register a schema document
    pub fn register(&mut self, raw: &Value) -> Result<&EventSchema, SchemaError> {
        let schema = EventSchema::from_value(raw)?;
        let key = (schema.id.clone(), schema.version);

        if self.schemas.contains_key(&key) {
            return Err(SchemaError::Duplicate {
                id: key.0,
                version: key.1,
            });
        }

        log::debug!("Registered schema {} version {}", schema.id, schema.version);
        let (index, _) = self.schemas.insert_full(key, schema);
        Ok(&self.schemas[index])
    }

    /// Register a schema from a JSON or YAML file
    pub fn register_file(&mut self, path: &Path) -> Result<&EventSchema, SchemaError> {
        let content = fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // Every JSON document is also valid YAML
        let raw: Value = serde_yaml::from_str(&content).map_err(|source| SchemaError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.register(&raw)
    }

    pub fn get(&self, id: &str, version: u64) -> Option<&EventSchema> {
        self.schemas.get(&(id.to_string(), version))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_schema() -> Value {
        json!({
            "$id": "test.event",
            "version": 1,
            "properties": {
                "nothing-exciting": {"categories": ["unrestricted"], "type": "string"},
                "user": {"categories": ["user-identifier"], "type": "string"}
            }
        })
    }

    #[test]
    fn test_builtin_registry() {
        let registry = SchemaRegistry::with_builtin().unwrap();

        let schema = registry.get(COMMAND_INVOCATIONS_SCHEMA, COMMAND_INVOCATIONS_VERSION).unwrap();
        assert_eq!(schema.properties.len(), 3);
        assert_eq!(schema.required, vec!["session_id", "command_id", "command_args"]);
    }

    #[test]
    fn test_register_schema() {
        let mut registry = SchemaRegistry::new();

        let schema = registry.register(&test_schema()).unwrap();

        assert_eq!(schema.id, "test.event");
        assert_eq!(schema.properties["user"].categories, vec!["user-identifier"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["$id", "version", "properties"] {
            let mut raw = test_schema();
            raw.as_object_mut().unwrap().remove(field);

            let err = SchemaRegistry::new().register(&raw).unwrap_err();

            assert!(matches!(err, SchemaError::MissingField(f) if f == field), "{}: {:?}", field, err);
        }
    }

    #[test]
    fn test_duplicate_schema_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(&test_schema()).unwrap();

        let err = registry.register(&test_schema()).unwrap_err();

        assert!(matches!(err, SchemaError::Duplicate { ref id, version: 1 } if id == "test.event"));
    }

    #[test]
    fn test_new_version_of_same_schema_allowed() {
        let mut registry = SchemaRegistry::new();
        registry.register(&test_schema()).unwrap();
        let mut v2 = test_schema();
        v2["version"] = json!(2);

        registry.register(&v2).unwrap();

        assert!(registry.get("test.event", 1).is_some());
        assert!(registry.get("test.event", 2).is_some());
    }

    #[test]
    fn test_reserved_property_rejected() {
        let mut raw = test_schema();
        raw["properties"]["__fake"] = json!({"categories": ["unrestricted"]});

        let err = SchemaRegistry::new().register(&raw).unwrap_err();

        assert!(matches!(err, SchemaError::ReservedProperty { ref property, .. } if property == "__fake"));
    }

    #[test]
    fn test_property_without_categories_rejected() {
        let mut raw = test_schema();
        raw["properties"]["id"] = json!({"type": "string"});

        let err = SchemaRegistry::new().register(&raw).unwrap_err();

        assert!(matches!(err, SchemaError::MissingCategories { ref property, .. } if property == "id"));
    }

    #[test]
    fn test_categories_must_be_list() {
        let mut raw = test_schema();
        raw["properties"]["id"] = json!({"categories": "unrestricted"});

        let err = SchemaRegistry::new().register(&raw).unwrap_err();

        assert!(matches!(err, SchemaError::Malformed { .. }));
    }

    #[test]
    fn test_invalid_json_schema_rejected() {
        let mut raw = test_schema();
        raw["properties"]["user"]["type"] = json!("not-a-type");

        let err = SchemaRegistry::new().register(&raw).unwrap_err();

        assert!(matches!(err, SchemaError::Compile { ref id, .. } if id == "test.event"));
    }

    #[test]
    fn test_builtin_schema_enforces_types() {
        let registry = SchemaRegistry::with_builtin().unwrap();
        let schema = registry.get(COMMAND_INVOCATIONS_SCHEMA, COMMAND_INVOCATIONS_VERSION).unwrap();

        let valid = json!({"session_id": "abc", "command_id": "notebook:run-cell", "command_args": {}});
        let wrong_types = json!({"session_id": 7, "command_id": ["x"], "command_args": "not-an-object"});

        assert!(schema.validator.first_error(&valid).is_none());
        assert!(schema.validator.first_error(&wrong_types).is_some());
    }

    #[test]
    fn test_register_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.yaml");
        fs::write(
            &path,
            r#"
$id: test.yaml.event
version: 3
properties:
  action:
    categories: [unrestricted]
"#,
        )
        .unwrap();

        let mut registry = SchemaRegistry::new();
        registry.register_file(&path).unwrap();

        assert!(registry.get("test.yaml.event", 3).is_some());
    }

    #[test]
    fn test_register_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.json");
        fs::write(&path, serde_json::to_string_pretty(&test_schema()).unwrap()).unwrap();

        let mut registry = SchemaRegistry::new();
        registry.register_file(&path).unwrap();

        assert!(registry.get("test.event", 1).is_some());
    }

    #[test]
    fn test_register_missing_file() {
        let err = SchemaRegistry::new()
            .register_file(Path::new("/nonexistent/schema.json"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Read { .. }));
    }
}
