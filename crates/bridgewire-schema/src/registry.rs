use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::message::BridgeMessage;
use crate::validator::validate_value;

const SCHEMA_FILE_SUFFIX: &str = ".schema.json";

/// Type-name keyed registry of compiled JSON Schema validators, plus the
/// conversions between typed records and generic payloads.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a schema for a type name from a JSON string.
    pub fn register(&mut self, type_name: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(type_name, &schema)
    }

    /// Register a schema for a type name from a JSON value.
    pub fn register_value(&mut self, type_name: &str, schema: &Value) -> Result<()> {
        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let compiled = jsonschema::validator_for(&schema_to_compile)
            .map_err(|err| SchemaError::CompileFailed(format!("{type_name}: {err}")))?;

        tracing::debug!(type_name, "registered message schema");
        self.validators.insert(type_name.to_string(), compiled);
        Ok(())
    }

    /// Load schemas from a directory.
    ///
    /// A file named `<package>.<Type>.schema.json` holds the schema for
    /// type `package/Type`. Other files are ignored.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut loaded_schema_count = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_schema_file = file_name.ends_with(SCHEMA_FILE_SUFFIX);
            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                if is_schema_file {
                    return Err(SchemaError::LoadFailed(format!(
                        "refusing to load schema symlink: {file_name}"
                    )));
                }
                continue;
            }
            if !file_type.is_file() || !is_schema_file {
                continue;
            }

            let Some(type_name) = type_name_from_file_name(&file_name) else {
                return Err(SchemaError::LoadFailed(format!(
                    "unrecognized schema filename (expected <package>.<Type>.schema.json): {file_name}"
                )));
            };

            loaded_schema_count = loaded_schema_count.saturating_add(1);
            if loaded_schema_count > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    registry.config.max_schemas_from_directory, loaded_schema_count
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!(
                    "failed opening schema {}: {err}",
                    entry_path.display()
                ))
            })?;
            let opened_metadata = file
                .metadata()
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

            #[cfg(unix)]
            {
                if !same_file_identity(&path_metadata, &opened_metadata) {
                    return Err(SchemaError::LoadFailed(format!(
                        "schema file changed during load: {file_name}"
                    )));
                }
            }

            if opened_metadata.len() > registry.config.max_schema_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large ({} bytes): {file_name}",
                    opened_metadata.len()
                )));
            }

            let max_bytes = registry.config.max_schema_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading schema {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large while reading: {file_name}"
                )));
            }

            registry.register(&type_name, &content)?;
        }

        tracing::debug!(
            path = %path.display(),
            count = loaded_schema_count,
            "loaded message schemas"
        );
        Ok(registry)
    }

    /// Load from embedded `(type_name, schema)` strings.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (type_name, schema) in schemas {
            registry.register(type_name, schema)?;
        }
        Ok(registry)
    }

    /// Validate a generic payload against the schema of its type.
    pub fn validate(&self, type_name: &str, payload: &Value) -> Result<()> {
        match self.validators.get(type_name) {
            Some(validator) => validate_value(type_name, payload, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(type_name.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Type name a record declares for itself.
    pub fn type_name_of<T: BridgeMessage>(&self, record: &T) -> &'static str {
        record.type_name()
    }

    /// Convert a typed record into its generic payload, validating it.
    pub fn to_generic_payload<T: BridgeMessage>(&self, record: &T) -> Result<Value> {
        let payload = serde_json::to_value(record).map_err(|err| SchemaError::Conversion {
            type_name: T::TYPE_NAME.to_string(),
            message: err.to_string(),
        })?;
        self.validate(T::TYPE_NAME, &payload)?;
        Ok(payload)
    }

    /// Convert a generic payload of `type_name` back into a typed record.
    ///
    /// Fails with `TypeMismatch` when `type_name` is not `T`'s type name.
    pub fn from_generic_payload<T: BridgeMessage>(
        &self,
        type_name: &str,
        payload: Value,
    ) -> Result<T> {
        if type_name != T::TYPE_NAME {
            return Err(SchemaError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: type_name.to_string(),
            });
        }

        self.validate(type_name, &payload)?;
        serde_json::from_value(payload).map_err(|err| SchemaError::Conversion {
            type_name: type_name.to_string(),
            message: err.to_string(),
        })
    }

    /// Check if a type has a registered schema.
    pub fn has_schema(&self, type_name: &str) -> bool {
        self.validators.contains_key(type_name)
    }

    /// Type names that have registered schemas, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.validators.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("type_names", &self.type_names())
            .field("config", &self.config)
            .finish()
    }
}

/// `std_msgs.String.schema.json` -> `std_msgs/String`.
fn type_name_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(SCHEMA_FILE_SUFFIX)?;
    let (package, name) = stem.split_once('.')?;

    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !valid_part(package) || !valid_part(name) {
        return None;
    }

    Some(format!("{package}/{name}"))
}

fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            recurse_object_schema_children(map);
        }
        Value::Array(items) => {
            for item in items {
                apply_strict_mode(item);
            }
        }
        _ => {}
    }
}

fn recurse_object_schema_children(map: &mut Map<String, Value>) {
    recurse_map_schemas(map, "properties");
    recurse_map_schemas(map, "patternProperties");
    recurse_map_schemas(map, "dependentSchemas");
    recurse_map_schemas(map, "$defs");
    recurse_map_schemas(map, "definitions");

    recurse_single_schema(map, "propertyNames");
    recurse_single_schema(map, "additionalProperties");
    recurse_single_schema(map, "unevaluatedProperties");
    recurse_single_schema(map, "items");
    recurse_single_schema(map, "contains");
    recurse_single_schema(map, "additionalItems");
    recurse_single_schema(map, "unevaluatedItems");
    recurse_single_schema(map, "not");
    recurse_single_schema(map, "if");
    recurse_single_schema(map, "then");
    recurse_single_schema(map, "else");

    recurse_array_schemas(map, "prefixItems");
    recurse_array_schemas(map, "allOf");
    recurse_array_schemas(map, "anyOf");
    recurse_array_schemas(map, "oneOf");
}

fn recurse_map_schemas(map: &mut Map<String, Value>, key: &str) {
    if let Some(Value::Object(obj)) = map.get_mut(key) {
        for value in obj.values_mut() {
            apply_strict_mode(value);
        }
    }
}

fn recurse_single_schema(map: &mut Map<String, Value>, key: &str) {
    if let Some(value) = map.get_mut(key) {
        apply_strict_mode(value);
    }
}

fn recurse_array_schemas(map: &mut Map<String, Value>, key: &str) {
    if let Some(Value::Array(items)) = map.get_mut(key) {
        for item in items {
            apply_strict_mode(item);
        }
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Value::String(kind) if kind == "object")),
        _ => is_object_keyword_schema(map),
    }
}

fn is_object_keyword_schema(map: &Map<String, Value>) -> bool {
    const OBJECT_KEYWORDS: [&str; 8] = [
        "properties",
        "patternProperties",
        "additionalProperties",
        "unevaluatedProperties",
        "required",
        "dependentRequired",
        "dependentSchemas",
        "propertyNames",
    ];

    OBJECT_KEYWORDS
        .iter()
        .any(|keyword| map.contains_key(*keyword))
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
