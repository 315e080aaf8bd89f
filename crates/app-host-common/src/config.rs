//! Configuration documents and their validation.
//!
//! Every document is JSON with camelCase keys. Validation is done by
//! deserializing into the record types below, which reject unknown
//! (misnamed) fields and fill recognized defaults:
//! - [`ObjectTypeConfig`]: `_type` name to constructor symbol
//! - [`ObjectProviderConfig`]: URI protocol to provider symbol
//! - [`NamedObjectConfig`]: named objects visible in a scope
//! - [`MetricConfig`]: metric definitions of an application
//! - [`HostConfig`]: host (engine) level settings
//! - [`ApplicationConfig`]: application settings layered on host settings

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RuntimeError;

/// File name of an application's configuration inside its module directory.
pub const APP_CONFIG_FILE: &str = "app.json";

/// A named constructible type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectTypeDefinition {
    /// Value of the `_type` tag this constructor handles.
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Module holding the constructor.
    pub module_name: String,

    /// Constructor function within the module.
    pub function_name: String,

    /// Allow replacing an earlier definition of the same type in one scope.
    #[serde(rename = "override", default)]
    pub allow_override: bool,

    /// Example payloads accepted by the constructor.
    pub example_objects: Vec<Value>,
}

/// A named constructible URI protocol handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectProviderDefinition {
    /// URI scheme handled by this provider, without `://`.
    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Module holding the provider.
    pub module_name: String,

    /// Provider function within the module.
    pub function_name: String,

    /// Allow replacing an earlier definition of the same protocol in one scope.
    #[serde(rename = "override", default)]
    pub allow_override: bool,

    /// Example URIs accepted by the provider.
    pub example_uri: Vec<String>,
}

/// An object declared by name in a scope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NamedObjectDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Literal value, typed value (`{"_type": ..}`) or provider URI.
    pub value: Value,

    /// Allow replacing an earlier definition of the same name in one scope.
    #[serde(rename = "override", default)]
    pub allow_override: bool,

    /// Only visible to the context that defines it.
    #[serde(default)]
    pub private: bool,
}

/// Kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MetricType {
    Percentile,
    Rate,
    Number,
}

/// A metric declared by an application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub name: String,
    pub section_name: String,
    pub display_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub dimension_names: Vec<String>,
}

/// Metric entry as written in a metrics document (section is implied).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MetricDocument {
    name: String,
    display_name: String,
    description: String,
    #[serde(rename = "type")]
    metric_type: MetricType,
    #[serde(default)]
    dimension_names: Vec<String>,
}

/// Type, provider and named-object definitions of one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectContextDefinition {
    pub types: Vec<ObjectTypeDefinition>,
    pub providers: Vec<ObjectProviderDefinition>,
    pub objects: Vec<NamedObjectDefinition>,
}

impl ObjectContextDefinition {
    /// Load every listed definition file, resolving paths against `base_dir`.
    fn load(
        base_dir: &Path,
        type_files: &[String],
        provider_files: &[String],
        object_files: &[String],
    ) -> Result<Self, RuntimeError> {
        let mut definition = Self::default();
        for file in type_files {
            definition
                .types
                .extend(ObjectTypeConfig::from_file(base_dir.join(file))?);
        }
        for file in provider_files {
            definition
                .providers
                .extend(ObjectProviderConfig::from_file(base_dir.join(file))?);
        }
        for file in object_files {
            definition
                .objects
                .extend(NamedObjectConfig::from_file(base_dir.join(file))?);
        }
        Ok(definition)
    }
}

/// Host (engine) level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    /// Directory relative paths are resolved against.
    pub base_dir: PathBuf,

    /// Let requests carry `overrideObjects`.
    pub allow_per_request_override: bool,

    /// Fail `serve` on error instead of returning an error-coded response.
    pub throw_exception_on_error: bool,

    /// Pipeline stage names, outermost first.
    pub default_execution_stack: Vec<String>,

    /// Definitions of the engine's global object context.
    pub object_context: ObjectContextDefinition,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            allow_per_request_override: defaults::allow_per_request_override(),
            throw_exception_on_error: defaults::throw_exception_on_error(),
            default_execution_stack: defaults::default_execution_stack(),
            object_context: ObjectContextDefinition::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HostDocument {
    #[serde(default = "defaults::allow_per_request_override")]
    allow_per_request_override: bool,
    #[serde(default = "defaults::throw_exception_on_error")]
    throw_exception_on_error: bool,
    #[serde(default = "defaults::default_execution_stack")]
    default_execution_stack: Vec<String>,
    #[serde(default)]
    object_types: Vec<String>,
    #[serde(default)]
    object_providers: Vec<String>,
    #[serde(default)]
    named_objects: Vec<String>,
}

/// Application settings, layered on top of [`HostSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationSettings {
    pub id: String,
    pub description: Option<String>,
    pub base_dir: PathBuf,
    pub allow_per_request_override: bool,
    pub throw_exception_on_error: bool,
    pub default_execution_stack: Vec<String>,
    pub object_context: ObjectContextDefinition,
    pub metrics: Vec<MetricDefinition>,
}

impl ApplicationSettings {
    /// Settings for an application that only inherits from the host.
    pub fn inherit(host: &HostSettings, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            base_dir: host.base_dir.clone(),
            allow_per_request_override: host.allow_per_request_override,
            throw_exception_on_error: host.throw_exception_on_error,
            default_execution_stack: host.default_execution_stack.clone(),
            object_context: ObjectContextDefinition::default(),
            metrics: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ApplicationDocument {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    allow_per_request_override: Option<bool>,
    #[serde(default)]
    throw_exception_on_error: Option<bool>,
    #[serde(default)]
    default_execution_stack: Option<Vec<String>>,
    #[serde(default)]
    object_types: Vec<String>,
    #[serde(default)]
    object_providers: Vec<String>,
    #[serde(default)]
    named_objects: Vec<String>,
    #[serde(default)]
    metrics: Option<MetricsSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MetricsSection {
    section_name: String,
    #[serde(default)]
    definition: Vec<String>,
}

/// Loader for object type definitions.
pub struct ObjectTypeConfig;

impl ObjectTypeConfig {
    /// Validate an in-memory list of object type definitions.
    pub fn from_value(value: &Value) -> Result<Vec<ObjectTypeDefinition>, RuntimeError> {
        validate("object type", value)
    }

    /// Read, parse and validate an object type definition file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Vec<ObjectTypeDefinition>, RuntimeError> {
        let path = path.as_ref();
        Self::from_value(&read_json(path)?).map_err(|e| in_file(path, e))
    }
}

/// Loader for object provider definitions.
pub struct ObjectProviderConfig;

impl ObjectProviderConfig {
    /// Validate an in-memory list of object provider definitions.
    pub fn from_value(value: &Value) -> Result<Vec<ObjectProviderDefinition>, RuntimeError> {
        validate("object provider", value)
    }

    /// Read, parse and validate an object provider definition file.
    pub fn from_file(
        path: impl AsRef<Path>,
    ) -> Result<Vec<ObjectProviderDefinition>, RuntimeError> {
        let path = path.as_ref();
        Self::from_value(&read_json(path)?).map_err(|e| in_file(path, e))
    }
}

/// Loader for named object definitions.
pub struct NamedObjectConfig;

impl NamedObjectConfig {
    /// Validate an in-memory list of named object definitions.
    pub fn from_value(value: &Value) -> Result<Vec<NamedObjectDefinition>, RuntimeError> {
        validate("named object", value)
    }

    /// Read, parse and validate a named object definition file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Vec<NamedObjectDefinition>, RuntimeError> {
        let path = path.as_ref();
        Self::from_value(&read_json(path)?).map_err(|e| in_file(path, e))
    }
}

/// Loader for metric definitions.
pub struct MetricConfig;

impl MetricConfig {
    /// Validate an in-memory list of metrics, tagging each with `section_name`.
    pub fn from_value(
        section_name: &str,
        value: &Value,
    ) -> Result<Vec<MetricDefinition>, RuntimeError> {
        let documents: Vec<MetricDocument> = validate("metric", value)?;
        Ok(documents
            .into_iter()
            .map(|m| MetricDefinition {
                name: m.name,
                section_name: section_name.to_string(),
                display_name: m.display_name,
                description: m.description,
                metric_type: m.metric_type,
                dimension_names: m.dimension_names,
            })
            .collect())
    }

    /// Read, parse and validate a metric definition file.
    pub fn from_file(
        section_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<Vec<MetricDefinition>, RuntimeError> {
        let path = path.as_ref();
        Self::from_value(section_name, &read_json(path)?).map_err(|e| in_file(path, e))
    }
}

/// Loader for host settings.
pub struct HostConfig;

impl HostConfig {
    /// Validate an in-memory host document. Definition files it lists are
    /// read relative to `base_dir`.
    pub fn from_value(value: &Value, base_dir: &Path) -> Result<HostSettings, RuntimeError> {
        let doc: HostDocument = validate("host", value)?;
        let object_context = ObjectContextDefinition::load(
            base_dir,
            &doc.object_types,
            &doc.object_providers,
            &doc.named_objects,
        )?;

        Ok(HostSettings {
            base_dir: base_dir.to_path_buf(),
            allow_per_request_override: doc.allow_per_request_override,
            throw_exception_on_error: doc.throw_exception_on_error,
            default_execution_stack: doc.default_execution_stack,
            object_context,
        })
    }

    /// Read a host document; its directory becomes the base directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<HostSettings, RuntimeError> {
        let path = path.as_ref();
        let base_dir = parent_dir(path);
        debug!(path = %path.display(), "Loading host config");
        Self::from_value(&read_json(path)?, &base_dir).map_err(|e| in_file(path, e))
    }
}

/// Loader for application settings.
pub struct ApplicationConfig;

impl ApplicationConfig {
    /// Path of the configuration file of application module `module_name`.
    pub fn resolve_path(host: &HostSettings, module_name: &str) -> PathBuf {
        host.base_dir.join(module_name).join(APP_CONFIG_FILE)
    }

    /// Validate an in-memory application document and layer it over `host`.
    pub fn from_value(
        host: &HostSettings,
        value: &Value,
        base_dir: &Path,
    ) -> Result<ApplicationSettings, RuntimeError> {
        let doc: ApplicationDocument = validate("application", value)?;
        let object_context = ObjectContextDefinition::load(
            base_dir,
            &doc.object_types,
            &doc.object_providers,
            &doc.named_objects,
        )?;

        let mut metrics = Vec::new();
        if let Some(section) = &doc.metrics {
            for file in &section.definition {
                metrics.extend(MetricConfig::from_file(
                    &section.section_name,
                    base_dir.join(file),
                )?);
            }
        }

        Ok(ApplicationSettings {
            id: doc.id,
            description: doc.description,
            base_dir: base_dir.to_path_buf(),
            allow_per_request_override: doc
                .allow_per_request_override
                .unwrap_or(host.allow_per_request_override),
            throw_exception_on_error: doc
                .throw_exception_on_error
                .unwrap_or(host.throw_exception_on_error),
            default_execution_stack: doc
                .default_execution_stack
                .unwrap_or_else(|| host.default_execution_stack.clone()),
            object_context,
            metrics,
        })
    }

    /// Read an application document; its directory becomes the base directory.
    pub fn from_file(
        host: &HostSettings,
        path: impl AsRef<Path>,
    ) -> Result<ApplicationSettings, RuntimeError> {
        let path = path.as_ref();
        let base_dir = parent_dir(path);
        debug!(path = %path.display(), "Loading application config");
        Self::from_value(host, &read_json(path)?, &base_dir).map_err(|e| in_file(path, e))
    }
}

fn validate<T: DeserializeOwned>(what: &str, value: &Value) -> Result<T, RuntimeError> {
    T::deserialize(value)
        .map_err(|e| RuntimeError::config_validation(format!("{what} definition: {e}")))
}

fn read_json(path: &Path) -> Result<Value, RuntimeError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RuntimeError::config_validation(format!("failed to read '{}': {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RuntimeError::config_validation(format!("failed to parse '{}': {e}", path.display()))
    })
}

/// Attach the file name to a validation error raised for its content.
fn in_file(path: &Path, error: RuntimeError) -> RuntimeError {
    match error {
        RuntimeError::ConfigValidation { reason } if !reason.contains(&*path.to_string_lossy()) => {
            RuntimeError::config_validation(format!("{reason} (in '{}')", path.display()))
        }
        other => other,
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Default value functions for serde.
mod defaults {
    pub const fn allow_per_request_override() -> bool {
        true
    }

    pub const fn throw_exception_on_error() -> bool {
        true
    }

    pub fn default_execution_stack() -> Vec<String> {
        vec!["finalizeResponse".to_string(), "executeEntryPoint".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: &Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn test_object_type_good_config() {
        let config = json!([{
            "typeName": "TypeA",
            "description": "Type A",
            "moduleName": "module",
            "functionName": "function",
            "exampleObjects": [{"_type": "TypeA", "value": 1}]
        }]);

        let defs = ObjectTypeConfig::from_value(&config).unwrap();

        assert_eq!(
            serde_json::to_value(&defs).unwrap(),
            json!([{
                "typeName": "TypeA",
                "description": "Type A",
                "moduleName": "module",
                "functionName": "function",
                "override": false,
                "exampleObjects": [{"_type": "TypeA", "value": 1}]
            }])
        );
    }

    #[test]
    fn test_object_type_not_conform_with_schema() {
        // `type` instead of `typeName`, missing `exampleObjects`.
        let config = json!([{
            "type": "TypeA",
            "moduleName": "module",
            "functionName": "function"
        }]);

        let err = ObjectTypeConfig::from_value(&config).unwrap_err();
        assert!(matches!(err, RuntimeError::ConfigValidation { .. }));
    }

    #[test]
    fn test_object_type_missing_examples() {
        let config = json!([{
            "typeName": "TypeA",
            "moduleName": "module",
            "functionName": "function"
        }]);

        assert!(ObjectTypeConfig::from_value(&config).is_err());
    }

    #[test]
    fn test_object_provider_good_config() {
        let config = json!([{
            "protocol": "protocolA",
            "description": "Protocol A",
            "moduleName": "module",
            "functionName": "function",
            "exampleUri": ["protocolA://abc"]
        }]);

        let defs = ObjectProviderConfig::from_value(&config).unwrap();

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].protocol, "protocolA");
        assert_eq!(defs[0].example_uri, vec!["protocolA://abc"]);
        assert!(!defs[0].allow_override);
    }

    #[test]
    fn test_object_provider_misnamed_field() {
        let config = json!([{
            "protocol": "protocolA",
            "module": "module",
            "functionName": "function",
            "exampleUri": ["protocolA://abc"]
        }]);

        let err = ObjectProviderConfig::from_value(&config).unwrap_err();
        assert!(err.to_string().contains("unknown field `module`"));
    }

    #[test]
    fn test_object_provider_missing_example_uri() {
        let config = json!([{
            "protocol": "protocolA",
            "moduleName": "module",
            "functionName": "function"
        }]);

        let err = ObjectProviderConfig::from_value(&config).unwrap_err();
        assert!(err.to_string().contains("missing field `exampleUri`"));
    }

    #[test]
    fn test_named_object_good_config() {
        let config = json!([
            {"name": "object1", "value": {"_type": "TypeA", "value": 1}},
            {"name": "object2", "value": 1}
        ]);

        let defs = NamedObjectConfig::from_value(&config).unwrap();

        assert_eq!(
            serde_json::to_value(&defs).unwrap(),
            json!([
                {
                    "name": "object1",
                    "value": {"_type": "TypeA", "value": 1},
                    "override": false,
                    "private": false
                },
                {
                    "name": "object2",
                    "value": 1,
                    "override": false,
                    "private": false
                }
            ])
        );
    }

    #[test]
    fn test_named_object_misnamed_field() {
        let config = json!([{"name": "object1", "value": 1, "valueDef": 1}]);

        let err = NamedObjectConfig::from_value(&config).unwrap_err();
        assert!(err.to_string().contains("unknown field `valueDef`"));
    }

    #[test]
    fn test_named_object_missing_value() {
        let config = json!([{"name": "object1"}]);

        let err = NamedObjectConfig::from_value(&config).unwrap_err();
        assert!(err.to_string().contains("missing field `value`"));
    }

    #[test]
    fn test_metric_good_config() {
        let config = json!([
            {
                "name": "myCounter1",
                "displayName": "My counter1",
                "description": "Counter description",
                "type": "Percentile",
                "dimensionNames": ["d1", "d2"]
            },
            {
                "name": "myCounter2",
                "displayName": "My counter2",
                "description": "Counter description",
                "type": "Rate",
                "dimensionNames": []
            }
        ]);

        let defs = MetricConfig::from_value("DefaultSection", &config).unwrap();

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].section_name, "DefaultSection");
        assert_eq!(defs[0].metric_type, MetricType::Percentile);
        assert_eq!(defs[0].dimension_names, vec!["d1", "d2"]);
        assert_eq!(defs[1].metric_type, MetricType::Rate);
    }

    #[test]
    fn test_metric_unknown_type() {
        let config = json!([{
            "name": "c",
            "displayName": "c",
            "description": "c",
            "type": "Histogram"
        }]);

        assert!(MetricConfig::from_value("S", &config).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "objects.json",
            &json!([{"name": "answer", "value": 42, "private": true}]),
        );

        let defs = NamedObjectConfig::from_file(dir.path().join("objects.json")).unwrap();
        assert_eq!(defs[0].value, json!(42));
        assert!(defs[0].private);

        let err = NamedObjectConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_host_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "host.json", &json!({}));

        let settings = HostConfig::from_file(dir.path().join("host.json")).unwrap();

        assert!(settings.allow_per_request_override);
        assert!(settings.throw_exception_on_error);
        assert_eq!(
            settings.default_execution_stack,
            vec!["finalizeResponse", "executeEntryPoint"]
        );
        assert_eq!(settings.base_dir, dir.path());
    }

    #[test]
    fn test_host_config_rejects_unknown_field() {
        let result = HostConfig::from_value(&json!({"throwOnError": false}), Path::new("."));
        assert!(result.is_err());
    }

    #[test]
    fn test_application_config_layering() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "metrics.json",
            &json!([{
                "name": "requests",
                "displayName": "Requests",
                "description": "Requests served",
                "type": "Rate"
            }]),
        );
        write(
            dir.path(),
            "objects.json",
            &json!([{"name": "greeting", "value": "hello"}]),
        );
        write(
            dir.path(),
            "app.json",
            &json!({
                "id": "example",
                "throwExceptionOnError": false,
                "namedObjects": ["objects.json"],
                "metrics": {"sectionName": "Example", "definition": ["metrics.json"]}
            }),
        );

        let host = HostSettings::default();
        let settings = ApplicationConfig::from_file(&host, dir.path().join("app.json")).unwrap();

        assert_eq!(settings.id, "example");
        assert!(!settings.throw_exception_on_error);
        assert!(settings.allow_per_request_override);
        assert_eq!(settings.default_execution_stack, host.default_execution_stack);
        assert_eq!(settings.object_context.objects.len(), 1);
        assert_eq!(settings.metrics.len(), 1);
        assert_eq!(settings.metrics[0].section_name, "Example");
    }

    #[test]
    fn test_resolve_path() {
        let host = HostSettings {
            base_dir: PathBuf::from("/srv/apps"),
            ..Default::default()
        };
        assert_eq!(
            ApplicationConfig::resolve_path(&host, "example"),
            PathBuf::from("/srv/apps/example/app.json")
        );
        assert_eq!(
            ApplicationConfig::resolve_path(&host, "/opt/other"),
            PathBuf::from("/opt/other/app.json")
        );
    }
}
