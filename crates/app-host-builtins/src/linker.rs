//! Registration of built-in symbols in a module registry.

use serde_json::json;

use app_host_common::{
    HostSettings, ObjectContextDefinition, ObjectProviderDefinition, ObjectTypeDefinition,
    RuntimeError,
};
use app_host_core::{FnEntryPoint, ModuleRegistry};

use crate::BUILTIN_MODULE;
use crate::entry_points::{ResolveObject, echo};
use crate::providers::{EnvProvider, FileProvider, HttpProvider};
use crate::stages::{ExecuteEntryPoint, FinalizeResponse, LogRequest};
use crate::types::{ENTRY_POINT_TYPE, EntryPointConstructor};

/// Constructor symbol of the `EntryPoint` type.
pub const CREATE_ENTRY_POINT: &str = "createEntryPoint";

/// Register every built-in stage, type, provider and entry point.
pub fn register_all(modules: &mut ModuleRegistry) -> Result<(), RuntimeError> {
    register_stages(modules);
    register_types(modules);
    register_providers(modules)?;
    register_entry_points(modules);
    Ok(())
}

/// A fresh registry holding the built-in symbols.
pub fn with_builtins() -> Result<ModuleRegistry, RuntimeError> {
    let mut modules = ModuleRegistry::new();
    register_all(&mut modules)?;
    Ok(modules)
}

/// Register the `executeEntryPoint`, `finalizeResponse` and `logRequest`
/// stages.
pub fn register_stages(modules: &mut ModuleRegistry) {
    modules
        .register_stage("executeEntryPoint", ExecuteEntryPoint)
        .register_stage("finalizeResponse", FinalizeResponse)
        .register_stage("logRequest", LogRequest);
}

pub fn register_types(modules: &mut ModuleRegistry) {
    modules.register_constructor(BUILTIN_MODULE, CREATE_ENTRY_POINT, EntryPointConstructor);
}

/// Register the `env`, `file` and `http` providers.
///
/// Fails if the HTTP client cannot be created.
pub fn register_providers(modules: &mut ModuleRegistry) -> Result<(), RuntimeError> {
    modules
        .register_provider(BUILTIN_MODULE, "envProvider", EnvProvider)
        .register_provider(BUILTIN_MODULE, "fileProvider", FileProvider)
        .register_provider(BUILTIN_MODULE, "httpProvider", HttpProvider::new()?);
    Ok(())
}

/// Register the `echo` and `resolveObject` entry points.
pub fn register_entry_points(modules: &mut ModuleRegistry) {
    modules
        .register_entry_point(BUILTIN_MODULE, "echo", FnEntryPoint(echo))
        .register_entry_point(BUILTIN_MODULE, "resolveObject", ResolveObject);
}

/// Type and provider definitions for the built-in symbols.
pub fn builtin_definitions() -> ObjectContextDefinition {
    let types = vec![ObjectTypeDefinition {
        type_name: ENTRY_POINT_TYPE.to_string(),
        description: Some("Function exposed by an application".to_string()),
        module_name: BUILTIN_MODULE.to_string(),
        function_name: CREATE_ENTRY_POINT.to_string(),
        allow_override: false,
        example_objects: vec![json!({
            "_type": ENTRY_POINT_TYPE,
            "moduleName": BUILTIN_MODULE,
            "functionName": "echo"
        })],
    }];

    let provider = |protocol: &str, function: &str, example: &str| ObjectProviderDefinition {
        protocol: protocol.to_string(),
        description: None,
        module_name: BUILTIN_MODULE.to_string(),
        function_name: function.to_string(),
        allow_override: false,
        example_uri: vec![example.to_string()],
    };
    let providers = vec![
        provider("env", "envProvider", "env://HOME"),
        provider("file", "fileProvider", "file://data/config.json"),
        provider("http", "httpProvider", "http://localhost:8080/config"),
        provider("https", "httpProvider", "https://example.com/config.json"),
    ];

    ObjectContextDefinition {
        types,
        providers,
        objects: Vec::new(),
    }
}

/// Seed `settings` with the built-in definitions.
///
/// Definitions already present in `settings` take precedence over the
/// built-in one with the same type name or protocol.
pub fn install_definitions(settings: &mut HostSettings) {
    let builtin = builtin_definitions();
    let context = &mut settings.object_context;

    let mut types: Vec<_> = builtin
        .types
        .into_iter()
        .filter(|b| !context.types.iter().any(|t| t.type_name == b.type_name))
        .collect();
    types.append(&mut context.types);
    context.types = types;

    let mut providers: Vec<_> = builtin
        .providers
        .into_iter()
        .filter(|b| {
            !context
                .providers
                .iter()
                .any(|p| p.protocol.eq_ignore_ascii_case(&b.protocol))
        })
        .collect();
    providers.append(&mut context.providers);
    context.providers = providers;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let modules = with_builtins().unwrap();

        let mut stages = modules.stage_names();
        stages.sort_unstable();
        assert_eq!(stages, ["executeEntryPoint", "finalizeResponse", "logRequest"]);
        assert!(modules.constructor(BUILTIN_MODULE, CREATE_ENTRY_POINT).is_ok());
        assert!(modules.provider(BUILTIN_MODULE, "httpProvider").is_ok());
        assert!(modules.entry_point(BUILTIN_MODULE, "echo").is_ok());
    }

    #[test]
    fn test_builtin_definitions_resolve() {
        let modules = with_builtins().unwrap();
        let definitions = builtin_definitions();

        for def in &definitions.types {
            assert!(modules.constructor(&def.module_name, &def.function_name).is_ok());
        }
        for def in &definitions.providers {
            assert!(modules.provider(&def.module_name, &def.function_name).is_ok());
        }
    }

    #[test]
    fn test_install_keeps_host_definitions() {
        let mut settings = HostSettings::default();
        settings.object_context.providers.push(ObjectProviderDefinition {
            protocol: "ENV".to_string(),
            description: None,
            module_name: "custom".to_string(),
            function_name: "env".to_string(),
            allow_override: false,
            example_uri: vec!["env://X".to_string()],
        });

        install_definitions(&mut settings);

        let providers = &settings.object_context.providers;
        assert_eq!(providers.len(), 4);
        assert_eq!(providers.last().unwrap().module_name, "custom");
        assert!(!providers.iter().any(|p| p.protocol == "env"));
        assert_eq!(settings.object_context.types.len(), 1);
    }
}
