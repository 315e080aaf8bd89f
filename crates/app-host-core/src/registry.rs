//! Constructor tables.
//!
//! Two layers live here:
//! - [`ModuleRegistry`]: the process-wide symbol table mapping
//!   `moduleName`/`functionName` pairs to capabilities. It is filled by the
//!   embedding program (see the builtins crate) before any engine starts.
//! - [`Registry`]: a per-scope table keyed by type name, protocol or object
//!   name, built once from validated definitions. [`TypeRegistry`] and
//!   [`ProviderRegistry`] are its two constructor-carrying instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use app_host_common::{ObjectKind, ObjectProviderDefinition, ObjectTypeDefinition, RuntimeError};

use crate::object::Object;
use crate::object_context::ScopedObjectContext;
use crate::pipeline::{EntryPoint, Interceptor};

/// Builds an object from a typed JSON payload (`{"_type": .., ..}`).
#[async_trait]
pub trait ObjectConstructor: Send + Sync {
    async fn construct(
        &self,
        input: &Value,
        context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError>;
}

/// Builds an object from a URI whose scheme it is registered for.
#[async_trait]
pub trait ObjectProvider: Send + Sync {
    async fn provide(&self, uri: &Url, context: &ScopedObjectContext)
    -> Result<Object, RuntimeError>;
}

/// Adapter turning a plain function into an [`ObjectConstructor`].
pub struct FnConstructor<F>(pub F);

#[async_trait]
impl<F> ObjectConstructor for FnConstructor<F>
where
    F: Fn(&Value) -> Result<Object, RuntimeError> + Send + Sync,
{
    async fn construct(
        &self,
        input: &Value,
        _context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        (self.0)(input)
    }
}

/// Adapter turning a plain function into an [`ObjectProvider`].
pub struct FnProvider<F>(pub F);

#[async_trait]
impl<F> ObjectProvider for FnProvider<F>
where
    F: Fn(&Url) -> Result<Object, RuntimeError> + Send + Sync,
{
    async fn provide(
        &self,
        uri: &Url,
        _context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        (self.0)(uri)
    }
}

/// A `moduleName`/`functionName` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub module: String,
    pub function: String,
}

impl Symbol {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.function)
    }
}

/// Symbol table of constructors, providers, entry points and pipeline stages.
///
/// Definitions only name a module and a function; this table is what those
/// names resolve to. Lookups happen at load time, so an unknown symbol is a
/// configuration error rather than a serve-time failure.
#[derive(Default)]
pub struct ModuleRegistry {
    constructors: HashMap<Symbol, Arc<dyn ObjectConstructor>>,
    providers: HashMap<Symbol, Arc<dyn ObjectProvider>>,
    entry_points: HashMap<Symbol, Arc<dyn EntryPoint>>,
    stages: HashMap<String, Arc<dyn Interceptor>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_constructor(
        &mut self,
        module: &str,
        function: &str,
        constructor: impl ObjectConstructor + 'static,
    ) -> &mut Self {
        self.constructors
            .insert(Symbol::new(module, function), Arc::new(constructor));
        self
    }

    pub fn register_provider(
        &mut self,
        module: &str,
        function: &str,
        provider: impl ObjectProvider + 'static,
    ) -> &mut Self {
        self.providers
            .insert(Symbol::new(module, function), Arc::new(provider));
        self
    }

    pub fn register_entry_point(
        &mut self,
        module: &str,
        function: &str,
        entry_point: impl EntryPoint + 'static,
    ) -> &mut Self {
        self.entry_points
            .insert(Symbol::new(module, function), Arc::new(entry_point));
        self
    }

    /// Register a pipeline stage under the name used in execution stacks.
    pub fn register_stage(&mut self, name: &str, stage: impl Interceptor + 'static) -> &mut Self {
        self.stages.insert(name.to_string(), Arc::new(stage));
        self
    }

    pub fn constructor(
        &self,
        module: &str,
        function: &str,
    ) -> Result<Arc<dyn ObjectConstructor>, RuntimeError> {
        lookup(&self.constructors, module, function)
    }

    pub fn provider(
        &self,
        module: &str,
        function: &str,
    ) -> Result<Arc<dyn ObjectProvider>, RuntimeError> {
        lookup(&self.providers, module, function)
    }

    pub fn entry_point(
        &self,
        module: &str,
        function: &str,
    ) -> Result<Arc<dyn EntryPoint>, RuntimeError> {
        lookup(&self.entry_points, module, function)
    }

    pub fn stage(&self, name: &str) -> Result<Arc<dyn Interceptor>, RuntimeError> {
        self.stages
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::unresolved(ObjectKind::Stage, name))
    }

    /// Names of all registered pipeline stages.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("constructors", &self.constructors.len())
            .field("providers", &self.providers.len())
            .field("entry_points", &self.entry_points.len())
            .field("stages", &self.stages.len())
            .finish()
    }
}

fn lookup<T: ?Sized>(
    table: &HashMap<Symbol, Arc<T>>,
    module: &str,
    function: &str,
) -> Result<Arc<T>, RuntimeError> {
    let symbol = Symbol::new(module, function);
    table
        .get(&symbol)
        .cloned()
        .ok_or_else(|| RuntimeError::unresolved(ObjectKind::Symbol, symbol.to_string()))
}

/// Per-scope table of values keyed by name.
///
/// Keys are unique unless the incoming entry is flagged as an override;
/// a duplicate without the flag is rejected when the table is built.
pub struct Registry<T: ?Sized> {
    kind: ObjectKind,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    /// Insert an entry, honoring override semantics.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Arc<T>,
        allow_override: bool,
    ) -> Result<(), RuntimeError> {
        let key = key.into();
        if self.entries.contains_key(&key) && !allow_override {
            return Err(RuntimeError::config_validation(format!(
                "duplicate {} '{key}' without override",
                self.kind
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Arc<T>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Type name to constructor.
pub type TypeRegistry = Registry<dyn ObjectConstructor>;

/// Lower-cased protocol to provider.
pub type ProviderRegistry = Registry<dyn ObjectProvider>;

impl Registry<dyn ObjectConstructor> {
    /// Build a type registry, resolving each constructor symbol in `modules`.
    pub fn from_definitions(
        definitions: &[ObjectTypeDefinition],
        modules: &ModuleRegistry,
    ) -> Result<Self, RuntimeError> {
        let mut registry = Self::new(ObjectKind::Type);
        for def in definitions {
            let constructor = modules
                .constructor(&def.module_name, &def.function_name)
                .map_err(|e| {
                    RuntimeError::config_validation(format!("type '{}': {e}", def.type_name))
                })?;
            registry.insert(def.type_name.clone(), constructor, def.allow_override)?;
        }
        Ok(registry)
    }
}

impl Registry<dyn ObjectProvider> {
    /// Build a provider registry, resolving each provider symbol in `modules`.
    pub fn from_definitions(
        definitions: &[ObjectProviderDefinition],
        modules: &ModuleRegistry,
    ) -> Result<Self, RuntimeError> {
        let mut registry = Self::new(ObjectKind::Protocol);
        for def in definitions {
            let provider = modules
                .provider(&def.module_name, &def.function_name)
                .map_err(|e| {
                    RuntimeError::config_validation(format!("protocol '{}': {e}", def.protocol))
                })?;
            registry.insert(def.protocol.to_lowercase(), provider, def.allow_override)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn type_def(type_name: &str, function: &str, allow_override: bool) -> ObjectTypeDefinition {
        ObjectTypeDefinition {
            type_name: type_name.to_string(),
            description: None,
            module_name: "test".to_string(),
            function_name: function.to_string(),
            allow_override,
            example_objects: vec![json!({"_type": type_name})],
        }
    }

    fn modules() -> ModuleRegistry {
        let mut modules = ModuleRegistry::new();
        modules
            .register_constructor("test", "one", FnConstructor(|_: &Value| Ok(Object::new(1))))
            .register_constructor("test", "two", FnConstructor(|_: &Value| Ok(Object::new(2))));
        modules
    }

    #[test]
    fn test_unknown_symbol() {
        let err = ModuleRegistry::new()
            .constructor("nope", "missing")
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Unresolved symbol: 'nope:missing'");
    }

    #[test]
    fn test_duplicate_without_override() {
        let defs = vec![type_def("A", "one", false), type_def("A", "two", false)];
        let result = TypeRegistry::from_definitions(&defs, &modules());

        assert!(matches!(
            result,
            Err(RuntimeError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_duplicate_with_override() {
        let defs = vec![type_def("A", "one", false), type_def("A", "two", true)];
        let registry = TypeRegistry::from_definitions(&defs, &modules()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("A"));
    }

    #[test]
    fn test_unknown_constructor_fails_at_load() {
        let defs = vec![type_def("A", "three", false)];
        let result = TypeRegistry::from_definitions(&defs, &modules());

        let message = result.err().unwrap().to_string();
        assert!(message.contains("type 'A'"));
        assert!(message.contains("test:three"));
    }

    #[test]
    fn test_protocol_keys_are_lowercased() {
        let mut modules = ModuleRegistry::new();
        modules.register_provider(
            "test",
            "echo",
            FnProvider(|uri: &Url| Ok(Object::new(uri.to_string()))),
        );
        let defs = vec![ObjectProviderDefinition {
            protocol: "Echo".to_string(),
            description: None,
            module_name: "test".to_string(),
            function_name: "echo".to_string(),
            allow_override: false,
            example_uri: vec!["echo://x".to_string()],
        }];

        let registry = ProviderRegistry::from_definitions(&defs, &modules).unwrap();
        assert!(registry.contains("echo"));
    }
}
