//! Scoped object resolution.
//!
//! Contexts form a parent-linked tree (the engine's global context at the
//! root, one child per application). The nodes live in a [`ContextArena`]
//! and refer to their parent by [`ContextId`], so resolution with fallback
//! is a loop over parent ids.
//!
//! Resolution rules:
//! - local definitions win over inherited ones
//! - a private definition is only visible to the context that defines it
//! - literal and typed values are constructed once per defining context and
//!   cached; provider-backed (URI) values are constructed on every resolution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use url::Url;

use app_host_common::{NamedObjectDefinition, ObjectContextDefinition, ObjectKind, RuntimeError};

use crate::object::Object;
use crate::registry::{
    ModuleRegistry, ObjectConstructor, ObjectProvider, ProviderRegistry, Registry, TypeRegistry,
};

/// Key of the type tag in typed values.
pub const TYPE_TAG: &str = "_type";

/// Opaque index of a context in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

struct ContextNode {
    label: String,
    base_dir: PathBuf,
    parent: Option<ContextId>,
    types: TypeRegistry,
    providers: ProviderRegistry,
    objects: Registry<NamedObjectDefinition>,
    cache: DashMap<String, Arc<OnceCell<Object>>>,
}

/// Append-only storage for the context tree.
///
/// Contexts are never removed, so a [`ContextId`] stays valid for the
/// arena's lifetime.
pub struct ContextArena {
    nodes: RwLock<Vec<Arc<ContextNode>>>,
    modules: Arc<ModuleRegistry>,
}

impl ContextArena {
    fn node(&self, id: ContextId) -> Arc<ContextNode> {
        Arc::clone(&self.nodes.read()[id.0])
    }

    fn push(&self, node: ContextNode) -> ContextId {
        let mut nodes = self.nodes.write();
        nodes.push(Arc::new(node));
        ContextId(nodes.len() - 1)
    }

    /// Number of contexts created so far.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

/// How a definition's value is materialized.
enum ValueSource<'a> {
    Literal,
    Typed(&'a str),
    Provided(Url, Arc<dyn ObjectProvider>),
}

/// Handle to one node of the context tree.
#[derive(Clone)]
pub struct ScopedObjectContext {
    arena: Arc<ContextArena>,
    id: ContextId,
}

impl ScopedObjectContext {
    /// Create a root context in a new arena.
    pub fn new_root(
        label: impl Into<String>,
        base_dir: impl AsRef<Path>,
        definition: &ObjectContextDefinition,
        modules: Arc<ModuleRegistry>,
    ) -> Result<Self, RuntimeError> {
        let node = build_node(label.into(), base_dir.as_ref(), None, definition, &modules)?;
        let arena = Arc::new(ContextArena {
            nodes: RwLock::new(Vec::new()),
            modules,
        });
        let id = arena.push(node);
        Ok(Self { arena, id })
    }

    /// Create a child of this context.
    ///
    /// Fails without creating anything if `definition` has duplicate keys
    /// or names symbols missing from the module registry.
    pub fn create_child(
        &self,
        label: impl Into<String>,
        base_dir: impl AsRef<Path>,
        definition: &ObjectContextDefinition,
    ) -> Result<Self, RuntimeError> {
        let node = build_node(
            label.into(),
            base_dir.as_ref(),
            Some(self.id),
            definition,
            &self.arena.modules,
        )?;
        let id = self.arena.push(node);
        Ok(Self {
            arena: Arc::clone(&self.arena),
            id,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Scope label ("global" or the application id).
    pub fn label(&self) -> String {
        self.arena.node(self.id).label.clone()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.arena.node(self.id).base_dir.clone()
    }

    /// The parent context, if any.
    pub fn parent(&self) -> Option<Self> {
        self.arena.node(self.id).parent.map(|id| Self {
            arena: Arc::clone(&self.arena),
            id,
        })
    }

    /// The module registry shared by the whole tree.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.arena.modules
    }

    /// Returns `true` if `name` is defined in this context itself.
    pub fn defines(&self, name: &str) -> bool {
        self.arena.node(self.id).objects.contains(name)
    }

    /// Names defined in this context itself.
    pub fn object_names(&self) -> Vec<String> {
        self.arena
            .node(self.id)
            .objects
            .keys()
            .map(str::to_string)
            .collect()
    }

    /// Resolve a named object, falling back to ancestors.
    #[instrument(skip(self), fields(scope = %self.label()))]
    pub async fn resolve(&self, name: &str) -> Result<Object, RuntimeError> {
        let mut current = Some(self.id);
        let mut is_owner = true;

        while let Some(id) = current {
            let node = self.arena.node(id);
            if let Some(def) = node.objects.get(name) {
                if is_owner || !def.private {
                    return self.materialize(&node, id, def).await;
                }
                debug!(scope = %node.label, "Skipping private definition");
            }
            current = node.parent;
            is_owner = false;
        }

        Err(RuntimeError::unresolved(ObjectKind::Object, name))
    }

    /// Construct a value in this scope without caching it.
    ///
    /// Used for values that do not belong to a definition of this context,
    /// such as per-request overrides.
    pub async fn create(&self, value: &Value) -> Result<Object, RuntimeError> {
        match self.classify(self.id, value) {
            ValueSource::Literal => Ok(Object::from_json(value.clone())),
            ValueSource::Typed(type_name) => self.construct_typed(self.id, type_name, value).await,
            ValueSource::Provided(uri, provider) => provider.provide(&uri, self).await,
        }
    }

    async fn materialize(
        &self,
        node: &ContextNode,
        owner: ContextId,
        def: &NamedObjectDefinition,
    ) -> Result<Object, RuntimeError> {
        let owner_context = self.at(owner);
        match self.classify(owner, &def.value) {
            ValueSource::Provided(uri, provider) => {
                debug!(name = %def.name, uri = %uri, "Constructing provider-backed object");
                provider.provide(&uri, &owner_context).await
            }
            source => {
                let cell = node.cache.entry(def.name.clone()).or_default().clone();
                cell.get_or_try_init(|| async {
                    debug!(name = %def.name, scope = %node.label, "Constructing cached object");
                    match source {
                        ValueSource::Typed(type_name) => {
                            owner_context
                                .construct_typed(owner, type_name, &def.value)
                                .await
                        }
                        _ => Ok(Object::from_json(def.value.clone())),
                    }
                })
                .await
                .cloned()
            }
        }
    }

    async fn construct_typed(
        &self,
        from: ContextId,
        type_name: &str,
        value: &Value,
    ) -> Result<Object, RuntimeError> {
        let constructor = self
            .find_constructor(from, type_name)
            .ok_or_else(|| RuntimeError::unresolved(ObjectKind::Type, type_name))?;
        constructor.construct(value, self).await
    }

    fn classify<'a>(&self, from: ContextId, value: &'a Value) -> ValueSource<'a> {
        match value {
            Value::Object(map) => match map.get(TYPE_TAG) {
                Some(Value::String(type_name)) => ValueSource::Typed(type_name),
                _ => ValueSource::Literal,
            },
            Value::String(text) if text.contains("://") => {
                let Ok(uri) = Url::parse(text) else {
                    return ValueSource::Literal;
                };
                match self.find_provider(from, uri.scheme()) {
                    Some(provider) => ValueSource::Provided(uri, provider),
                    None => ValueSource::Literal,
                }
            }
            _ => ValueSource::Literal,
        }
    }

    fn find_constructor(&self, from: ContextId, type_name: &str) -> Option<Arc<dyn ObjectConstructor>> {
        self.walk(from, |node| node.types.get(type_name).cloned())
    }

    fn find_provider(&self, from: ContextId, protocol: &str) -> Option<Arc<dyn ObjectProvider>> {
        let protocol = protocol.to_lowercase();
        self.walk(from, |node| node.providers.get(&protocol).cloned())
    }

    /// Return the first hit of `f` from `from` up to the root.
    fn walk<T>(&self, from: ContextId, f: impl Fn(&ContextNode) -> Option<T>) -> Option<T> {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.arena.node(id);
            if let Some(found) = f(&*node) {
                return Some(found);
            }
            current = node.parent;
        }
        None
    }

    fn at(&self, id: ContextId) -> Self {
        Self {
            arena: Arc::clone(&self.arena),
            id,
        }
    }
}

impl std::fmt::Debug for ScopedObjectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedObjectContext")
            .field("id", &self.id)
            .field("label", &self.label())
            .finish_non_exhaustive()
    }
}

fn build_node(
    label: String,
    base_dir: &Path,
    parent: Option<ContextId>,
    definition: &ObjectContextDefinition,
    modules: &ModuleRegistry,
) -> Result<ContextNode, RuntimeError> {
    let types = TypeRegistry::from_definitions(&definition.types, modules)?;
    let providers = ProviderRegistry::from_definitions(&definition.providers, modules)?;

    let mut objects = Registry::new(ObjectKind::Object);
    for def in &definition.objects {
        objects.insert(def.name.clone(), Arc::new(def.clone()), def.allow_override)?;
    }

    debug!(
        scope = %label,
        types = types.len(),
        providers = providers.len(),
        objects = objects.len(),
        "Object context created"
    );

    Ok(ContextNode {
        label,
        base_dir: base_dir.to_path_buf(),
        parent,
        types,
        providers,
        objects,
        cache: DashMap::new(),
    })
}
