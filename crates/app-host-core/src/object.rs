//! Live values produced by object resolution.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A resolved object.
///
/// Objects are type-erased and cheap to clone. Literal values resolve to an
/// `Object` holding a [`serde_json::Value`]; constructors and providers may
/// return any `Send + Sync` type, recovered with [`Object::downcast_ref`].
#[derive(Clone)]
pub struct Object(Arc<dyn Any + Send + Sync>);

impl Object {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap a JSON literal.
    pub fn from_json(value: Value) -> Self {
        Self::new(value)
    }

    /// Borrow the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Borrow the wrapped value as JSON, if it is one.
    pub fn as_json(&self) -> Option<&Value> {
        self.downcast_ref::<Value>()
    }

    /// Returns `true` if both handles point to the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_json() {
            Some(value) => f.debug_tuple("Object").field(value).finish(),
            None => f.debug_tuple("Object").field(&"<opaque>").finish(),
        }
    }
}
