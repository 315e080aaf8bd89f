//! The `EntryPoint` object type.
//!
//! An entry point is declared as a named object:
//!
//! ```json
//! { "name": "hello", "value": { "_type": "EntryPoint", "moduleName": "app-host", "functionName": "echo" } }
//! ```
//!
//! Constructing it looks the symbol up in the module registry; the
//! resulting object holds an `Arc<dyn EntryPoint>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use app_host_common::RuntimeError;
use app_host_core::{EntryPoint, Object, ObjectConstructor, ScopedObjectContext};

/// `_type` tag of entry point values.
pub const ENTRY_POINT_TYPE: &str = "EntryPoint";

/// Payload of an `EntryPoint` typed value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntryPointRef {
    #[serde(rename = "_type")]
    pub type_name: String,
    pub module_name: String,
    pub function_name: String,
}

/// Constructor for the `EntryPoint` type.
pub struct EntryPointConstructor;

#[async_trait]
impl ObjectConstructor for EntryPointConstructor {
    async fn construct(
        &self,
        input: &Value,
        context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        let target = EntryPointRef::deserialize(input)
            .map_err(|e| RuntimeError::object_construction(ENTRY_POINT_TYPE, e.to_string()))?;
        let entry_point = context
            .modules()
            .entry_point(&target.module_name, &target.function_name)?;

        debug!(
            module = %target.module_name,
            function = %target.function_name,
            "Entry point bound"
        );
        Ok(Object::new(entry_point))
    }
}

/// The entry point held by `object`, if it is one.
pub fn as_entry_point(object: &Object) -> Option<Arc<dyn EntryPoint>> {
    object.downcast_ref::<Arc<dyn EntryPoint>>().cloned()
}
