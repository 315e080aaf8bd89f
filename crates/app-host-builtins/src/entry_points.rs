//! Built-in entry points.

use async_trait::async_trait;
use serde_json::Value;

use app_host_common::RuntimeError;
use app_host_core::{EntryPoint, RequestContext};

/// Return the input unchanged.
pub fn echo(input: &Value) -> Result<Value, RuntimeError> {
    Ok(input.clone())
}

/// Resolve a named object in the caller's application and return it.
///
/// Input is the object name, either as a string or as `{"name": ..}`.
/// Only JSON-backed objects can be returned.
pub struct ResolveObject;

#[async_trait]
impl EntryPoint for ResolveObject {
    async fn invoke(&self, context: &RequestContext, input: &Value) -> Result<Value, RuntimeError> {
        let name = match input {
            Value::String(name) => name.as_str(),
            other => other
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| RuntimeError::malformed_request("expected an object name"))?,
        };

        let object = context.resolve(name).await?;
        object
            .as_json()
            .cloned()
            .ok_or_else(|| RuntimeError::execution(format!("object '{name}' is not JSON")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_echo() {
        assert_eq!(echo(&json!({"a": [1, 2]})).unwrap(), json!({"a": [1, 2]}));
        assert_eq!(echo(&Value::Null).unwrap(), Value::Null);
    }
}
