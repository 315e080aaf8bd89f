//! Built-in pipeline stages.
//!
//! The default execution stack is `finalizeResponse` then
//! `executeEntryPoint`; `logRequest` is opt-in.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use app_host_common::RuntimeError;
use app_host_core::{DebugInfo, Interceptor, Next, RequestContext, Response};

use crate::types::as_entry_point;

/// Terminal stage: resolve the request's entry point and invoke it.
///
/// Stages listed after this one never run.
pub struct ExecuteEntryPoint;

#[async_trait]
impl Interceptor for ExecuteEntryPoint {
    async fn intercept(
        &self,
        context: &RequestContext,
        next: Next<'_>,
    ) -> Result<Response, RuntimeError> {
        if next.remaining() > 0 {
            debug!(skipped = next.remaining(), "Stages after executeEntryPoint are ignored");
        }

        let request = context.request();
        let name = request.entry_point.as_deref().ok_or_else(|| {
            RuntimeError::malformed_request("Property 'entryPoint' is missing from request.")
        })?;

        let object = context.resolve(name).await?;
        let entry_point = as_entry_point(&object)
            .ok_or_else(|| RuntimeError::execution(format!("object '{name}' is not an entry point")))?;

        let output = entry_point.invoke(context, &request.input).await?;
        Ok(Response::success(output))
    }
}

/// Outer stage: complete the response produced by the rest of the stack.
///
/// Attaches [`DebugInfo`] when the request sets `controlFlags.debug`.
pub struct FinalizeResponse;

#[async_trait]
impl Interceptor for FinalizeResponse {
    async fn intercept(
        &self,
        context: &RequestContext,
        next: Next<'_>,
    ) -> Result<Response, RuntimeError> {
        let mut response = next.run(context).await?;

        if context.request().control_flags.debug {
            let application = context.application();
            response.debug_info = Some(DebugInfo {
                request_id: context.request_id().to_string(),
                application: application.id().to_string(),
                duration_ms: u64::try_from(context.elapsed().as_millis()).unwrap_or(u64::MAX),
                stages: application.pipeline().stage_names().to_vec(),
            });
        }
        Ok(response)
    }
}

/// Log each request passing through, with its outcome.
pub struct LogRequest;

#[async_trait]
impl Interceptor for LogRequest {
    async fn intercept(
        &self,
        context: &RequestContext,
        next: Next<'_>,
    ) -> Result<Response, RuntimeError> {
        let request = context.request();
        info!(
            request_id = %context.request_id(),
            application = %request.application,
            entry_point = ?request.entry_point,
            "Request received"
        );

        let result = next.run(context).await;
        match &result {
            Ok(response) => info!(
                request_id = %context.request_id(),
                response_code = ?response.response_code,
                duration_ms = context.elapsed().as_millis(),
                "Request handled"
            ),
            Err(e) => warn!(
                request_id = %context.request_id(),
                error = %e,
                duration_ms = context.elapsed().as_millis(),
                "Request failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use app_host_common::{ApplicationSettings, HostSettings, NamedObjectDefinition, RuntimeError};
    use app_host_core::{Application, Request, RequestContext, Response, ScopedObjectContext};
    use serde_json::json;

    use crate::linker::{builtin_definitions, with_builtins};

    fn entry(name: &str, value: serde_json::Value) -> NamedObjectDefinition {
        NamedObjectDefinition {
            name: name.to_string(),
            description: None,
            value,
            allow_override: false,
            private: false,
        }
    }

    fn application(stack: &[&str]) -> Arc<Application> {
        let host = HostSettings::default();
        let global = ScopedObjectContext::new_root(
            "global",
            ".",
            &builtin_definitions(),
            Arc::new(with_builtins().unwrap()),
        )
        .unwrap();

        let mut settings = ApplicationSettings::inherit(&host, "example");
        settings.default_execution_stack = stack.iter().map(ToString::to_string).collect();
        settings.object_context.objects = vec![
            entry(
                "hello",
                json!({"_type": "EntryPoint", "moduleName": "app-host", "functionName": "echo"}),
            ),
            entry("plain", json!("just a string")),
        ];
        Arc::new(Application::new(&global, settings).unwrap())
    }

    async fn run(stack: &[&str], request: Request) -> Result<Response, RuntimeError> {
        let context = RequestContext::new(application(stack), request).unwrap();
        context.execute().await
    }

    #[tokio::test]
    async fn test_execute_entry_point() {
        let response = run(
            &["finalizeResponse", "executeEntryPoint"],
            Request::new("example", "hello").with_input(json!({"x": 1})),
        )
        .await
        .unwrap();

        assert!(response.is_success());
        assert_eq!(response.output, Some(json!({"x": 1})));
        assert!(response.debug_info.is_none());
    }

    #[tokio::test]
    async fn test_debug_info() {
        let response = run(
            &["logRequest", "finalizeResponse", "executeEntryPoint"],
            Request::new("example", "hello").with_debug(),
        )
        .await
        .unwrap();

        let debug = response.debug_info.unwrap();
        assert_eq!(debug.application, "example");
        assert_eq!(
            debug.stages,
            ["logRequest", "finalizeResponse", "executeEntryPoint"]
        );
        assert!(!debug.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let mut request = Request::new("example", "x");
        request.entry_point = None;

        let err = run(&["executeEntryPoint"], request).await.unwrap_err();
        assert!(err.to_string().contains("'entryPoint' is missing"));
    }

    #[tokio::test]
    async fn test_unknown_entry_point() {
        let err = run(&["executeEntryPoint"], Request::new("example", "nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_object_is_not_an_entry_point() {
        let err = run(&["executeEntryPoint"], Request::new("example", "plain"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not an entry point"));
    }
}
