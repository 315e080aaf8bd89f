//! Request execution pipeline.
//!
//! An application's execution stack is a list of stage names resolved to
//! [`Interceptor`]s when the application loads. Stages run outermost
//! first; each decides whether and when to run the rest of the stack
//! through [`Next`]. Stage bodies are provided by the embedding program
//! (see the builtins crate); this module only fixes their ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use app_host_common::{NamedObjectDefinition, RuntimeError};

use crate::application::Application;
use crate::object::Object;
use crate::registry::ModuleRegistry;
use crate::wire::{Request, Response};

/// A callable exposed by an application.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    async fn invoke(&self, context: &RequestContext, input: &Value) -> Result<Value, RuntimeError>;
}

/// Adapter turning a plain function into an [`EntryPoint`].
pub struct FnEntryPoint<F>(pub F);

#[async_trait]
impl<F> EntryPoint for FnEntryPoint<F>
where
    F: Fn(&Value) -> Result<Value, RuntimeError> + Send + Sync,
{
    async fn invoke(
        &self,
        _context: &RequestContext,
        input: &Value,
    ) -> Result<Value, RuntimeError> {
        (self.0)(input)
    }
}

/// One stage of the execution stack.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        context: &RequestContext,
        next: Next<'_>,
    ) -> Result<Response, RuntimeError>;
}

/// The stages remaining after the current one.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Interceptor>],
}

impl Next<'_> {
    /// Run the remaining stages. An exhausted stack yields an empty success.
    pub async fn run(self, context: &RequestContext) -> Result<Response, RuntimeError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.intercept(context, Next { stages: rest }).await,
            None => Ok(Response::default()),
        }
    }

    /// Number of stages left to run.
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

/// Resolved execution stack of an application.
pub struct Pipeline {
    names: Vec<String>,
    stages: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    /// Resolve stage names against the module registry.
    pub fn from_stage_names(
        names: &[String],
        modules: &ModuleRegistry,
    ) -> Result<Self, RuntimeError> {
        let stages = names
            .iter()
            .map(|name| {
                modules.stage(name).map_err(|e| {
                    RuntimeError::config_validation(format!("execution stack: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            names: names.to_vec(),
            stages,
        })
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> &[String] {
        &self.names
    }

    pub async fn run(&self, context: &RequestContext) -> Result<Response, RuntimeError> {
        Next {
            stages: &self.stages,
        }
        .run(context)
        .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.names).finish()
    }
}

/// State of one request while it runs through the pipeline.
pub struct RequestContext {
    application: Arc<Application>,
    request: Request,
    request_id: String,
    overrides: HashMap<String, NamedObjectDefinition>,
    start: Instant,
}

impl RequestContext {
    /// Create the context for `request` against `application`.
    ///
    /// Fails if the request carries object overrides the application does
    /// not allow.
    pub fn new(application: Arc<Application>, request: Request) -> Result<Self, RuntimeError> {
        if !request.override_objects.is_empty()
            && !application.settings().allow_per_request_override
        {
            return Err(RuntimeError::malformed_request(format!(
                "application '{}' does not allow per-request overrides",
                application.id()
            )));
        }

        let overrides = request
            .override_objects
            .iter()
            .map(|def| (def.name.clone(), def.clone()))
            .collect();

        Ok(Self {
            application,
            request,
            request_id: Uuid::new_v4().to_string(),
            overrides,
            start: Instant::now(),
        })
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Unique identifier of this request, for tracing.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Resolve a named object, consulting per-request overrides first.
    pub async fn resolve(&self, name: &str) -> Result<Object, RuntimeError> {
        let context = self.application.object_context();
        match self.overrides.get(name) {
            Some(def) => {
                debug!(name, "Using per-request override");
                context.create(&def.value).await
            }
            None => context.resolve(name).await,
        }
    }

    /// Run the application's pipeline.
    pub async fn execute(&self) -> Result<Response, RuntimeError> {
        self.application.pipeline().run(self).await
    }
}
