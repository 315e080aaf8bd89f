//! Execution zones.
//!
//! A zone is an isolated execution context reached only through string
//! messages: requests go in as JSON, responses come back as JSON. The
//! [`WorkerZone`] implementation runs its own [`LocalEngine`] on a
//! dedicated task and talks to it over a channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{Instrument, debug, info, instrument, warn};

use app_host_common::{HostSettings, RuntimeError};

use crate::engine::{Engine, LocalEngine};
use crate::registry::ModuleRegistry;
use crate::wire::{RequestInput, ResponseHelper};

/// Module name under which a zone exposes its runtime.
pub const RUNTIME_MODULE: &str = "app-host";

/// Function a zone runs to serve a serialized request.
pub const SERVE_FUNCTION: &str = "serve";

/// Default capacity of a worker zone's message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// An isolated execution context applications can be registered into.
#[async_trait]
pub trait ExecutionZone: Send + Sync {
    /// Stable identifier of the zone.
    fn id(&self) -> &str;

    /// Load application module `app_module_name` inside the zone under
    /// `instance_names`.
    async fn register(
        &self,
        app_module_name: &str,
        instance_names: &[String],
    ) -> Result<(), RuntimeError>;

    /// Run `module`:`function` inside the zone with string arguments and
    /// return its string result.
    async fn execute(
        &self,
        module: &str,
        function: &str,
        args: Vec<String>,
    ) -> Result<String, RuntimeError>;
}

enum ZoneMessage {
    Register {
        app_module_name: String,
        instance_names: Vec<String>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Execute {
        module: String,
        function: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<String, String>>,
    },
}

/// Zone backed by a background task owning its own [`LocalEngine`].
///
/// Registrations are applied in arrival order. Each request runs on its
/// own task, so a slow request never holds up the ones behind it. Nothing
/// but strings crosses the channel, so the zone shares no object state
/// with its caller. Dropping the last handle stops the task.
pub struct WorkerZone {
    id: String,
    sender: mpsc::Sender<ZoneMessage>,
}

impl WorkerZone {
    /// Start a zone with its own engine built from `settings`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        id: impl Into<String>,
        settings: HostSettings,
        modules: Arc<ModuleRegistry>,
        capacity: usize,
    ) -> Result<Self, RuntimeError> {
        let id = id.into();
        let engine = LocalEngine::new(settings, modules)?;
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        tokio::spawn(run_worker(id.clone(), engine, receiver));
        info!(zone = %id, "Execution zone started");

        Ok(Self { id, sender })
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T, String>>) -> ZoneMessage,
    ) -> Result<T, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.sender.send(message(reply)).await.map_err(|_| {
            RuntimeError::remote_execution(format!("zone '{}' is not running", self.id))
        })?;

        response
            .await
            .map_err(|_| {
                RuntimeError::remote_execution(format!("zone '{}' dropped the call", self.id))
            })?
            .map_err(RuntimeError::remote_execution)
    }
}

#[async_trait]
impl ExecutionZone for WorkerZone {
    fn id(&self) -> &str {
        &self.id
    }

    async fn register(
        &self,
        app_module_name: &str,
        instance_names: &[String],
    ) -> Result<(), RuntimeError> {
        let app_module_name = app_module_name.to_string();
        let instance_names = instance_names.to_vec();
        self.call(|reply| ZoneMessage::Register {
            app_module_name,
            instance_names,
            reply,
        })
        .await
    }

    async fn execute(
        &self,
        module: &str,
        function: &str,
        args: Vec<String>,
    ) -> Result<String, RuntimeError> {
        let module = module.to_string();
        let function = function.to_string();
        self.call(|reply| ZoneMessage::Execute {
            module,
            function,
            args,
            reply,
        })
        .await
    }
}

impl std::fmt::Debug for WorkerZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerZone")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[instrument(name = "zone", skip(engine, receiver))]
async fn run_worker(
    zone_id: String,
    engine: LocalEngine,
    mut receiver: mpsc::Receiver<ZoneMessage>,
) {
    let engine = Arc::new(RwLock::new(engine));
    while let Some(message) = receiver.recv().await {
        match message {
            ZoneMessage::Register {
                app_module_name,
                instance_names,
                reply,
            } => {
                let result = engine
                    .write()
                    .await
                    .register(&app_module_name, &instance_names, None)
                    .await
                    .map_err(|e| e.to_string());
                if let Err(e) = &result {
                    warn!(module = %app_module_name, error = %e, "Zone registration failed");
                }
                let _ = reply.send(result);
            }
            ZoneMessage::Execute {
                module,
                function,
                args,
                reply,
            } => {
                // Taken here so a request sees every registration sent before it.
                let engine = Arc::clone(&engine).read_owned().await;
                tokio::spawn(async move {
                    let result = dispatch(&engine, &module, &function, args).await;
                    let _ = reply.send(result);
                }
                .in_current_span());
            }
        }
    }
    debug!("Execution zone stopped");
}

async fn dispatch(
    engine: &LocalEngine,
    module: &str,
    function: &str,
    args: Vec<String>,
) -> Result<String, String> {
    if module != RUNTIME_MODULE || function != SERVE_FUNCTION {
        return Err(format!("unknown function '{module}:{function}'"));
    }
    let Some(request) = args.into_iter().next() else {
        return Err(format!("'{function}' expects a request argument"));
    };

    let response = engine
        .serve(RequestInput::Raw(request))
        .await
        .map_err(|e| e.to_string())?;
    ResponseHelper::serialize(&response).map_err(|e| e.to_string())
}
