//! Application engines.
//!
//! An [`Engine`] owns a set of registered application instance names and
//! serves requests against them:
//! - [`LocalEngine`]: loads applications and runs their pipelines in-process
//! - [`RemoteEngine`]: forwards requests to an [`ExecutionZone`]
//!
//! Instance names are case-insensitive; they are stored lower-cased for
//! lookup and in their original spelling for listing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use app_host_common::{ApplicationConfig, ApplicationSettings, HostSettings, RuntimeError};

use crate::application::Application;
use crate::object_context::ScopedObjectContext;
use crate::pipeline::RequestContext;
use crate::registry::ModuleRegistry;
use crate::wire::{Request, RequestInput, Response, ResponseHelper, settle};
use crate::zone::{ExecutionZone, RUNTIME_MODULE, SERVE_FUNCTION};

/// Shared handle to an execution zone.
pub type ZoneHandle = Arc<dyn ExecutionZone>;

/// Label used for the in-process side in zone mismatch errors.
const LOCAL_ZONE: &str = "local";

/// Something that can register application instances and serve requests.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Register `app_module_name` under each of `instance_names`.
    ///
    /// `zone` selects where the application runs; `None` means in-process.
    async fn register(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
        zone: Option<ZoneHandle>,
    ) -> Result<(), RuntimeError>;

    /// Serve a request given as a JSON string or a parsed [`Request`].
    async fn serve(&self, request: RequestInput) -> Result<Response, RuntimeError>;

    /// Instance names served by this engine, in registration order.
    fn application_instance_names(&self) -> &[String];
}

/// Engine running applications in the current execution context.
pub struct LocalEngine {
    settings: HostSettings,
    object_context: ScopedObjectContext,
    /// Lower-cased instance name to application.
    applications: HashMap<String, Arc<Application>>,
    /// Configuration path to application, so re-registration reuses it.
    loaded: HashMap<PathBuf, Arc<Application>>,
    instance_names: Vec<String>,
}

impl LocalEngine {
    /// Create an engine and its global object context.
    pub fn new(settings: HostSettings, modules: Arc<ModuleRegistry>) -> Result<Self, RuntimeError> {
        let object_context = ScopedObjectContext::new_root(
            "global",
            &settings.base_dir,
            &settings.object_context,
            modules,
        )?;

        Ok(Self {
            settings,
            object_context,
            applications: HashMap::new(),
            loaded: HashMap::new(),
            instance_names: Vec::new(),
        })
    }

    /// Register an application from in-memory settings.
    ///
    /// Every call builds a new application, so names bound by an earlier
    /// call are always duplicates.
    pub fn register_settings(
        &mut self,
        settings: ApplicationSettings,
        instance_names: &[String],
    ) -> Result<Arc<Application>, RuntimeError> {
        self.check_names(instance_names, None)?;
        let application = Arc::new(Application::new(&self.object_context, settings)?);
        self.bind(&application, instance_names);
        Ok(application)
    }

    /// Get an application by instance name (case-insensitive).
    pub fn get_application(&self, name: &str) -> Result<Arc<Application>, RuntimeError> {
        self.applications
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RuntimeError::unknown_application(name))
    }

    /// Engine level (global) object context.
    pub fn object_context(&self) -> &ScopedObjectContext {
        &self.object_context
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Fail if any name is bound to an application other than `candidate`.
    fn check_names(
        &self,
        instance_names: &[String],
        candidate: Option<&Arc<Application>>,
    ) -> Result<(), RuntimeError> {
        for name in instance_names {
            if let Some(existing) = self.applications.get(&name.to_lowercase()) {
                if !candidate.is_some_and(|c| Arc::ptr_eq(c, existing)) {
                    return Err(RuntimeError::duplicate_registration(name.as_str()));
                }
            }
        }
        Ok(())
    }

    /// Bind names not yet bound. Callers check conflicts first.
    fn bind(&mut self, application: &Arc<Application>, instance_names: &[String]) {
        for name in instance_names {
            let key = name.to_lowercase();
            if !self.applications.contains_key(&key) {
                self.applications.insert(key, Arc::clone(application));
                self.instance_names.push(name.clone());
            }
        }
    }

    async fn execute(
        application: Arc<Application>,
        request: Request,
    ) -> Result<Response, RuntimeError> {
        let context = RequestContext::new(application, request)?;
        let result = context.execute().await;
        let duration = context.elapsed();

        match &result {
            Ok(response) => info!(
                request_id = %context.request_id(),
                application = %context.application().id(),
                response_code = ?response.response_code,
                duration_ms = duration.as_millis(),
                "Request completed"
            ),
            Err(e) => warn!(
                request_id = %context.request_id(),
                application = %context.application().id(),
                error = %e,
                duration_ms = duration.as_millis(),
                "Request failed"
            ),
        }
        result
    }
}

#[async_trait]
impl Engine for LocalEngine {
    #[instrument(skip(self, zone))]
    async fn register(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
        zone: Option<ZoneHandle>,
    ) -> Result<(), RuntimeError> {
        if let Some(zone) = zone {
            return Err(RuntimeError::ZoneMismatch {
                expected: LOCAL_ZONE.to_string(),
                actual: zone.id().to_string(),
            });
        }

        let path = ApplicationConfig::resolve_path(&self.settings, app_module_name);
        let previous = self.loaded.get(&path).cloned();
        self.check_names(instance_names, previous.as_ref())?;

        let application = match previous {
            Some(application) => application,
            None => {
                let settings = ApplicationConfig::from_file(&self.settings, &path)?;
                let application = Arc::new(Application::new(&self.object_context, settings)?);
                self.loaded.insert(path, Arc::clone(&application));
                application
            }
        };
        self.bind(&application, instance_names);

        info!(
            application = %application.id(),
            module = app_module_name,
            "Application registered"
        );
        Ok(())
    }

    async fn serve(&self, request: RequestInput) -> Result<Response, RuntimeError> {
        let throw = self.settings.throw_exception_on_error;
        let request = match request.into_request() {
            Ok(request) => request,
            Err(e) => return settle(Err(e), throw),
        };
        let application = match self.get_application(&request.application) {
            Ok(application) => application,
            Err(e) => return settle(Err(e), throw),
        };

        let throw = application.settings().throw_exception_on_error;
        settle(Self::execute(application, request).await, throw)
    }

    fn application_instance_names(&self) -> &[String] {
        &self.instance_names
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("instance_names", &self.instance_names)
            .finish_non_exhaustive()
    }
}

/// Engine whose applications run inside an [`ExecutionZone`].
///
/// Performs no retries; zone failures surface as
/// [`RuntimeError::RemoteExecution`].
pub struct RemoteEngine {
    zone: ZoneHandle,
    instance_names: Vec<String>,
}

impl RemoteEngine {
    pub fn new(zone: ZoneHandle) -> Self {
        Self {
            zone,
            instance_names: Vec::new(),
        }
    }

    pub fn zone(&self) -> &ZoneHandle {
        &self.zone
    }
}

#[async_trait]
impl Engine for RemoteEngine {
    #[instrument(skip(self, zone), fields(zone = %self.zone.id()))]
    async fn register(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
        zone: Option<ZoneHandle>,
    ) -> Result<(), RuntimeError> {
        if let Some(zone) = zone {
            if zone.id() != self.zone.id() {
                return Err(RuntimeError::ZoneMismatch {
                    expected: self.zone.id().to_string(),
                    actual: zone.id().to_string(),
                });
            }
        }

        self.zone.register(app_module_name, instance_names).await?;

        for name in instance_names {
            let key = name.to_lowercase();
            if !self.instance_names.iter().any(|n| n.to_lowercase() == key) {
                self.instance_names.push(name.clone());
            }
        }
        info!(module = app_module_name, "Application registered in zone");
        Ok(())
    }

    async fn serve(&self, request: RequestInput) -> Result<Response, RuntimeError> {
        let request = request.into_request()?;
        let payload = serde_json::to_string(&request)
            .map_err(|e| RuntimeError::malformed_request(format!("unserializable request: {e}")))?;

        let start = Instant::now();
        let reply = self
            .zone
            .execute(RUNTIME_MODULE, SERVE_FUNCTION, vec![payload])
            .await?;
        let response = ResponseHelper::parse(&reply)?;

        info!(
            zone = %self.zone.id(),
            application = %request.application,
            duration_ms = start.elapsed().as_millis(),
            "Remote request completed"
        );
        Ok(response)
    }

    fn application_instance_names(&self) -> &[String] {
        &self.instance_names
    }
}
