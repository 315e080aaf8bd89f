//! Engine hub: the single front door for registration and serving.
//!
//! The hub owns at most one [`LocalEngine`] and one [`RemoteEngine`] per
//! zone, and routes each request to the engine its application instance
//! was registered with.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use app_host_common::{HostSettings, RuntimeError};

use crate::engine::{Engine, LocalEngine, RemoteEngine, ZoneHandle};
use crate::registry::ModuleRegistry;
use crate::wire::{RequestInput, Response, settle};

/// Which engine an instance name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineKey {
    Local,
    Remote(String),
}

/// Routes requests across local and remote engines.
pub struct EngineHub {
    settings: HostSettings,
    modules: Arc<ModuleRegistry>,
    local: Option<LocalEngine>,
    /// Zone id to engine.
    remotes: HashMap<String, RemoteEngine>,
    /// Lower-cased instance name to engine.
    engine_map: HashMap<String, EngineKey>,
    instance_names: Vec<String>,
}

impl EngineHub {
    /// Create a hub. Engines are created on first registration.
    pub fn new(settings: HostSettings, modules: Arc<ModuleRegistry>) -> Self {
        Self {
            settings,
            modules,
            local: None,
            remotes: HashMap::new(),
            engine_map: HashMap::new(),
            instance_names: Vec::new(),
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// The local engine, if anything was registered locally.
    pub fn local_engine(&self) -> Option<&LocalEngine> {
        self.local.as_ref()
    }

    /// The remote engine of zone `zone_id`, if any.
    pub fn remote_engine(&self, zone_id: &str) -> Option<&RemoteEngine> {
        self.remotes.get(zone_id)
    }

    /// Number of engines created so far.
    pub fn engine_count(&self) -> usize {
        usize::from(self.local.is_some()) + self.remotes.len()
    }

    /// Fail if any name is already bound to an engine other than `key`.
    fn check_names(&self, instance_names: &[String], key: &EngineKey) -> Result<(), RuntimeError> {
        for name in instance_names {
            match self.engine_map.get(&name.to_lowercase()) {
                Some(bound) if bound != key => {
                    return Err(RuntimeError::duplicate_registration(name.as_str()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn publish(&mut self, instance_names: &[String], key: &EngineKey) {
        for name in instance_names {
            let lower = name.to_lowercase();
            if !self.engine_map.contains_key(&lower) {
                self.engine_map.insert(lower, key.clone());
                self.instance_names.push(name.clone());
            }
        }
    }

    async fn register_local(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
    ) -> Result<(), RuntimeError> {
        let mut engine = match self.local.take() {
            Some(engine) => engine,
            None => {
                debug!("Creating local engine");
                LocalEngine::new(self.settings.clone(), Arc::clone(&self.modules))?
            }
        };
        let result = engine.register(app_module_name, instance_names, None).await;
        self.local = Some(engine);
        result
    }

    async fn register_remote(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
        zone: ZoneHandle,
    ) -> Result<(), RuntimeError> {
        let engine = self
            .remotes
            .entry(zone.id().to_string())
            .or_insert_with(|| {
                debug!(zone = %zone.id(), "Creating remote engine");
                RemoteEngine::new(Arc::clone(&zone))
            });
        engine
            .register(app_module_name, instance_names, Some(zone))
            .await
    }
}

#[async_trait]
impl Engine for EngineHub {
    #[instrument(skip(self, zone), fields(zone = zone.as_ref().map(|z| z.id())))]
    async fn register(
        &mut self,
        app_module_name: &str,
        instance_names: &[String],
        zone: Option<ZoneHandle>,
    ) -> Result<(), RuntimeError> {
        let key = match &zone {
            Some(zone) => EngineKey::Remote(zone.id().to_string()),
            None => EngineKey::Local,
        };
        self.check_names(instance_names, &key)?;

        match zone {
            Some(zone) => {
                self.register_remote(app_module_name, instance_names, zone)
                    .await?
            }
            None => self.register_local(app_module_name, instance_names).await?,
        }

        self.publish(instance_names, &key);
        info!(module = app_module_name, engine = ?key, "Instances published");
        Ok(())
    }

    async fn serve(&self, request: RequestInput) -> Result<Response, RuntimeError> {
        let throw = self.settings.throw_exception_on_error;
        let request = match request.into_request() {
            Ok(request) => request,
            Err(e) => return settle(Err(e), throw),
        };

        let key = self.engine_map.get(&request.routing_key());
        match key {
            Some(EngineKey::Local) => match &self.local {
                Some(engine) => engine.serve(request.into()).await,
                None => settle(Err(RuntimeError::unknown_application(request.application)), throw),
            },
            Some(EngineKey::Remote(zone_id)) => match self.remotes.get(zone_id) {
                Some(engine) => settle(engine.serve(request.into()).await, throw),
                None => settle(Err(RuntimeError::unknown_application(request.application)), throw),
            },
            None => settle(Err(RuntimeError::unknown_application(request.application)), throw),
        }
    }

    fn application_instance_names(&self) -> &[String] {
        &self.instance_names
    }
}

impl std::fmt::Debug for EngineHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHub")
            .field("instance_names", &self.instance_names)
            .field("zones", &self.remotes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use serde_json::json;

    use crate::wire::{Request, ResponseCode};
    use crate::zone::ExecutionZone;

    /// Zone that accepts every registration and echoes the application.
    struct EchoZone {
        id: &'static str,
        registered: Mutex<Vec<String>>,
    }

    impl EchoZone {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                registered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExecutionZone for EchoZone {
        fn id(&self) -> &str {
            self.id
        }

        async fn register(
            &self,
            app_module_name: &str,
            _instance_names: &[String],
        ) -> Result<(), RuntimeError> {
            self.registered.lock().push(app_module_name.to_string());
            Ok(())
        }

        async fn execute(
            &self,
            _module: &str,
            _function: &str,
            args: Vec<String>,
        ) -> Result<String, RuntimeError> {
            let request: Request = serde_json::from_str(&args[0]).unwrap();
            Ok(json!({"output": {"zone": self.id, "application": request.application}}).to_string())
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn hub() -> EngineHub {
        EngineHub::new(HostSettings::default(), Arc::new(ModuleRegistry::new()))
    }

    #[tokio::test]
    async fn test_engines_created_lazily() {
        let mut hub = hub();
        assert_eq!(hub.engine_count(), 0);

        hub.register("example", &names(&["a"]), Some(EchoZone::new("z1")))
            .await
            .unwrap();

        assert_eq!(hub.engine_count(), 1);
        assert!(hub.local_engine().is_none());
        assert!(hub.remote_engine("z1").is_some());
    }

    #[tokio::test]
    async fn test_routes_to_registered_zone() {
        let mut hub = hub();
        let z1 = EchoZone::new("z1");
        let z2 = EchoZone::new("z2");
        hub.register("first", &names(&["One"]), Some(z1.clone()))
            .await
            .unwrap();
        hub.register("second", &names(&["Two"]), Some(z2.clone()))
            .await
            .unwrap();

        let response = hub.serve(Request::new("TWO", "x").into()).await.unwrap();

        assert_eq!(
            response.output,
            Some(json!({"zone": "z2", "application": "TWO"}))
        );
        assert_eq!(hub.application_instance_names(), ["One", "Two"]);
        assert_eq!(*z1.registered.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_name_bound_to_other_engine_is_duplicate() {
        let mut hub = hub();
        let z1 = EchoZone::new("z1");
        let z2 = EchoZone::new("z2");
        hub.register("first", &names(&["shared"]), Some(z1))
            .await
            .unwrap();

        let err = hub
            .register("second", &names(&["SHARED"]), Some(z2.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::DuplicateRegistration { .. }));
        assert!(z2.registered.lock().is_empty());
        assert!(hub.remote_engine("z2").is_none());
    }

    #[tokio::test]
    async fn test_failed_local_registration_publishes_nothing() {
        let mut hub = hub();

        let err = hub
            .register("missing-module", &names(&["a"]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::ConfigValidation { .. }));
        assert!(hub.application_instance_names().is_empty());
        assert!(hub.local_engine().is_some());
    }

    #[tokio::test]
    async fn test_serve_errors() {
        let hub = hub();

        let err = hub.serve("not json".into()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::MalformedRequest { .. }));

        let err = hub.serve(Request::new("ghost", "x").into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_serve_errors_as_responses() {
        let settings = HostSettings {
            throw_exception_on_error: false,
            ..Default::default()
        };
        let hub = EngineHub::new(settings, Arc::new(ModuleRegistry::new()));

        let response = hub.serve("not json".into()).await.unwrap();
        assert_eq!(response.response_code, ResponseCode::InvalidRequest);

        let response = hub.serve(Request::new("ghost", "x").into()).await.unwrap();
        assert_eq!(response.response_code, ResponseCode::NotFound);
    }
}
