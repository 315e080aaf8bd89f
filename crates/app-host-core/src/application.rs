//! Loaded applications.

use std::collections::HashMap;

use tracing::info;

use app_host_common::{ApplicationSettings, MetricDefinition, RuntimeError};

use crate::object_context::ScopedObjectContext;
use crate::pipeline::Pipeline;

/// A validated application bound to its own object context.
///
/// The context is always a child of the owning engine's global context.
pub struct Application {
    settings: ApplicationSettings,
    object_context: ScopedObjectContext,
    pipeline: Pipeline,
    metrics: HashMap<String, MetricDefinition>,
}

impl Application {
    /// Build an application under `parent`.
    ///
    /// The execution stack is resolved before the object context is
    /// created.
    pub fn new(
        parent: &ScopedObjectContext,
        settings: ApplicationSettings,
    ) -> Result<Self, RuntimeError> {
        let pipeline = Pipeline::from_stage_names(&settings.default_execution_stack, parent.modules())?;
        let object_context =
            parent.create_child(settings.id.clone(), &settings.base_dir, &settings.object_context)?;

        let metrics = settings
            .metrics
            .iter()
            .map(|m| (m.name.clone(), m.clone()))
            .collect();

        info!(
            application = %settings.id,
            stages = ?pipeline.stage_names(),
            objects = settings.object_context.objects.len(),
            "Application loaded"
        );

        Ok(Self {
            settings,
            object_context,
            pipeline,
            metrics,
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &ApplicationSettings {
        &self.settings
    }

    pub fn object_context(&self) -> &ScopedObjectContext {
        &self.object_context
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Look up a metric definition by name.
    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.get(name)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.settings.id)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
