//! Application serving runtime for app-host.
//!
//! This crate turns validated configuration into running applications:
//! - [`EngineHub`]: routes requests to the engine an instance is bound to
//! - [`LocalEngine`] / [`RemoteEngine`]: in-process and zone-backed engines
//! - [`ScopedObjectContext`]: hierarchical named-object resolution
//! - [`Application`]: settings, object context and execution pipeline
//! - [`ModuleRegistry`]: symbols that definitions refer to by name
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      EngineHub                          │
//! │  (Instance name -> engine, case-insensitive)            │
//! └─────────────────────────────────────────────────────────┘
//!              │                              │
//!              ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │       LocalEngine        │   │  RemoteEngine (per zone) │
//! │  - Global object context │   │  - JSON over a zone      │
//! │  - Applications by name  │   │                          │
//! └──────────────────────────┘   └──────────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Application                         │
//! │  - Child object context of the global context           │
//! │  - Pipeline of interceptor stages                       │
//! └─────────────────────────────────────────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   RequestContext                        │
//! │  (Per-request: id, overrides, timing)                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod application;
pub mod engine;
pub mod hub;
pub mod object;
pub mod object_context;
pub mod pipeline;
pub mod registry;
pub mod wire;
pub mod zone;

pub use application::Application;
pub use engine::{Engine, LocalEngine, RemoteEngine, ZoneHandle};
pub use hub::EngineHub;
pub use object::Object;
pub use object_context::{ContextId, ScopedObjectContext, TYPE_TAG};
pub use pipeline::{EntryPoint, FnEntryPoint, Interceptor, Next, Pipeline, RequestContext};
pub use registry::{
    FnConstructor, FnProvider, ModuleRegistry, ObjectConstructor, ObjectProvider,
    ProviderRegistry, Registry, Symbol, TypeRegistry,
};
pub use wire::{
    ControlFlags, DebugInfo, Request, RequestInput, Response, ResponseCode, ResponseHelper,
    settle,
};
pub use zone::{DEFAULT_QUEUE_CAPACITY, ExecutionZone, RUNTIME_MODULE, SERVE_FUNCTION, WorkerZone};
