//! Built-in capabilities for app-host.
//!
//! Configuration refers to code by `moduleName`/`functionName`; this crate
//! supplies the symbols every host ships with, under the
//! [`BUILTIN_MODULE`] module name:
//!
//! - [`stages`]: `executeEntryPoint`, `finalizeResponse` and `logRequest`
//!   pipeline stages
//! - [`types`]: the `EntryPoint` object type
//! - [`providers`]: `env://`, `file://` and `http(s)://` object providers
//! - [`entry_points`]: small entry points useful for smoke tests
//!
//! [`linker::register_all`] installs them into a
//! [`ModuleRegistry`](app_host_core::ModuleRegistry) and
//! [`linker::builtin_definitions`] returns the matching type and provider
//! definitions to seed a host's global context with.

pub mod entry_points;
pub mod linker;
pub mod providers;
pub mod stages;
pub mod types;

pub use linker::{builtin_definitions, install_definitions, register_all, with_builtins};
pub use providers::{EnvProvider, FileProvider, HttpProvider};
pub use stages::{ExecuteEntryPoint, FinalizeResponse, LogRequest};
pub use types::{ENTRY_POINT_TYPE, EntryPointConstructor, EntryPointRef};

/// Module name the built-in symbols are registered under.
pub const BUILTIN_MODULE: &str = "app-host";
