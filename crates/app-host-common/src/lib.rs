//! Common types, errors, and configuration for app-host.
//!
//! This crate provides shared functionality used across the app-host workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration documents and their schema validation
//! - The launcher configuration file

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{
    ApplicationConfig, ApplicationSettings, HostConfig, HostSettings, MetricConfig,
    MetricDefinition, MetricType, NamedObjectConfig, NamedObjectDefinition,
    ObjectContextDefinition, ObjectProviderConfig, ObjectProviderDefinition, ObjectTypeConfig,
    ObjectTypeDefinition,
};
pub use config_file::{ApplicationEntry, ConfigFile, ConfigFileError, ZoneEntry};
pub use error::{ObjectKind, RuntimeError, append_message_on_error};
