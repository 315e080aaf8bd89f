//! Error types for the app-host runtime.
//!
//! This module defines the error type shared by every crate in the workspace:
//! - [`RuntimeError`]: Registration, resolution and serving failures
//! - [`ObjectKind`]: What kind of name failed to resolve

use std::fmt;

use thiserror::Error;

/// Kind of symbol looked up through a scoped object context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A named object definition.
    Object,
    /// An object type (the `_type` tag of a value).
    Type,
    /// A URI protocol served by an object provider.
    Protocol,
    /// A `moduleName`/`functionName` symbol in the module registry.
    Symbol,
    /// A pipeline stage (interceptor) name.
    Stage,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Object => write!(f, "object"),
            ObjectKind::Type => write!(f, "type"),
            ObjectKind::Protocol => write!(f, "protocol"),
            ObjectKind::Symbol => write!(f, "symbol"),
            ObjectKind::Stage => write!(f, "stage"),
        }
    }
}

/// Top-level runtime errors.
///
/// Configuration and registration errors are returned directly from
/// `register`; everything else surfaces from `serve`.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The request could not be parsed or lacks a required field.
    #[error("Malformed request: {reason}")]
    MalformedRequest {
        /// Description of what is wrong with the request.
        reason: String,
    },

    /// No engine or application is registered under the requested name.
    #[error("Application '{name}' is not registered for serving")]
    UnknownApplication {
        /// The application instance name as given by the caller.
        name: String,
    },

    /// The instance name is already bound to a different application.
    #[error("Already registered with application name: '{name}'")]
    DuplicateRegistration {
        /// The conflicting instance name.
        name: String,
    },

    /// An engine was asked to work with a zone it was not built for.
    #[error("Zone mismatch: engine is bound to zone '{expected}', got '{actual}'")]
    ZoneMismatch {
        /// Zone the engine was constructed with (`local` for local engines).
        expected: String,
        /// Zone passed by the caller.
        actual: String,
    },

    /// A configuration document failed validation.
    #[error("Invalid configuration: {reason}")]
    ConfigValidation {
        /// Description of the validation failure.
        reason: String,
    },

    /// A name was not found anywhere up the context chain.
    #[error("Unresolved {kind}: '{name}'")]
    UnresolvedObject {
        /// What kind of name was looked up.
        kind: ObjectKind,
        /// The name that could not be resolved.
        name: String,
    },

    /// A type constructor or object provider failed.
    #[error("Failed to construct object '{name}': {reason}")]
    ObjectConstruction {
        /// The object, type or URI being constructed.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// A pipeline stage or entry point failed.
    #[error("Execution failed: {reason}")]
    Execution {
        /// Description of the failure.
        reason: String,
    },

    /// An execution zone call was rejected or returned unparsable data.
    #[error("Remote execution failed: {reason}")]
    RemoteExecution {
        /// Description of the failure.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `MalformedRequest` error.
    pub fn malformed_request(reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            reason: reason.into(),
        }
    }

    /// Create a new `UnknownApplication` error.
    pub fn unknown_application(name: impl Into<String>) -> Self {
        Self::UnknownApplication { name: name.into() }
    }

    /// Create a new `DuplicateRegistration` error.
    pub fn duplicate_registration(name: impl Into<String>) -> Self {
        Self::DuplicateRegistration { name: name.into() }
    }

    /// Create a new `ConfigValidation` error.
    pub fn config_validation(reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            reason: reason.into(),
        }
    }

    /// Create a new `UnresolvedObject` error.
    pub fn unresolved(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::UnresolvedObject {
            kind,
            name: name.into(),
        }
    }

    /// Create a new `ObjectConstruction` error.
    pub fn object_construction(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ObjectConstruction {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Execution` error.
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Create a new `RemoteExecution` error.
    pub fn remote_execution(reason: impl Into<String>) -> Self {
        Self::RemoteExecution {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates a name was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownApplication { .. } | Self::UnresolvedObject { .. }
        )
    }
}

/// Run `f`, appending `suffix` to the message of any error it returns.
///
/// The original error text is kept in front so callers see both the
/// underlying failure and where it happened.
pub fn append_message_on_error<T, E, F>(suffix: &str, f: F) -> Result<T, RuntimeError>
where
    E: fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    f().map_err(|e| RuntimeError::malformed_request(format!("{e}{suffix}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::unknown_application("Svc1");
        assert_eq!(
            err.to_string(),
            "Application 'Svc1' is not registered for serving"
        );

        let err = RuntimeError::unresolved(ObjectKind::Protocol, "redis");
        assert_eq!(err.to_string(), "Unresolved protocol: 'redis'");
    }

    #[test]
    fn test_is_not_found() {
        assert!(RuntimeError::unknown_application("a").is_not_found());
        assert!(RuntimeError::unresolved(ObjectKind::Object, "x").is_not_found());
        assert!(!RuntimeError::duplicate_registration("a").is_not_found());
    }

    #[test]
    fn test_append_message_on_error() {
        let result: Result<serde_json::Value, _> = append_message_on_error(
            ". Fail to parse request string.",
            || serde_json::from_str::<serde_json::Value>("not json"),
        );

        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("Malformed request: expected"));
        assert!(message.ends_with(". Fail to parse request string."));
    }
}
