//! Request and response values exchanged with engines.
//!
//! Requests may arrive pre-parsed or as a JSON string ([`RequestInput`]).
//! Responses cross execution-zone boundaries as JSON strings and are read
//! back with [`ResponseHelper::parse`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use app_host_common::{NamedObjectDefinition, RuntimeError, append_message_on_error};

/// Suffix appended to JSON errors when a request string fails to parse.
pub const PARSE_FAILURE_NOTE: &str = ". Fail to parse request string.";

/// Inbound call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Target application instance name (case-insensitive).
    pub application: String,

    /// Named object of the application to invoke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,

    /// Input passed to the entry point.
    #[serde(default)]
    pub input: Value,

    /// Objects replacing the application's definitions for this request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub override_objects: Vec<NamedObjectDefinition>,

    #[serde(default)]
    pub control_flags: ControlFlags,
}

impl Request {
    /// Create a request for `entry_point` of `application`.
    pub fn new(application: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            entry_point: Some(entry_point.into()),
            input: Value::Null,
            override_objects: Vec::new(),
            control_flags: ControlFlags::default(),
        }
    }

    /// Set the entry point input.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Add a per-request object override.
    pub fn with_override(mut self, definition: NamedObjectDefinition) -> Self {
        self.override_objects.push(definition);
        self
    }

    /// Ask for debug information in the response.
    pub fn with_debug(mut self) -> Self {
        self.control_flags.debug = true;
        self
    }

    /// Lower-cased application name, used as the routing key.
    pub fn routing_key(&self) -> String {
        self.application.to_lowercase()
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFlags {
    /// Attach [`DebugInfo`] to the response.
    #[serde(default)]
    pub debug: bool,
}

/// A request as handed to `serve`: already structured or still a string.
#[derive(Debug, Clone)]
pub enum RequestInput {
    Raw(String),
    Parsed(Request),
}

impl RequestInput {
    /// Parse (if needed) and check the required `application` field.
    pub fn into_request(self) -> Result<Request, RuntimeError> {
        let request = match self {
            RequestInput::Parsed(request) => request,
            RequestInput::Raw(text) => {
                let value: Value =
                    append_message_on_error(PARSE_FAILURE_NOTE, || serde_json::from_str(&text))?;
                if value.get("application").is_none_or(Value::is_null) {
                    return Err(missing_application());
                }
                serde_json::from_value(value).map_err(|e| {
                    RuntimeError::malformed_request(format!("invalid request: {e}"))
                })?
            }
        };

        if request.application.is_empty() {
            return Err(missing_application());
        }
        Ok(request)
    }
}

impl From<String> for RequestInput {
    fn from(text: String) -> Self {
        RequestInput::Raw(text)
    }
}

impl From<&str> for RequestInput {
    fn from(text: &str) -> Self {
        RequestInput::Raw(text.to_string())
    }
}

impl From<Request> for RequestInput {
    fn from(request: Request) -> Self {
        RequestInput::Parsed(request)
    }
}

fn missing_application() -> RuntimeError {
    RuntimeError::malformed_request("Property 'application' is missing from request.")
}

/// Outcome code of a request. Absent on the wire means success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseCode {
    #[default]
    Success,
    InvalidRequest,
    NotFound,
    InternalError,
    ServiceUnavailable,
}

/// Outbound result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub response_code: ResponseCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl Response {
    /// A success response carrying `output`.
    pub fn success(output: Value) -> Self {
        Self {
            output: Some(output),
            ..Default::default()
        }
    }

    /// An error-coded response describing `error`.
    pub fn from_error(error: &RuntimeError) -> Self {
        let response_code = match error {
            RuntimeError::MalformedRequest { .. } => ResponseCode::InvalidRequest,
            RuntimeError::UnknownApplication { .. } | RuntimeError::UnresolvedObject { .. } => {
                ResponseCode::NotFound
            }
            RuntimeError::RemoteExecution { .. } => ResponseCode::ServiceUnavailable,
            _ => ResponseCode::InternalError,
        };
        Self {
            response_code,
            error_message: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.response_code == ResponseCode::Success
    }
}

/// Diagnostics attached when `controlFlags.debug` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub request_id: String,
    pub application: String,
    pub duration_ms: u64,
    pub stages: Vec<String>,
}

/// Helpers for responses received as strings.
pub struct ResponseHelper;

impl ResponseHelper {
    /// Parse a serialized response.
    pub fn parse(text: &str) -> Result<Response, RuntimeError> {
        serde_json::from_str(text)
            .map_err(|e| RuntimeError::remote_execution(format!("unparsable response: {e}")))
    }

    /// Serialize a response for crossing a zone boundary.
    pub fn serialize(response: &Response) -> Result<String, RuntimeError> {
        serde_json::to_string(response)
            .map_err(|e| RuntimeError::execution(format!("failed to serialize response: {e}")))
    }
}

/// Apply the `throwExceptionOnError` policy to a serve result.
pub fn settle(
    result: Result<Response, RuntimeError>,
    throw_exception_on_error: bool,
) -> Result<Response, RuntimeError> {
    match result {
        Err(error) if !throw_exception_on_error => Ok(Response::from_error(&error)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_string() {
        let input = RequestInput::from(r#"{"application": "Svc1", "entryPoint": "hello"}"#);
        let request = input.into_request().unwrap();

        assert_eq!(request.application, "Svc1");
        assert_eq!(request.entry_point.as_deref(), Some("hello"));
        assert_eq!(request.input, Value::Null);
        assert_eq!(request.routing_key(), "svc1");
    }

    #[test]
    fn test_parse_failure_keeps_original_error() {
        let err = RequestInput::from("not json").into_request().unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, RuntimeError::MalformedRequest { .. }));
        assert!(message.contains("expected"));
        assert!(message.ends_with(PARSE_FAILURE_NOTE));
    }

    #[test]
    fn test_missing_application() {
        let err = RequestInput::from(r#"{"entryPoint": "hello"}"#)
            .into_request()
            .unwrap_err();
        assert!(err.to_string().contains("'application' is missing"));

        let err = RequestInput::from(Request::new("", "hello"))
            .into_request()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MalformedRequest { .. }));
    }

    #[test]
    fn test_response_code_defaults_to_success() {
        let response = ResponseHelper::parse(r#"{"output": 3}"#).unwrap();

        assert!(response.is_success());
        assert_eq!(response.output, Some(json!(3)));
    }

    #[test]
    fn test_unparsable_response() {
        let err = ResponseHelper::parse("<html>").unwrap_err();
        assert!(matches!(err, RuntimeError::RemoteExecution { .. }));
    }

    #[test]
    fn test_response_from_error() {
        let response = Response::from_error(&RuntimeError::unknown_application("x"));

        assert_eq!(response.response_code, ResponseCode::NotFound);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "responseCode": "notFound",
                "errorMessage": "Application 'x' is not registered for serving"
            })
        );
    }

    #[test]
    fn test_settle() {
        let err = || Err(RuntimeError::malformed_request("bad"));

        assert!(settle(err(), true).is_err());
        let response = settle(err(), false).unwrap();
        assert_eq!(response.response_code, ResponseCode::InvalidRequest);
    }
}
