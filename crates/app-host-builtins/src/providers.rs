//! Built-in URI object providers.
//!
//! - `env://NAME`: value of an environment variable, as a string
//! - `file:///abs/path` or `file://dir/rel/path`: file contents, relative
//!   paths resolved against the defining scope's base directory; `.json`
//!   files are parsed, anything else is returned as a string
//! - `http://..` / `https://..`: response body of a GET request, parsed
//!   when the server reports a JSON content type
//!
//! Provider-backed objects are fetched on every resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;
use url::Url;

use app_host_common::RuntimeError;
use app_host_core::{Object, ObjectProvider, ScopedObjectContext};

/// Environment variable provider.
pub struct EnvProvider;

#[async_trait]
impl ObjectProvider for EnvProvider {
    async fn provide(
        &self,
        uri: &Url,
        _context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        let name = match uri.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => uri.path().trim_start_matches('/').to_string(),
        };
        if name.is_empty() {
            return Err(RuntimeError::object_construction(
                uri.as_str(),
                "missing variable name",
            ));
        }

        let value = std::env::var(&name)
            .map_err(|e| RuntimeError::object_construction(uri.as_str(), format!("{name}: {e}")))?;
        Ok(Object::from_json(Value::String(value)))
    }
}

/// Local file provider.
pub struct FileProvider;

impl FileProvider {
    fn path(uri: &Url, base_dir: &Path) -> Result<PathBuf, RuntimeError> {
        match uri.host_str() {
            None | Some("" | "localhost") => uri.to_file_path().map_err(|()| {
                RuntimeError::object_construction(uri.as_str(), "not a local file path")
            }),
            Some(host) => Ok(base_dir
                .join(host)
                .join(uri.path().trim_start_matches('/'))),
        }
    }
}

#[async_trait]
impl ObjectProvider for FileProvider {
    async fn provide(
        &self,
        uri: &Url,
        context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        let path = Self::path(uri, &context.base_dir())?;
        debug!(path = %path.display(), "Reading file object");

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            RuntimeError::object_construction(
                uri.as_str(),
                format!("failed to read '{}': {e}", path.display()),
            )
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let value = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                RuntimeError::object_construction(uri.as_str(), format!("invalid JSON: {e}"))
            })?
        } else {
            Value::String(content)
        };
        Ok(Object::from_json(value))
    }
}

/// HTTP(S) provider backed by a shared, connection-pooled client.
pub struct HttpProvider {
    client: Client,
}

impl HttpProvider {
    /// Create a provider with default timeouts.
    pub fn new() -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("app-host/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                RuntimeError::config_validation(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectProvider for HttpProvider {
    async fn provide(
        &self,
        uri: &Url,
        _context: &ScopedObjectContext,
    ) -> Result<Object, RuntimeError> {
        debug!(uri = %uri, "Fetching object");
        let fail = |e: reqwest::Error| RuntimeError::object_construction(uri.as_str(), e.to_string());

        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fail)?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        let value = if is_json {
            response.json::<Value>().await.map_err(fail)?
        } else {
            Value::String(response.text().await.map_err(fail)?)
        };
        Ok(Object::from_json(value))
    }
}
