//! app-host CLI entry point.
//!
//! Loads a launcher TOML file, spawns the execution zones it lists,
//! registers its applications on an engine hub and then serves
//! newline-delimited JSON requests from stdin, writing one JSON response
//! per line to stdout. Logs go to stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use app_host_builtins::{install_definitions, with_builtins};
use app_host_common::{ConfigFile, HostConfig, HostSettings};
use app_host_core::{Engine, EngineHub, Response, WorkerZone, ZoneHandle};

/// Config-driven application host.
#[derive(Parser, Debug)]
#[command(name = "app-host")]
#[command(version, about, long_about = None)]
struct Args {
    /// Launcher configuration file
    #[arg(short, long, env = "APP_HOST_CONFIG", default_value = "app-host.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(config = %args.config.display(), "Starting app-host");

    let config = ConfigFile::from_file(&args.config)?;
    let base_dir = args
        .config
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let settings = load_host_settings(&base_dir, config.host_config.as_deref())?;
    let modules = Arc::new(with_builtins()?);

    let mut zones: HashMap<String, ZoneHandle> = HashMap::new();
    for entry in &config.zones {
        let zone_settings = match &entry.host_config {
            Some(path) => load_host_settings(&base_dir, Some(path.as_str()))?,
            None => settings.clone(),
        };
        let zone = WorkerZone::spawn(
            entry.id.clone(),
            zone_settings,
            Arc::clone(&modules),
            entry.queue_capacity,
        )
        .with_context(|| format!("Failed to start zone '{}'", entry.id))?;
        zones.insert(entry.id.clone(), Arc::new(zone));
    }

    let mut hub = EngineHub::new(settings, modules);
    for entry in &config.applications {
        let zone = match &entry.zone {
            Some(id) => Some(zones.get(id).cloned().with_context(|| {
                format!("Application '{}' refers to unknown zone '{id}'", entry.module)
            })?),
            None => None,
        };
        hub.register(&entry.module, &entry.instances, zone)
            .await
            .with_context(|| format!("Failed to register application '{}'", entry.module))?;
    }

    info!(
        instances = ?hub.application_instance_names(),
        zones = zones.len(),
        "Ready. Reading requests from stdin"
    );

    serve_lines(&hub).await?;

    info!("Input closed, shutting down");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,app_host=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Host settings from `path` (relative to `base_dir`), or defaults rooted
/// at `base_dir`, seeded with the built-in definitions.
fn load_host_settings(base_dir: &Path, path: Option<&str>) -> anyhow::Result<HostSettings> {
    let mut settings = match path {
        Some(path) => {
            let path = base_dir.join(path);
            HostConfig::from_file(&path)
                .with_context(|| format!("Failed to load host config '{}'", path.display()))?
        }
        None => HostSettings {
            base_dir: base_dir.to_path_buf(),
            ..Default::default()
        },
    };
    install_definitions(&mut settings);
    Ok(settings)
}

async fn serve_lines(hub: &EngineHub) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match hub.serve(line.into()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                Response::from_error(&e)
            }
        };

        let mut output = serde_json::to_string(&response)?;
        output.push('\n');
        stdout.write_all(output.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
