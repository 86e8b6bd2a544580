//! Tenancy resource server
//!
//! Boots the configured applications and keeps their services mounted until
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! tenancy-server [--config <server.toml>] [--apps-dir <path>] [--app <id>]... [--discover]
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Control log verbosity (default: `tenancy=info`)

use std::path::PathBuf;

use clap::Parser;
use tenancy_core::{ApplicationSpec, Server, ServerConfig};

/// Multi-tenant resource server
#[derive(Parser)]
#[command(name = "tenancy-server")]
#[command(about = "Multi-tenant resource server")]
#[command(version)]
struct Args {
    /// Server configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per application
    #[arg(long)]
    apps_dir: Option<PathBuf>,

    /// Boot an application in addition to the configured ones
    #[arg(long = "app", value_name = "ID")]
    apps: Vec<String>,

    /// Also boot every application found in the applications directory
    #[arg(long)]
    discover: bool,
}

impl Args {
    fn server_config(&self) -> tenancy_core::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(dir) = &self.apps_dir {
            config = config.with_applications_dir(dir);
        }
        for id in &self.apps {
            if !config.applications.iter().any(|app| &app.id == id) {
                config.applications.push(ApplicationSpec {
                    id: id.clone(),
                    name: None,
                    directory: None,
                });
            }
        }
        if self.discover {
            let found = config.discover()?;
            config.applications.extend(found);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tenancy=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.server_config()?;
    let ids: Vec<String> = config.applications.iter().map(|app| app.id.clone()).collect();

    let server = Server::new(config)?;
    server.boot_configured()?;

    for id in &ids {
        match server.await_application_ready(id).await {
            Ok(app) => {
                tracing::info!(application = %id, name = %app.name(), "Application ready")
            }
            Err(e) => tracing::error!(application = %id, error = %e, "Application failed to start"),
        }
    }
    for path in server.registry().paths() {
        tracing::info!(path = %path, "Mounted");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    server.shutdown().await;
    Ok(())
}
