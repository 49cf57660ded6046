//! karma-server: HTTP surface for the behavior ledger.
//!
//! Serves the behavior feed, reward catalog and admin analytics over one
//! store. Caller identity is read from headers set by the upstream gateway.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use karma_node::{KarmaService, NodeConfig, StoreKind};

mod identity;
mod routes;

/// Karma ledger HTTP server.
#[derive(Parser, Debug)]
#[command(
    name = "karma-server",
    version,
    about = "Behavior ledger, karma scores and reward unlocking over HTTP"
)]
struct Args {
    /// TOML configuration file (values there yield to KARMA_* variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for the ledger database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,

    /// Keep all state in memory; nothing survives a restart
    #[arg(long)]
    memory: bool,
}

impl Args {
    /// Flags given on the command line win over the loaded configuration.
    fn apply(self, config: &mut NodeConfig) {
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if self.memory {
            config.store = StoreKind::Memory;
        }
    }
}

/// Shared application state passed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub service: KarmaService,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config =
        NodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.log_level, &config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        bind = %config.bind_addr,
        store = ?config.store,
        "Starting karma-server"
    );

    let service = KarmaService::open(&config).context("Failed to open the karma store")?;
    let app = routes::router(AppState { service });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("karma-server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, shutting down...");
    }
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str` when set.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
