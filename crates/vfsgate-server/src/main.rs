//! vfsgate server binary
//!
//! ## Usage
//!
//! ```bash
//! # Built-in defaults (osjs + home mounts, no users)
//! vfsgate
//!
//! # With a config file and a listener override
//! vfsgate --config config/vfsgate.toml --listen 0.0.0.0:8000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vfsgate_core::{Gateway, WatchChange};
use vfsgate_server::{AppState, ServerConfig, create_router};

#[derive(Debug, Parser)]
#[command(name = "vfsgate", version, about = "Virtual filesystem gateway over HTTP")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if config.users.is_empty() {
        tracing::warn!("no users configured; every /vfs request will be rejected");
    }

    let gateway = Arc::new(Gateway::new(&config.vfs).context("failed to build VFS gateway")?);

    // Handles must outlive the server or the watchers stop.
    let _watchers = gateway.watch(Arc::new(|change: WatchChange| {
        tracing::info!(
            mount = %change.mount,
            target = %change.target,
            kind = %change.kind,
            "vfs change"
        );
    }));

    let app = create_router(AppState::new(Arc::clone(&gateway), &config));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(addr = %config.listen, "vfsgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("vfsgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
    }
}
