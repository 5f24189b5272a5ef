//! fileportd entry point.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fileport_server::{FileServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileportd", version, about = "Serve a directory over the fileport protocol")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,
    /// Directory holding the served files
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Connections handled at once; further clients wait
    #[arg(short = 'n', long)]
    max_connections: Option<usize>,
}

impl Cli {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(root) = self.root {
            config.storage_root = root;
        }
        if let Some(n) = self.max_connections {
            config.max_connections = n;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting fileportd");

    let cli = Cli::parse();
    let config = config::load(&cli.config)?;
    let config = cli.apply(config);

    let server = FileServer::bind(config.clone())
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    let server = Arc::new(server);
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!("cannot listen for Ctrl-C: {e}"),
        }
        signal_server.shutdown();
    });

    server.run().await.context("server failed")?;
    tracing::info!("fileportd stopped");
    Ok(())
}
