//! fileport command-line client.
//!
//! Exit status: 0 on success, 2 when the server refused the request, 3 when
//! a local precondition failed, 1 for network and protocol failures.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fileport_client::{ClientConfig, ClientError, ErrorKind, FileClient};
use fileport_protocol::DEFAULT_PORT;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileport", version, about = "Fetch and store files on a fileport server")]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Local directory for downloads and uploads
    #[arg(short, long, default_value = "downloads")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file from the server
    Request { name: String },
    /// Replace a file that already exists on the server
    Update { name: String },
    /// Upload a file the server does not have yet
    Create { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = ClientConfig::new(&cli.host, cli.port, cli.dir).await?;
    tracing::debug!(addr = %config.addr, "server address resolved");
    let client = FileClient::new(config);

    match cli.command {
        Commands::Request { name } => {
            let dir = &client.config().local_dir;
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            let outcome = client.request(&name).await?;
            Ok(format!("{name}: {} bytes, sha256 {}", outcome.bytes, outcome.digest))
        }
        Commands::Update { name } => {
            let digest = client.update(&name).await?;
            Ok(format!("{name}: updated, sha256 {digest}"))
        }
        Commands::Create { name } => {
            let digest = client.create(&name).await?;
            Ok(format!("{name}: created, sha256 {digest}"))
        }
    }
}

fn exit_status(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<ClientError>().map(ClientError::kind) {
        Some(ErrorKind::Rejected) => 2,
        Some(ErrorKind::LocalPrecondition) => 3,
        Some(_) => 1,
        // Only local setup fails outside the client.
        None => 3,
    }
}
