mod server;

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mock rewrite service for local testing of the extension.
#[derive(Debug, Parser)]
#[command(name = "rewrite-backend", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "REWRITE_BACKEND_PORT", default_value_t = 3000)]
    port: u16,
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(init_err) = init_logging() {
        eprintln!("logging bootstrap failed: {init_err}");
    }

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("test backend server running on http://{addr}");
    info!("POST /rewrite endpoint ready for testing");
    info!(
        "example request: curl -X POST http://{addr}/rewrite -H \"Content-Type: application/json\" -d '{{\"text\": \"Hello\", \"mode\": \"professional\"}}'"
    );

    axum::serve(listener, server::router())
        .await
        .context("rewrite backend stopped unexpectedly")?;
    Ok(())
}
