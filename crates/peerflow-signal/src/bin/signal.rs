//! PeerFlow Signal Server
//!
//! WebSocket rendezvous server for peer discovery and WebRTC signaling.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8000, any origin)
//! peerflow-signal
//!
//! # Production: enforce the origin allowlist
//! ENV=production PORT=8080 peerflow-signal --config /etc/peerflow/config.toml
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peerflow_signal::{Config, SignalServer};

#[derive(Parser, Debug)]
#[command(name = "peerflow-signal")]
#[command(about = "PeerFlow signaling server for peer discovery")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<std::net::IpAddr>,

    /// Deployment environment; `production` enforces the origin allowlist
    #[arg(long, env = "ENV", default_value = "development")]
    env: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    if args.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if args.env == "production" {
        config.signal.enforce_origin = true;
    }

    info!("Starting PeerFlow Signal Server ({})", args.env);
    info!(
        "Peers expire after {}s, sweep every {}s",
        config.signal.peer_timeout_secs, config.signal.sweep_interval_secs
    );
    if config.signal.enforce_origin {
        info!("Allowed origins: {:?}", config.signal.allowed_origins);
    }

    let server = SignalServer::bind(config).await?;
    server.serve().await?;

    Ok(())
}
