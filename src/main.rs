//! Layer-7 HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                   LOAD BALANCER                   │
//!                  │                                                   │
//!   Client ───────▶│  http::server ─▶ security::rate_limit (429)       │
//!                  │                      │                            │
//!                  │                      ▼                            │
//!                  │          load_balancer::Router::next (503)        │
//!                  │                      │                            │
//!                  │                      ▼                            │
//!   Client ◀───────│  http::forward ◀──── backend ◀────────────────────┼──── Backend
//!                  │                                                   │
//!                  │  background: health::HealthProber (mark failed / │
//!                  │  recovered), rate-limit idle sweeper             │
//!                  └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;

use l7_balancer::config::loader::load_config;
use l7_balancer::lifecycle::signals::spawn_signal_handler;
use l7_balancer::observability::{logging, metrics};
use l7_balancer::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "l7-balancer", version, about = "Layer-7 HTTP load balancer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging("info");
            tracing::error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability.log_level);

    if args.check {
        tracing::info!(path = %args.config.display(), "Configuration is valid");
        return ExitCode::SUCCESS;
    }

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Load balancer failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: l7_balancer::ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "l7-balancer starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;
    Ok(())
}
