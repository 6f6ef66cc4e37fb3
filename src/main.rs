use clap::Parser;
use std::path::PathBuf;
use throttle::{config::ThrottleConfig, init_tracing, run};
use tokio::signal;
use tracing::info;

/// Distributed rate limiting service
#[derive(Debug, Parser)]
#[command(name = "throttle", version, about)]
struct Cli {
    /// YAML config file; `THROTTLE__*` environment variables override it
    #[arg(short, long, env = "THROTTLE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ThrottleConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);

    run(config, shutdown_signal()).await?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
