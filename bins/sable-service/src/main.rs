use anyhow::Result;
use clap::Parser;
use sable_host::{HostOptions, ServiceHost};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: sable.yaml in the working directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Development mode: advertise the loopback address
    #[arg(short = 'd', long = "dev")]
    development: bool,

    #[arg(short, long)]
    port: Option<u16>,

    /// Override a configuration key (repeatable), e.g. --set ns:name=orders
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.debug)?;

    info!("Starting Sable service");

    let options = HostOptions {
        config_file: args.config,
        development: args.development,
        port: args.port,
        overrides: args.overrides,
        ..HostOptions::from_process()
    };

    let host = match ServiceHost::build(options).await {
        Ok(host) => host,
        Err(e) => {
            error!("Failed to build service host: {}", e);
            return Err(anyhow::anyhow!("Configuration failed: {}", e));
        }
    };

    // Fatal registration ends up here and exits non-zero.
    host.run(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Service host failed: {}", e))?;

    info!("Sable service shut down successfully");
    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let (mut sigterm, mut sigint) = match (
            signal::unix::signal(signal::unix::SignalKind::terminate()),
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
