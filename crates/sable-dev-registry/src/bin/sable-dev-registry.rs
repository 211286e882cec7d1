//! Standalone development registry.
//!
//! # Rust Learning Note
//!
//! A crate can hold a library (`src/lib.rs`) and binaries (`src/bin/*.rs`)
//! side by side; the binary is just another client of the library.
//!
//! Build with: `cargo build --bin sable-dev-registry`

use clap::Parser;
use sable_dev_registry::RegistryServer;
use tokio_util::sync::CancellationToken;

/// In-memory Consul-compatible registry for local development.
#[derive(Parser, Debug)]
#[command(name = "sable-dev-registry", version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8500")]
    listen: String,

    /// Require this ACL token in X-Consul-Token
    #[arg(long, env = "SABLE_DEV_REGISTRY_TOKEN")]
    token: Option<String>,

    /// Seed a key before serving (repeatable): --put key=value
    #[arg(long = "put", value_name = "KEY=VALUE")]
    seeds: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let server = RegistryServer::bind(&args.listen, args.token).await?;
    for seed in &args.seeds {
        let (key, value) = seed
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Seed must be KEY=VALUE: {}", seed))?;
        server.registry().put(key.trim(), Some(value.as_bytes().to_vec()));
    }

    tracing::info!("Sable dev registry starting on {}", server.url()?);
    tracing::info!("Press Ctrl+C to stop");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        shutdown.cancel();
    });

    server.run(cancel).await?;
    Ok(())
}
