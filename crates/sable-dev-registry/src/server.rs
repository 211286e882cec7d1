//! Development registry server.
//!
//! # Rust Learning Note
//!
//! ## Port 0
//!
//! Binding `127.0.0.1:0` lets the OS pick a free port. Tests bind that way,
//! read the real address back with `local_addr()`, and point their clients at
//! it, so parallel tests never fight over a fixed port.

use crate::api::create_router;
use crate::storage::DevRegistry;
use axum::Router;
use sable_common::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

/// Development registry bound to a TCP socket.
pub struct RegistryServer {
    registry: Arc<DevRegistry>,
    listener: TcpListener,
    router: Router,
}

impl RegistryServer {
    /// Binds `addr` with a fresh, empty registry.
    pub async fn bind(addr: &str, token: Option<String>) -> Result<Self> {
        Self::bind_with(addr, Arc::new(DevRegistry::new()), token).await
    }

    /// Binds `addr` serving an existing registry.
    pub async fn bind_with(addr: &str, registry: Arc<DevRegistry>, token: Option<String>) -> Result<Self> {
        info!("Binding to TCP: {}", addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::from(e).context(format!("Failed to bind {}", addr)))?;
        let router = create_router(Arc::clone(&registry), token);

        Ok(Self {
            registry,
            listener,
            router,
        })
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Arc<DevRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Base URL clients should use, e.g. `http://127.0.0.1:8500`.
    pub fn url(&self) -> Result<Url> {
        let addr = self.local_addr()?;
        Url::parse(&format!("http://{}", addr)).map_err(|e| Error::Internal(format!("Invalid server URL: {}", e)))
    }

    /// Serves until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Server listening on {}", addr);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Server on {} stopped", addr);
        Ok(())
    }

    /// Runs the server on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(cancel).await {
                error!("Registry server failed: {}", e);
            }
        })
    }
}
