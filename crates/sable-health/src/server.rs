//! Health endpoint server.
//!
//! # Rust Learning Note
//!
//! ## Bind First, Serve Later
//!
//! Binding the `TcpListener` before spawning the serve loop means the caller
//! learns the real port (useful with port `0`) and sees bind errors as a
//! plain `Result` instead of a failed background task.
//!
//! ## Graceful Shutdown
//!
//! ```rust,ignore
//! axum::serve(listener, router)
//!     .with_graceful_shutdown(async move { cancel.cancelled().await })
//!     .await?;
//! ```
//!
//! In-flight requests finish; new connections are refused.

use crate::api::{create_router, HealthContext};
use axum::Router;
use sable_common::{Error, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Health server bound to a socket but not serving yet.
pub struct HealthServer {
    listener: TcpListener,
    router: Router,
}

impl HealthServer {
    /// Binds `addr` and prepares the health router.
    pub async fn bind(addr: &str, context: HealthContext, access_key: impl Into<String>) -> Result<Self> {
        info!("Binding health endpoints to {}", addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::from(e).context(format!("Failed to bind {}", addr)))?;

        Ok(Self {
            listener,
            router: create_router(context, access_key),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Health endpoints listening on {}", addr);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Health endpoints on {} stopped", addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::ManualHealthSwitch;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let context = HealthContext::new("orders", Arc::new(ManualHealthSwitch::new()));
        let server = HealthServer::bind("127.0.0.1:0", context, "secret").await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(cancel.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("pong"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let context = HealthContext::new("orders", Arc::new(ManualHealthSwitch::new()));
        let first = HealthServer::bind("127.0.0.1:0", context.clone(), "k").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        assert!(HealthServer::bind(&addr, context, "k").await.is_err());
    }
}
