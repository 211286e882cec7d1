// E2E test harness for Sable services

pub mod assertions;

use sable_common::{MachineFacts, Protocol, RuntimeOptions};
use sable_dev_registry::{DevRegistry, RegistryServer};
use sable_registry::ConsulClient;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

static LOGGING: Once = Once::new();

/// Installs a test log subscriber once per test binary (`RUST_LOG` applies).
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Development registry served on an ephemeral port for one test.
pub struct TestRegistry {
    url: Url,
    registry: Arc<DevRegistry>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TestRegistry {
    pub async fn start() -> Self {
        Self::start_with_token(None).await
    }

    pub async fn start_with_token(token: Option<&str>) -> Self {
        init_logging();
        let server = RegistryServer::bind("127.0.0.1:0", token.map(str::to_string))
            .await
            .expect("Failed to bind dev registry");
        let url = server.url().expect("Failed to read dev registry address");
        let registry = Arc::clone(server.registry());

        let cancel = CancellationToken::new();
        let handle = server.spawn(cancel.clone());

        Self {
            url,
            registry,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn registry(&self) -> &Arc<DevRegistry> {
        &self.registry
    }

    /// A Consul client pointed at this registry.
    pub fn client(&self) -> ConsulClient {
        ConsulClient::new(self.url.clone())
    }

    pub fn put(&self, key: &str, value: &str) -> u64 {
        self.registry.put(key, Some(value.as_bytes().to_vec()))
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind ephemeral port")
        .local_addr()
        .expect("Failed to read ephemeral port")
        .port()
}

/// Facts of a pretend machine reachable on loopback.
pub fn test_facts(pid: u32) -> MachineFacts {
    MachineFacts {
        hostname: "e2e-node".to_string(),
        ipv4: Some(Ipv4Addr::LOCALHOST),
        pid,
    }
}

pub fn test_runtime(port: u16) -> RuntimeOptions {
    RuntimeOptions {
        protocol: Protocol::Http,
        bind_interface: "127.0.0.1".to_string(),
        port,
        hostname: "e2e-node".to_string(),
        service_ip: "127.0.0.1".to_string(),
        pid: 4242,
        development: true,
    }
}

/// Polls `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
