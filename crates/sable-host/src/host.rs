//! Service host lifecycle.
//!
//! # Rust Learning Note
//!
//! ## One Token, Many Tasks
//!
//! Every background task (health server, registry layer watch, options
//! monitors, reconciliation) takes a clone of the host's
//! `CancellationToken`. Stopping the host is then a single `cancel()`
//! followed by awaiting the handles.
//!
//! ## Start Order
//!
//! 1. bind the health endpoints (the registry's checker will call them)
//! 2. register, and abort startup if that fails
//! 3. follow configuration changes
//!
//! Stopping first cancels the watchers (a reconcile stuck on the registry
//! gives up its lock), then deregisters, then cancels everything else.

use crate::options::HostOptions;
use crate::settings::{build_settings, Settings};
use sable_common::{
    AccessKeys, Error, InMemoryAccessKeys, MachineFacts, Result, RuntimeOptions, HEALTH_ACCESS_KEY, RUNTIME_SECTION,
};
use sable_config::OptionsMonitor;
use sable_health::{HealthContext, HealthServer, ManualHealthSwitch};
use sable_naming::{NamingService, NamingServiceOptions, ServiceSnapshot, NAMING_SECTION};
use sable_registry::{ConsulConnector, RegistryConnector};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long stopping waits for the registry to acknowledge deregistration.
pub const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// A service with its configuration bound, not yet serving.
pub struct ServiceHost {
    settings: Settings,
    runtime: Arc<OptionsMonitor<RuntimeOptions>>,
    naming: Arc<OptionsMonitor<NamingServiceOptions>>,
    naming_service: Arc<NamingService>,
    access_keys: Arc<dyn AccessKeys>,
    switch: Arc<ManualHealthSwitch>,
    cancel: CancellationToken,
}

impl ServiceHost {
    /// Builds the host for this machine, talking to a Consul agent.
    pub async fn build(options: HostOptions) -> Result<Self> {
        let facts = MachineFacts::detect();
        Self::build_with(options, facts, None).await
    }

    /// Builds the host from explicit facts; `connector` replaces the Consul
    /// connector when given.
    pub async fn build_with(
        options: HostOptions,
        facts: MachineFacts,
        connector: Option<Arc<dyn RegistryConnector>>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let settings = build_settings(&options, &facts, &cancel).await?;

        let runtime = Arc::new(OptionsMonitor::<RuntimeOptions>::bind(&settings.root, RUNTIME_SECTION)?);
        let naming = Arc::new(OptionsMonitor::<NamingServiceOptions>::bind(&settings.root, NAMING_SECTION)?);

        let connector: Arc<dyn RegistryConnector> = match connector {
            Some(connector) => connector,
            None => Arc::new(ConsulConnector::with_token(settings.registry.token.clone())),
        };
        let access_keys: Arc<dyn AccessKeys> = Arc::new(InMemoryAccessKeys::new());
        let snapshot = ServiceSnapshot::new(naming.current(), runtime.current());
        let naming_service = Arc::new(NamingService::new(connector, Arc::clone(&access_keys), snapshot)?);

        Ok(Self {
            settings,
            runtime,
            naming,
            naming_service,
            access_keys,
            switch: Arc::new(ManualHealthSwitch::new()),
            cancel,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn naming_service(&self) -> &Arc<NamingService> {
        &self.naming_service
    }

    pub fn health_switch(&self) -> &Arc<ManualHealthSwitch> {
        &self.switch
    }

    /// Key the `/health` endpoint requires.
    pub fn health_access_key(&self) -> String {
        self.access_keys.get_or_create(HEALTH_ACCESS_KEY)
    }

    /// Serves health, registers, and starts following configuration.
    ///
    /// A failed registration stops everything already started and returns
    /// the [`Error::FatalRegistration`].
    pub async fn start(self) -> Result<RunningHost> {
        let runtime = self.runtime.current();
        let naming = self.naming.current();
        info!(service = %naming.name, "Starting service host");

        let context = HealthContext::new(naming.name.clone(), Arc::clone(&self.switch));
        let server = HealthServer::bind(&runtime.bind_address(), context, self.health_access_key()).await?;
        let local_addr = server.local_addr()?;
        let server_task = tokio::spawn(server.serve(self.cancel.clone()));

        if let Err(e) = self.naming_service.register(&self.cancel).await {
            error!("Service host can't start: {}", e);
            self.cancel.cancel();
            let _ = server_task.await;
            return Err(e);
        }

        let root = Arc::clone(&self.settings.root);
        let watchers = self.cancel.child_token();
        let tasks = vec![
            self.runtime.watch(Arc::clone(&root), watchers.clone()),
            self.naming.watch(root, watchers.clone()),
            self.naming_service
                .watch_options(self.naming.subscribe(), self.runtime.subscribe(), watchers.clone()),
        ];

        info!(service = %naming.name, address = %local_addr, "Service host started");
        Ok(RunningHost {
            host: self,
            local_addr,
            server_task,
            watchers,
            tasks,
        })
    }

    /// Starts, waits for `shutdown`, then stops.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let running = self.start().await?;
        shutdown.await;
        running.stop().await
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A started host.
pub struct RunningHost {
    host: ServiceHost,
    local_addr: SocketAddr,
    server_task: JoinHandle<Result<()>>,
    watchers: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningHost {
    /// Where the health endpoints listen.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn host(&self) -> &ServiceHost {
        &self.host
    }

    /// Stops the watchers, deregisters (best effort), then stops every task.
    pub async fn stop(self) -> Result<()> {
        info!("Stopping service host");
        self.watchers.cancel();

        // The host token may already be cancelled; deregistration gets its own.
        let deregister = CancellationToken::new();
        match tokio::time::timeout(DEREGISTER_TIMEOUT, self.host.naming_service.deregister(&deregister)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Deregistration failed, the registry will expire the record: {}", e),
            Err(_) => {
                deregister.cancel();
                warn!("Deregistration timed out after {:?}", DEREGISTER_TIMEOUT);
            }
        }

        self.host.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        let served = self
            .server_task
            .await
            .map_err(|e| Error::Internal(format!("Health server task failed: {}", e)))?;

        info!("Service host stopped");
        served
    }
}
