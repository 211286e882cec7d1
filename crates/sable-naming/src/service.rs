//! The naming service: one registration per process, kept in line with options.
//!
//! # Rust Learning Note
//!
//! All registry writes go through one `tokio::sync::Mutex<RegistrationState>`.
//! The state owns the client handle, so nothing outside the lock can talk to
//! the registry on this service's behalf:
//!
//! ```text
//! register()   ─┐
//! deregister() ─┼─> lock ─> RegistrationState { current, client, phase }
//! reconcile()  ─┘
//! ```
//!
//! An async mutex (not `parking_lot`) because the guard is held across the
//! registry calls.
//!
//! ## Phases
//!
//! ```text
//! Unregistered -> Registering -> Registered -> Deregistering -> Unregistered
//! ```
//!
//! The phase says what the registry holds; `wanted` says what it should
//! hold. `register` sets `wanted`, `deregister` clears it. Reconciling
//! registers only while `wanted` is set, and a wanted registration that an
//! earlier failure left missing is put back on the next reconcile, even
//! when the options did not change.

use crate::options::{NamingServiceOptions, ServiceSnapshot};
use crate::plan::ReconcilePlan;
use sable_common::{AccessKeys, Error, InstanceId, Result, RuntimeOptions, HEALTH_ACCESS_KEY};
use sable_registry::{RegistryClient, RegistryConnector};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the registration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Unregistered,
    Registering,
    Registered,
    Deregistering,
}

struct RegistrationState {
    current: ServiceSnapshot,
    client: Box<dyn RegistryClient>,
    phase: RegistrationPhase,
    wanted: bool,
}

impl RegistrationState {
    /// Registration is wanted but the registry does not hold it.
    fn missing(&self) -> bool {
        self.wanted && self.phase != RegistrationPhase::Registered
    }
}

/// Registers this process with the registry and keeps the record current.
pub struct NamingService {
    connector: Arc<dyn RegistryConnector>,
    access_keys: Arc<dyn AccessKeys>,
    state: Mutex<RegistrationState>,
}

impl NamingService {
    /// Connects a client for `snapshot` without registering anything yet.
    pub fn new(
        connector: Arc<dyn RegistryConnector>,
        access_keys: Arc<dyn AccessKeys>,
        snapshot: ServiceSnapshot,
    ) -> Result<Self> {
        snapshot.validate()?;
        let client = connector.connect(snapshot.naming.address.as_ref())?;

        Ok(Self {
            connector,
            access_keys,
            state: Mutex::new(RegistrationState {
                current: snapshot,
                client,
                phase: RegistrationPhase::Unregistered,
                wanted: false,
            }),
        })
    }

    pub async fn phase(&self) -> RegistrationPhase {
        self.state.lock().await.phase
    }

    /// Last committed snapshot.
    pub async fn current(&self) -> ServiceSnapshot {
        self.state.lock().await.current.clone()
    }

    pub async fn instance_id(&self) -> InstanceId {
        self.state.lock().await.current.instance_id()
    }

    async fn lock(&self, operation: &str, cancel: &CancellationToken) -> Result<tokio::sync::MutexGuard<'_, RegistrationState>> {
        debug!("Acquiring registration lock for {}", operation);
        let guard = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled(operation)),
            guard = self.state.lock() => guard,
        };
        debug!("Registration lock acquired");
        Ok(guard)
    }

    /// Registers the current snapshot. Does nothing if already registered.
    ///
    /// Any failure, transient or not, is returned as
    /// [`Error::FatalRegistration`]: a process that cannot register cannot be
    /// discovered.
    pub async fn register(&self, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.lock("register", cancel).await?;
        if state.phase == RegistrationPhase::Registered {
            debug!("Service instance already registered");
            return Ok(());
        }

        let instance_id = state.current.instance_id();
        info!(
            service = %state.current.naming.name,
            port = state.current.runtime.port,
            "Registering new service instance in naming service"
        );

        state.phase = RegistrationPhase::Registering;
        let registration = state
            .current
            .registration(&self.access_keys.get_or_create(HEALTH_ACCESS_KEY));

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled("register")),
            result = state.client.service_register(&registration) => result,
        };

        match result {
            Ok(meta) => {
                state.phase = RegistrationPhase::Registered;
                state.wanted = true;
                debug!(
                    service_id = %instance_id,
                    elapsed_ms = meta.request_time.as_millis() as u64,
                    "Service instance registered"
                );
                Ok(())
            }
            Err(e) => {
                state.phase = RegistrationPhase::Unregistered;
                error!(service_id = %instance_id, "Service registration failed, can't continue: {}", e);
                Err(Error::fatal_registration(instance_id.as_str(), e))
            }
        }
    }

    /// Removes the current identity from the registry.
    ///
    /// The remote call is made whatever the phase, so a record left over
    /// from an earlier run of the same identity is removed too. Later
    /// reconciles stop registering even if this call fails.
    pub async fn deregister(&self, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.lock("deregister", cancel).await?;
        state.wanted = false;
        let previous = state.phase;
        let instance_id = state.current.instance_id();

        info!(
            service = %state.current.naming.name,
            service_id = %instance_id,
            "Deregistering service instance from naming service"
        );

        state.phase = RegistrationPhase::Deregistering;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled("deregister")),
            result = state.client.service_deregister(&instance_id) => result,
        };

        match result {
            Ok(meta) => {
                state.phase = RegistrationPhase::Unregistered;
                debug!(
                    service_id = %instance_id,
                    elapsed_ms = meta.request_time.as_millis() as u64,
                    "Service instance deregistered"
                );
                Ok(())
            }
            Err(e) => {
                state.phase = previous;
                Err(e.context(format!("Failed to deregister {}", instance_id)))
            }
        }
    }

    /// Converges the registry on `next`.
    ///
    /// Every registry call gives up when `cancel` fires. On failure the
    /// previously committed snapshot and client stay in place; if the old
    /// identity was already removed, the next reconcile registers again.
    pub async fn reconcile(&self, next: ServiceSnapshot, cancel: &CancellationToken) -> Result<ReconcilePlan> {
        next.validate()?;
        let mut state = self.lock("reconcile", cancel).await?;

        let plan = ReconcilePlan::between(&state.current, &next);
        let missing = state.missing();
        if plan.is_noop() && !missing {
            debug!("Naming service options unchanged");
            return Ok(plan);
        }
        if plan.is_noop() {
            info!(service_id = %next.instance_id(), "Restoring missing service registration");
        } else {
            warn!(?plan, "Naming service options changed");
        }

        if plan.reregister && state.phase == RegistrationPhase::Registered {
            let old_id = state.current.instance_id();
            info!(service_id = %old_id, "Removing superseded service instance");
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::cancelled("reconcile")),
                result = state.client.service_deregister(&old_id) => result,
            };
            result.map_err(|e| e.context(format!("Failed to deregister {}", old_id)))?;
            // The old record is gone; until the new one lands we are not registered.
            state.phase = RegistrationPhase::Unregistered;
        }

        let new_client = if plan.reconnect {
            info!(
                address = %next.naming.address.as_ref().map(|a| a.as_str()).unwrap_or("default"),
                "Connecting to new naming service"
            );
            Some(self.connector.connect(next.naming.address.as_ref())?)
        } else {
            None
        };

        if state.wanted && (plan.update || state.missing()) {
            let registration = next.registration(&self.access_keys.get_or_create(HEALTH_ACCESS_KEY));
            let client = new_client.as_deref().unwrap_or(state.client.as_ref());
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::cancelled("reconcile")),
                result = client.service_register(&registration) => result,
            };
            let meta = result.map_err(|e| e.context(format!("Failed to register {}", registration.id)))?;
            state.phase = RegistrationPhase::Registered;
            debug!(
                service_id = %registration.id,
                elapsed_ms = meta.request_time.as_millis() as u64,
                "Service instance registration updated"
            );
        }

        if let Some(client) = new_client {
            state.client = client;
        }
        state.current = next;
        Ok(plan)
    }

    /// Reconciles whenever either options channel publishes a new value.
    ///
    /// Stops when `cancel` fires or either sender is dropped. Failures are
    /// logged and the loop keeps going.
    pub fn watch_options(
        self: &Arc<Self>,
        mut naming: watch::Receiver<NamingServiceOptions>,
        mut runtime: watch::Receiver<RuntimeOptions>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                let closed = tokio::select! {
                    _ = cancel.cancelled() => break,
                    r = naming.changed() => r.is_err(),
                    r = runtime.changed() => r.is_err(),
                };
                if closed {
                    debug!("Options source closed, stopping reconciliation");
                    break;
                }

                let snapshot = ServiceSnapshot::new(
                    naming.borrow_and_update().clone(),
                    runtime.borrow_and_update().clone(),
                );
                match service.reconcile(snapshot, &cancel).await {
                    Ok(plan) => debug!(?plan, "Reconciliation finished"),
                    Err(Error::Cancelled { .. }) => break,
                    Err(e) => error!("Reconciliation failed, keeping last registration: {}", e),
                }
            }
        })
    }
}
