//! Recording registry fakes for reconciler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sable_common::{Error, InstanceId, Protocol, Result, RuntimeOptions};
use sable_registry::{ListResponse, QueryOptions, RegistryClient, RegistryConnector, ServiceRegistration, WriteMeta};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One observed registry interaction. `client` is the connect ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(Option<Url>),
    Register { client: usize, registration: ServiceRegistration },
    Deregister { client: usize, id: InstanceId },
}

#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<Call>>,
    /// Errors handed out by the next register calls, in order.
    pub register_failures: Mutex<Vec<Error>>,
    pub deregister_failures: Mutex<Vec<Error>>,
    /// Register calls never answer while set.
    pub hang_registers: AtomicBool,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn registers(&self) -> Vec<ServiceRegistration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Register { registration, .. } => Some(registration),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn fail_next_register(&self, error: Error) {
        self.register_failures.lock().push(error);
    }

    pub fn fail_next_deregister(&self, error: Error) {
        self.deregister_failures.lock().push(error);
    }

    pub fn hang_registers(&self) {
        self.hang_registers.store(true, Ordering::SeqCst);
    }
}

struct RecordingClient {
    ordinal: usize,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl RegistryClient for RecordingClient {
    async fn list(&self, _prefix: &str, _options: &QueryOptions) -> Result<ListResponse> {
        Ok(ListResponse {
            last_index: 1,
            entries: Vec::new(),
            request_time: Duration::ZERO,
        })
    }

    async fn service_register(&self, registration: &ServiceRegistration) -> Result<WriteMeta> {
        self.recorder.calls.lock().push(Call::Register {
            client: self.ordinal,
            registration: registration.clone(),
        });
        if self.recorder.hang_registers.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failure = {
            let mut failures = self.recorder.register_failures.lock();
            (!failures.is_empty()).then(|| failures.remove(0))
        };
        match failure {
            Some(e) => Err(e),
            None => Ok(WriteMeta {
                request_time: Duration::ZERO,
            }),
        }
    }

    async fn service_deregister(&self, instance_id: &InstanceId) -> Result<WriteMeta> {
        self.recorder.calls.lock().push(Call::Deregister {
            client: self.ordinal,
            id: instance_id.clone(),
        });
        let failure = {
            let mut failures = self.recorder.deregister_failures.lock();
            (!failures.is_empty()).then(|| failures.remove(0))
        };
        match failure {
            Some(e) => Err(e),
            None => Ok(WriteMeta {
                request_time: Duration::ZERO,
            }),
        }
    }
}

pub struct RecordingConnector {
    pub recorder: Arc<Recorder>,
    connects: Mutex<usize>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            recorder: Arc::new(Recorder::default()),
            connects: Mutex::new(0),
        })
    }
}

impl RegistryConnector for RecordingConnector {
    fn connect(&self, address: Option<&Url>) -> Result<Box<dyn RegistryClient>> {
        let ordinal = {
            let mut connects = self.connects.lock();
            let ordinal = *connects;
            *connects += 1;
            ordinal
        };
        self.recorder.calls.lock().push(Call::Connect(address.cloned()));
        Ok(Box::new(RecordingClient {
            ordinal,
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

pub fn runtime() -> RuntimeOptions {
    RuntimeOptions {
        protocol: Protocol::Http,
        bind_interface: "0.0.0.0".to_string(),
        port: 5000,
        hostname: "node-1".to_string(),
        service_ip: "10.0.0.7".to_string(),
        pid: 42,
        development: false,
    }
}
