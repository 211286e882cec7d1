//! Naming service options and the combined snapshot the reconciler works on.

use sable_common::serde_ext;
use sable_common::{Error, InstanceId, Result, RuntimeOptions};
use sable_registry::{HealthCheckDescriptor, ServiceRegistration, ACCESS_KEY_HEADER};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

/// Configuration section holding [`NamingServiceOptions`].
pub const NAMING_SECTION: &str = "ns";

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DEREGISTER_AFTER: Duration = Duration::from_secs(600);

/// Liveness endpoint probed by the registry.
pub const PING_PATH: &str = "/ping";
/// Authenticated health endpoint probed by the registry.
pub const HEALTH_PATH: &str = "/health";

/// What this service wants the registry to know about it.
///
/// Compared structurally; tag order matters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamingServiceOptions {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, with = "serde_ext::option_duration")]
    pub check_interval: Option<Duration>,

    #[serde(
        default,
        alias = "deregister_ttl",
        alias = "deregister_critical_after",
        with = "serde_ext::option_duration"
    )]
    pub deregister_after: Option<Duration>,

    /// Registry address; `None` means the client default.
    #[serde(default, alias = "registry_address", deserialize_with = "deserialize_address")]
    pub address: Option<Url>,
}

impl NamingServiceOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            check_interval: None,
            deregister_after: None,
            address: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::binding(NAMING_SECTION, "service name must not be empty"));
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Err(Error::binding(NAMING_SECTION, "tags must not be empty strings"));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL)
    }

    pub fn deregister_after(&self) -> Duration {
        self.deregister_after.unwrap_or(DEFAULT_DEREGISTER_AFTER)
    }
}

fn deserialize_address<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Url::parse(s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid registry address '{}': {}", s, e))),
    }
}

/// Both option types, as one unit of desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub naming: NamingServiceOptions,
    pub runtime: RuntimeOptions,
}

impl ServiceSnapshot {
    pub fn new(naming: NamingServiceOptions, runtime: RuntimeOptions) -> Self {
        Self { naming, runtime }
    }

    pub fn validate(&self) -> Result<()> {
        self.naming.validate()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.runtime.instance_id(&self.naming.name)
    }

    /// Registration record for this snapshot.
    ///
    /// Carries a liveness check on [`PING_PATH`] and an authenticated check on
    /// [`HEALTH_PATH`] that sends `access_key` in `X-ACCESS-KEY`.
    pub fn registration(&self, access_key: &str) -> ServiceRegistration {
        let base = self.runtime.service_url();
        let interval = self.naming.check_interval();
        let deregister_after = self.naming.deregister_after();

        ServiceRegistration {
            id: self.instance_id(),
            name: self.naming.name.clone(),
            address: Some(self.runtime.service_ip.clone()),
            port: self.runtime.port,
            tags: self.naming.tags.clone(),
            checks: vec![
                HealthCheckDescriptor::http("ping", format!("{}{}", base, PING_PATH), interval, deregister_after),
                HealthCheckDescriptor::http("health", format!("{}{}", base, HEALTH_PATH), interval, deregister_after)
                    .with_header(ACCESS_KEY_HEADER, access_key),
            ],
        }
    }
}
