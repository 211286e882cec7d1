//! Registry call shapes, independent of any wire format.

use sable_common::InstanceId;
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the per-process access key on authenticated checks.
pub const ACCESS_KEY_HEADER: &str = "X-ACCESS-KEY";

/// Blocking-query parameters for [`crate::RegistryClient::list`].
///
/// With no `wait_index` the registry answers immediately. With one, it holds
/// the request open until its index moves past `wait_index` or `wait_time`
/// elapses, whichever comes first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub wait_index: Option<u64>,
    pub wait_time: Option<Duration>,
}

impl QueryOptions {
    /// Non-blocking query.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Blocking query on `wait_index` for at most `wait_time`.
    pub fn blocking(wait_index: u64, wait_time: Duration) -> Self {
        Self {
            wait_index: Some(wait_index),
            wait_time: Some(wait_time),
        }
    }
}

/// A key/value pair as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    /// `None` for folder entries.
    pub value: Option<Vec<u8>>,
    pub modify_index: u64,
}

/// Result of a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Registry index the answer reflects.
    pub last_index: u64,
    pub entries: Vec<KvPair>,
    pub request_time: Duration,
}

/// Acknowledgement of a write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMeta {
    pub request_time: Duration,
}

/// Kind of check the registry runs against the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Http,
}

/// One health check attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckDescriptor {
    pub name: String,
    pub kind: CheckKind,
    pub url: String,
    pub interval: Duration,
    pub deregister_critical_after: Duration,
    /// Header name to ordered values, sent by the registry's checker.
    pub headers: BTreeMap<String, Vec<String>>,
}

impl HealthCheckDescriptor {
    /// HTTP check without extra headers.
    pub fn http(
        name: impl Into<String>,
        url: impl Into<String>,
        interval: Duration,
        deregister_critical_after: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind: CheckKind::Http,
            url: url.into(),
            interval,
            deregister_critical_after,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }
}

/// A service instance registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub id: InstanceId,
    pub name: String,
    pub address: Option<String>,
    pub port: u16,
    pub tags: Vec<String>,
    pub checks: Vec<HealthCheckDescriptor>,
}
