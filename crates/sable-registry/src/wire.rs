//! Consul JSON shapes.
//!
//! Shared by the HTTP client and the development registry so both sides of
//! the wire agree on field names (`PascalCase`, with `ID` and `HTTP` spelled
//! the way Consul spells them).

use crate::types::{CheckKind, HealthCheckDescriptor, KvPair, ServiceRegistration};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sable_common::serde_ext::{format_duration, parse_duration};
use sable_common::{Error, InstanceId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header carrying the registry index of a blocking-query answer.
pub const INDEX_HEADER: &str = "X-Consul-Index";

/// Header carrying the ACL token.
pub const TOKEN_HEADER: &str = "X-Consul-Token";

/// Body of `PUT /v1/agent/service/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub checks: Vec<AgentServiceCheck>,
}

/// One entry of [`AgentServiceRegistration::checks`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceCheck {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "HTTP", default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deregister_critical_service_after: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, Vec<String>>,
}

/// One element of the `GET /v1/kv/{prefix}?recurse` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvEntry {
    pub key: String,
    /// Base64 of the raw bytes, `null` for folders.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl KvEntry {
    pub fn encode(key: impl Into<String>, value: Option<&[u8]>, create_index: u64, modify_index: u64) -> Self {
        Self {
            key: key.into(),
            value: value.map(|bytes| STANDARD.encode(bytes)),
            flags: 0,
            create_index,
            modify_index,
        }
    }

    pub fn decode(self) -> Result<KvPair> {
        let value = match self.value {
            Some(encoded) => Some(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                Error::Protocol(format!("Invalid base64 value for key '{}': {}", self.key, e))
            })?),
            None => None,
        };

        Ok(KvPair {
            key: self.key,
            value,
            modify_index: self.modify_index,
        })
    }
}

impl From<&HealthCheckDescriptor> for AgentServiceCheck {
    fn from(check: &HealthCheckDescriptor) -> Self {
        let http = match check.kind {
            CheckKind::Http => Some(check.url.clone()),
        };

        Self {
            name: check.name.clone(),
            http,
            interval: Some(format_duration(check.interval)),
            deregister_critical_service_after: Some(format_duration(check.deregister_critical_after)),
            header: check.headers.clone(),
        }
    }
}

impl From<&ServiceRegistration> for AgentServiceRegistration {
    fn from(registration: &ServiceRegistration) -> Self {
        Self {
            id: registration.id.to_string(),
            name: registration.name.clone(),
            address: registration.address.clone(),
            port: registration.port,
            tags: registration.tags.clone(),
            checks: registration.checks.iter().map(AgentServiceCheck::from).collect(),
        }
    }
}

impl TryFrom<AgentServiceRegistration> for ServiceRegistration {
    type Error = Error;

    fn try_from(wire: AgentServiceRegistration) -> Result<Self> {
        let checks = wire
            .checks
            .into_iter()
            .map(|check| {
                let url = check.http.ok_or_else(|| {
                    Error::validation(format!("Check '{}' has no HTTP target", check.name))
                })?;
                let interval = parse_wire_duration(check.interval.as_deref(), "Interval")?;
                let deregister = parse_wire_duration(
                    check.deregister_critical_service_after.as_deref(),
                    "DeregisterCriticalServiceAfter",
                )?;
                Ok(HealthCheckDescriptor {
                    name: check.name,
                    kind: CheckKind::Http,
                    url,
                    interval,
                    deregister_critical_after: deregister,
                    headers: check.header,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: InstanceId::new(wire.id),
            name: wire.name,
            address: wire.address,
            port: wire.port,
            tags: wire.tags,
            checks,
        })
    }
}

fn parse_wire_duration(value: Option<&str>, field: &str) -> Result<std::time::Duration> {
    let value = value.ok_or_else(|| Error::validation(format!("Missing {}", field)))?;
    parse_duration(value).map_err(|e| Error::validation(format!("{}: {}", field, e)))
}
