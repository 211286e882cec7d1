//! Runtime facts about the running process.
//!
//! [`RuntimeOptions`] is bound from the `runtime` configuration section. Most
//! of its values are not configured by hand: the host seeds the defaults layer
//! with [`MachineFacts`] (hostname, IPv4 address) and appends the process id
//! as the last layer.

use crate::serde_ext;
use crate::types::{InstanceId, Protocol};
use serde::Deserialize;
use std::net::{Ipv4Addr, UdpSocket};
use tracing::debug;

/// Configuration section holding [`RuntimeOptions`].
pub const RUNTIME_SECTION: &str = "runtime";

pub const DEFAULT_PROTOCOL: Protocol = Protocol::Http;
pub const DEFAULT_INTERFACE: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// How this process is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct RuntimeOptions {
    #[serde(default, deserialize_with = "serde_ext::from_str::deserialize")]
    pub protocol: Protocol,

    /// Interface the HTTP listener binds to.
    #[serde(alias = "interface")]
    pub bind_interface: String,

    #[serde(deserialize_with = "serde_ext::from_str::deserialize")]
    pub port: u16,

    pub hostname: String,

    /// Address the registry's checker uses to reach this process.
    pub service_ip: String,

    #[serde(deserialize_with = "serde_ext::from_str::deserialize")]
    pub pid: u32,

    #[serde(
        default,
        alias = "development_mode",
        deserialize_with = "serde_ext::flexible_bool::deserialize"
    )]
    pub development: bool,
}

impl RuntimeOptions {
    /// Identity of this process when registered under `service_name`.
    pub fn instance_id(&self, service_name: &str) -> InstanceId {
        InstanceId::compose(service_name, &self.hostname, self.pid, self.port)
    }

    /// Base URL the registry uses to reach this process.
    pub fn service_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.service_ip, self.port)
    }

    /// Address the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_interface, self.port)
    }
}

/// Machine-derived facts used to seed the runtime defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineFacts {
    pub hostname: String,
    pub ipv4: Option<Ipv4Addr>,
    pub pid: u32,
}

impl MachineFacts {
    /// Detects the facts of the current machine and process.
    pub fn detect() -> Self {
        let hostname = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
        let ipv4 = local_ipv4();
        debug!("Detected machine facts: hostname={}, ipv4={:?}", hostname, ipv4);

        Self {
            hostname,
            ipv4,
            pid: std::process::id(),
        }
    }
}

/// Finds the IPv4 address of the interface that routes to the outside world.
///
/// Connecting a UDP socket sends no packets; it only asks the OS to pick a
/// route, which reveals the local address of the outbound interface.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
