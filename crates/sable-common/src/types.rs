//! Core domain types used throughout Sable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instance identifier - uniquely identifies one running process's
/// registration record in the registry.
///
/// Built from the service name and the runtime facts of the process, so the
/// same inputs always produce the same identifier. Deregistration relies on
/// that: it targets exactly the record registration created.
///
/// # Example
/// ```
/// use sable_common::InstanceId;
///
/// let id = InstanceId::compose("orders", "host-a", 4242, 5000);
/// assert_eq!(id.as_str(), "orders-host-a-4242-5000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an InstanceId from an already formatted string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Composes `name-hostname-pid-port`.
    pub fn compose(name: &str, hostname: &str, pid: u32, port: u16) -> Self {
        Self(format!("{}-{}-{}-{}", name, hostname, pid, port))
    }

    /// Returns the instance ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheme the service is reachable on; also used to build health-check URLs.
///
/// # Rust Learning Note
///
/// This is an **enum** rather than a free-form string, so an unsupported
/// scheme is rejected while configuration is bound instead of surfacing as
/// a failing health check minutes later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unsupported protocol '{}'", other)),
        }
    }
}
