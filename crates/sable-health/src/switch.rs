//! Manual health switch and the report served on `/health`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Health as reported to the registry's checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Degraded still serves traffic, so only unhealthy fails the check.
    pub fn is_serving(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            other => Err(format!("unknown health state '{}'", other)),
        }
    }
}

/// Health flipped by the application itself (drain, maintenance...).
#[derive(Debug)]
pub struct ManualHealthSwitch {
    state: RwLock<(HealthState, DateTime<Utc>)>,
}

impl Default for ManualHealthSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualHealthSwitch {
    /// Starts healthy.
    pub fn new() -> Self {
        Self {
            state: RwLock::new((HealthState::Healthy, Utc::now())),
        }
    }

    pub fn current(&self) -> HealthState {
        self.state.read().0
    }

    /// When the state last changed.
    pub fn since(&self) -> DateTime<Utc> {
        self.state.read().1
    }

    pub fn set(&self, next: HealthState) {
        let mut state = self.state.write();
        if state.0 != next {
            info!(from = %state.0, to = %next, "Health switch flipped");
            *state = (next, Utc::now());
        }
    }

    pub fn healthy(&self) {
        self.set(HealthState::Healthy);
    }

    pub fn degraded(&self) {
        self.set(HealthState::Degraded);
    }

    pub fn unhealthy(&self) {
        self.set(HealthState::Unhealthy);
    }

    pub fn report(&self, service: &str) -> HealthReport {
        let (status, since) = *self.state.read();
        HealthReport {
            service: service.to_string(),
            status,
            since,
            checked_at: Utc::now(),
        }
    }
}

/// Body of the `/health` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub service: String,
    pub status: HealthState,
    pub since: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}
