//! Host inputs and the host-level configuration sections.

use sable_common::serde_ext;
use sable_config::polling::{PollingOptions, DEFAULT_BASE_FAILURE_DELAY, DEFAULT_WAIT_TIME};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Configuration file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "sable.yaml";

/// Prefix of the environment variables layer.
pub const ENV_PREFIX: &str = "SABLE_";

/// Section holding [`KvOptions`].
pub const KV_SECTION: &str = "kv";

/// Section holding [`RegistryOptions`].
pub const REGISTRY_SECTION: &str = "registry";

/// What the process was started with, before any configuration is read.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Explicit configuration file (`--config`).
    pub config_file: Option<PathBuf>,
    /// Where [`DEFAULT_CONFIG_FILE`] is looked up.
    pub working_dir: Option<PathBuf>,
    /// `-d/--dev`.
    pub development: bool,
    /// `-p/--port`.
    pub port: Option<u16>,
    /// Repeated `--set key=value`.
    pub overrides: Vec<String>,
    /// Variables offered to the environment layer.
    pub env_vars: Vec<(String, String)>,
}

impl HostOptions {
    /// Options seeded with the current process environment and directory.
    pub fn from_process() -> Self {
        Self {
            working_dir: std::env::current_dir().ok(),
            env_vars: std::env::vars().collect(),
            ..Self::default()
        }
    }

    /// Explicit file, else `sable.yaml` in the working directory if present.
    pub fn resolve_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_file {
            return Some(path.clone());
        }
        let candidate = self.working_dir.as_ref()?.join(DEFAULT_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    /// The command line rendered as `key=value` pairs, flags first so
    /// explicit `--set` entries win.
    pub fn command_line_pairs(&self) -> Vec<String> {
        let mut pairs = Vec::new();
        if self.development {
            pairs.push("runtime:development=true".to_string());
        }
        if let Some(port) = self.port {
            pairs.push(format!("runtime:port={}", port));
        }
        pairs.extend(self.overrides.iter().cloned());
        pairs
    }
}

/// Registry key/value layer, enabled by `kv:prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KvOptions {
    #[serde(default)]
    pub prefix: Option<String>,

    /// Registry serving the prefix; the default agent address otherwise.
    #[serde(default, deserialize_with = "empty_url_as_none")]
    pub address: Option<Url>,

    #[serde(default, with = "serde_ext::option_duration")]
    pub wait_time: Option<Duration>,

    #[serde(default, with = "serde_ext::option_duration")]
    pub failure_delay: Option<Duration>,

    /// Start even if the first load fails.
    #[serde(default, deserialize_with = "serde_ext::flexible_bool::deserialize")]
    pub optional: bool,
}

impl KvOptions {
    pub fn polling(&self) -> PollingOptions {
        PollingOptions {
            wait_time: self.wait_time.unwrap_or(DEFAULT_WAIT_TIME),
            base_failure_delay: self.failure_delay.unwrap_or(DEFAULT_BASE_FAILURE_DELAY),
        }
    }
}

/// Settings shared by every registry client the host creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegistryOptions {
    /// ACL token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
}

fn empty_url_as_none<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => Url::parse(text).map(Some).map_err(serde::de::Error::custom),
    }
}
