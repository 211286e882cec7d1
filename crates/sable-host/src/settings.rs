//! Layered settings of a Sable service.
//!
//! # Rust Learning Note
//!
//! Layers are plain `Arc<dyn ConfigurationSource>` values in a `Vec`; later
//! layers win. The registry layer is the odd one out: whether it exists
//! depends on `kv:prefix`, which may itself come from any other layer. So the
//! fixed layers are assembled first, read once as a bootstrap root, and the
//! registry layer is slotted in behind the file layer afterwards:
//!
//! | # | Layer |
//! |---|---|
//! | 1 | defaults and machine facts |
//! | 2 | YAML file |
//! | 3 | registry key/value prefix (optional) |
//! | 4 | `SABLE_` environment variables |
//! | 5 | command line |
//! | 6 | process id |

use crate::options::{HostOptions, KvOptions, RegistryOptions, ENV_PREFIX, KV_SECTION, REGISTRY_SECTION};
use sable_common::runtime::{DEFAULT_INTERFACE, DEFAULT_PORT, DEFAULT_PROTOCOL};
use sable_common::{MachineFacts, Result, ResultExt};
use sable_config::{
    ConfigurationData, ConfigurationRoot, ConfigurationSource, DefaultKeyMapper, KeyValueConfigurationProvider,
    MemorySource, RegistryKeyValueStore,
};
use sable_registry::{ConsulClient, RegistryClient, DEFAULT_ADDRESS};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// The assembled configuration.
pub struct Settings {
    pub root: Arc<ConfigurationRoot>,
    /// The registry layer, when `kv:prefix` is set.
    pub kv: Option<Arc<KeyValueConfigurationProvider>>,
    pub registry: RegistryOptions,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("root", &self.root)
            .field("kv", &self.kv.as_ref().map(|kv| kv.prefix().to_string()))
            .finish()
    }
}

/// Layer 1: protocol, interface, port and what the machine says about itself.
pub fn defaults_layer(facts: &MachineFacts, development: bool) -> ConfigurationData {
    let service_ip = match facts.ipv4 {
        Some(ip) if !development => ip,
        Some(_) => Ipv4Addr::LOCALHOST,
        None => {
            warn!("No IPv4 route found, advertising the loopback address");
            Ipv4Addr::LOCALHOST
        }
    };

    [
        ("runtime:protocol", DEFAULT_PROTOCOL.to_string()),
        ("runtime:interface", DEFAULT_INTERFACE.to_string()),
        ("runtime:port", DEFAULT_PORT.to_string()),
        ("runtime:hostname", facts.hostname.clone()),
        ("runtime:serviceIp", service_ip.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Layer 6: the process id, which nothing may override.
pub fn process_layer(facts: &MachineFacts) -> ConfigurationData {
    [("runtime:pid", facts.pid.to_string())].into_iter().collect()
}

/// Builds every layer; loads the registry layer and starts watching it.
pub async fn build_settings(options: &HostOptions, facts: &MachineFacts, cancel: &CancellationToken) -> Result<Settings> {
    let head: Vec<Arc<dyn ConfigurationSource>> = {
        let mut layers: Vec<Arc<dyn ConfigurationSource>> =
            vec![Arc::new(MemorySource::new("defaults", defaults_layer(facts, options.development)))];
        if let Some(path) = options.resolve_config_file() {
            info!("Loading configuration file {}", path.display());
            layers.push(Arc::new(MemorySource::from_yaml_file(&path)?));
        }
        layers
    };

    let tail: Vec<Arc<dyn ConfigurationSource>> = vec![
        Arc::new(MemorySource::from_env_vars(ENV_PREFIX, options.env_vars.iter().cloned())),
        Arc::new(MemorySource::from_overrides("command line", &options.command_line_pairs())?),
        Arc::new(MemorySource::new("process", process_layer(facts))),
    ];

    let bootstrap = ConfigurationRoot::new(head.iter().chain(tail.iter()).cloned().collect());
    let kv_options: KvOptions = bootstrap.bind(KV_SECTION)?;
    let registry: RegistryOptions = bootstrap.bind(REGISTRY_SECTION)?;

    let kv = match kv_options.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => Some(kv_layer(prefix, &kv_options, &registry, cancel).await?),
        None => None,
    };

    let mut layers = head;
    if let Some(provider) = &kv {
        layers.push(Arc::clone(provider) as Arc<dyn ConfigurationSource>);
    }
    layers.extend(tail);

    Ok(Settings {
        root: Arc::new(ConfigurationRoot::new(layers)),
        kv,
        registry,
    })
}

async fn kv_layer(
    prefix: &str,
    kv: &KvOptions,
    registry: &RegistryOptions,
    cancel: &CancellationToken,
) -> Result<Arc<KeyValueConfigurationProvider>> {
    let address = match &kv.address {
        Some(address) => address.clone(),
        None => Url::parse(DEFAULT_ADDRESS).map_err(|e| sable_common::Error::Internal(e.to_string()))?,
    };
    info!(prefix, address = %address, "Using registry configuration layer");

    let client: Arc<dyn RegistryClient> = Arc::new(ConsulClient::new(address).with_token(registry.token.clone()));
    let store = RegistryKeyValueStore::new(client, kv.polling(), cancel.clone());
    let provider = Arc::new(KeyValueConfigurationProvider::new(
        Arc::new(store),
        Arc::new(DefaultKeyMapper::new(prefix)),
    ));

    match provider.load().await.context(format!("Failed to load registry prefix '{}'", prefix)) {
        Ok(()) => {}
        Err(e) if kv.optional => warn!("Starting without registry configuration: {}", e),
        Err(e) => return Err(e),
    }
    provider.start_watching(cancel.clone());
    Ok(provider)
}
