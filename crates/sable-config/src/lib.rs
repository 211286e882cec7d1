//! # Sable Config
//!
//! Flat, layered configuration that can follow a registry key prefix.
//!
//! ## Pieces
//!
//! - [`ChangeToken`]: single-fire change signal, with [`ReloadToken`],
//!   [`CompositeChangeToken`] and [`PollingPrefixChangeToken`]
//! - [`KeyMapper`]: which registry keys load, and under which local name
//! - [`ConfigurationRoot`]: ordered [`ConfigurationSource`] layers
//! - [`KeyValueConfigurationProvider`]: the registry layer, reloaded by a
//!   blocking-poll watch
//! - [`OptionsMonitor`]: a section bound to a typed struct, published on a
//!   `tokio::sync::watch` channel

pub mod binder;
pub mod change_token;
pub mod data;
pub mod key_mapper;
pub mod kv;
pub mod monitor;
pub mod polling;
pub mod source;

pub use binder::bind;
pub use change_token::{
    changed, on_change, CallbackRegistration, ChangeCallback, ChangeToken, CompositeChangeToken, ReloadToken,
};
pub use data::{ConfigurationData, KEY_DELIMITER};
pub use key_mapper::{DefaultKeyMapper, KeyMapper};
pub use kv::{KeyValueConfigurationProvider, KeyValueStore, KvSnapshot, RegistryKeyValueStore};
pub use monitor::OptionsMonitor;
pub use polling::{PollingOptions, PollingPrefixChangeToken, WatchState};
pub use source::{parse_override, yaml_to_data, ConfigurationRoot, ConfigurationSource, MemorySource};
