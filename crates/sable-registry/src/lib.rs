//! # Sable Registry
//!
//! The registry client contract used by the naming service and the
//! configuration watcher, plus its Consul HTTP implementation.
//!
//! - [`RegistryClient`]: list / register / deregister
//! - [`RegistryConnector`]: builds a client for a registry address
//! - [`consul`]: the hyper based Consul agent client
//! - [`wire`]: Consul JSON shapes, also served by the development registry

pub mod client;
pub mod consul;
pub mod types;
pub mod wire;

pub use client::{RegistryClient, RegistryConnector};
pub use consul::{ConsulClient, ConsulConnector, DEFAULT_ADDRESS};
pub use types::{
    CheckKind, HealthCheckDescriptor, KvPair, ListResponse, QueryOptions, ServiceRegistration, WriteMeta,
    ACCESS_KEY_HEADER,
};
