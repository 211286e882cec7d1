//! Registry client contract.
//!
//! # Rust Learning Note
//!
//! The naming service and the configuration watcher never talk HTTP
//! themselves; they hold a `Box<dyn RegistryClient>` (or an `Arc`). That
//! keeps the reconciliation logic testable with a recording fake and lets
//! a new registry address swap the client without touching callers.
//!
//! ```rust,ignore
//! let client = connector.connect(Some(&address))?;
//! let listing = client.list("config/app", &QueryOptions::immediate()).await?;
//! ```
//!
//! `async fn` in traits used as trait objects still needs `#[async_trait]`.

use crate::types::{ListResponse, QueryOptions, ServiceRegistration, WriteMeta};
use async_trait::async_trait;
use sable_common::{InstanceId, Result};
use std::sync::Arc;
use url::Url;

/// Operations the service needs from a registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists every key under `prefix`, optionally as a blocking query.
    async fn list(&self, prefix: &str, options: &QueryOptions) -> Result<ListResponse>;

    /// Creates or replaces the registration with `registration.id`.
    async fn service_register(&self, registration: &ServiceRegistration) -> Result<WriteMeta>;

    /// Removes the registration with `instance_id`.
    async fn service_deregister(&self, instance_id: &InstanceId) -> Result<WriteMeta>;
}

#[async_trait]
impl<T: RegistryClient + ?Sized> RegistryClient for Arc<T> {
    async fn list(&self, prefix: &str, options: &QueryOptions) -> Result<ListResponse> {
        (**self).list(prefix, options).await
    }

    async fn service_register(&self, registration: &ServiceRegistration) -> Result<WriteMeta> {
        (**self).service_register(registration).await
    }

    async fn service_deregister(&self, instance_id: &InstanceId) -> Result<WriteMeta> {
        (**self).service_deregister(instance_id).await
    }
}

/// Builds clients bound to a registry address.
///
/// `None` means "the default address".
pub trait RegistryConnector: Send + Sync {
    fn connect(&self, address: Option<&Url>) -> Result<Box<dyn RegistryClient>>;
}
