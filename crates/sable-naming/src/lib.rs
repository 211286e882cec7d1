//! # Sable Naming
//!
//! Keeps exactly one registry record per running process, in line with the
//! `ns` and `runtime` configuration sections.
//!
//! ```rust,ignore
//! let service = Arc::new(NamingService::new(connector, access_keys, snapshot)?);
//! service.register(&cancel).await?;                       // fatal on failure
//! let task = service.watch_options(naming_rx, runtime_rx, cancel.clone());
//! // ...
//! service.deregister(&cancel).await?;                     // best effort
//! ```

pub mod options;
pub mod plan;
pub mod service;

#[cfg(test)]
mod test_support;

pub use options::{
    NamingServiceOptions, ServiceSnapshot, DEFAULT_CHECK_INTERVAL, DEFAULT_DEREGISTER_AFTER, HEALTH_PATH,
    NAMING_SECTION, PING_PATH,
};
pub use plan::ReconcilePlan;
pub use service::{NamingService, RegistrationPhase};
