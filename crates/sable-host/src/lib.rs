//! # Sable Host
//!
//! Puts the pieces together for one service process: layered settings,
//! bound options, the health endpoints, and the naming service.
//!
//! ```rust,ignore
//! let host = ServiceHost::build(HostOptions::from_process()).await?;
//! host.run(shutdown_signal()).await?;
//! ```

pub mod host;
pub mod options;
pub mod settings;

pub use host::{RunningHost, ServiceHost, DEREGISTER_TIMEOUT};
pub use options::{HostOptions, KvOptions, RegistryOptions, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use settings::{build_settings, Settings};
