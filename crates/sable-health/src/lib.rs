//! # Sable Health
//!
//! The HTTP endpoints a registry's checker polls:
//! - `/ping`: liveness, always open
//! - `/health`: reported health, guarded by the `X-ACCESS-KEY` header
//! - a manual switch the application flips during drains

pub mod access;
pub mod api;
pub mod server;
pub mod switch;

pub use access::{require_access_key, AccessKeyGuard};
pub use api::{create_router, HealthContext};
pub use server::HealthServer;
pub use switch::{HealthReport, HealthState, ManualHealthSwitch};
