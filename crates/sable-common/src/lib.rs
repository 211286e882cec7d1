//! # Sable Common
//!
//! Common types, traits, and utilities shared across the Sable crates.
//!
//! This crate provides the foundational pieces every other crate builds
//! upon: the error taxonomy, process runtime facts, access keys, and serde
//! helpers for text-valued configuration.

pub mod access_keys;
pub mod errors;
pub mod runtime;
pub mod serde_ext;
pub mod types;

// Re-export commonly used items
pub use access_keys::{AccessKeys, InMemoryAccessKeys, HEALTH_ACCESS_KEY};
pub use errors::{Error, Result, ResultExt};
pub use runtime::{MachineFacts, RuntimeOptions, RUNTIME_SECTION};
pub use types::{InstanceId, Protocol};
