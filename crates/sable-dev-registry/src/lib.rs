//! # Sable Dev Registry
//!
//! An in-memory registry speaking the Consul HTTP subset the Sable clients
//! use, for local runs and end-to-end tests.
//!
//! This crate provides:
//! - Key/value storage with a blocking index (`tokio::sync::watch`)
//! - An agent service catalog (thread-safe with DashMap)
//! - The axum router and a TCP server bindable on an ephemeral port
//! - Standalone server executable

pub mod api;
pub mod server;
pub mod storage;

// Re-export commonly used items
pub use server::RegistryServer;
pub use storage::DevRegistry;
