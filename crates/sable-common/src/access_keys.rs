//! Per-process access keys.
//!
//! An access key is an opaque secret minted once per process lifetime and
//! never rotated. The health surface requires it on authenticated endpoints,
//! and the naming service hands the same key to the registry so the
//! registry's checker can call those endpoints.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Logical name of the key guarding the health endpoint.
pub const HEALTH_ACCESS_KEY: &str = "health";

/// Access key provider.
pub trait AccessKeys: Send + Sync {
    /// Returns the key registered under `name`, if any.
    fn get(&self, name: &str) -> Option<String>;

    /// Mints a new key for `name`, replacing any previous one.
    fn create(&self, name: &str) -> String;

    /// Returns the existing key for `name` or mints one.
    fn get_or_create(&self, name: &str) -> String {
        match self.get(name) {
            Some(key) => key,
            None => self.create(name),
        }
    }
}

/// Keys held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryAccessKeys {
    keys: Mutex<HashMap<String, String>>,
}

impl InMemoryAccessKeys {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

impl AccessKeys for InMemoryAccessKeys {
    fn get(&self, name: &str) -> Option<String> {
        self.keys.lock().get(name).cloned()
    }

    fn create(&self, name: &str) -> String {
        let key = Self::mint();
        self.keys.lock().insert(name.to_string(), key.clone());
        key
    }

    // Single lock so two concurrent callers can't mint different keys.
    fn get_or_create(&self, name: &str) -> String {
        self.keys
            .lock()
            .entry(name.to_string())
            .or_insert_with(Self::mint)
            .clone()
    }
}
