//! In-memory storage for the development registry.
//!
//! # Rust Learning Note
//!
//! ## Two Kinds of Shared State
//!
//! The agent catalog is a plain map with independent entries, so it lives in
//! a `DashMap` (sharded locks, no manual locking). The key/value table needs
//! one index that moves together with the data, so it sits behind a single
//! `parking_lot::RwLock` and publishes its index through a
//! `tokio::sync::watch` channel.
//!
//! ## Scoped Indexes
//!
//! A read answers with the index of the keys it covers, not the table's:
//! the highest `modify_index` under the key, or the index a key under it
//! was deleted at. A write elsewhere moves the channel but not that index,
//! so a parked reader re-checks its own scope on every wake:
//!
//! ```rust,ignore
//! let mut rx = self.index.subscribe();
//! loop {
//!     rx.borrow_and_update();
//!     if self.scoped_index(key, recurse) > wait_index { break; }
//!     rx.changed().await?;
//! }
//! ```

use dashmap::DashMap;
use parking_lot::RwLock;
use sable_registry::wire::{AgentServiceRegistration, KvEntry};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Upper bound for a blocking query, as in Consul.
pub const MAX_WAIT: Duration = Duration::from_secs(600);

/// Wait used when a blocking query names an index but no `wait`.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct StoredValue {
    value: Option<Vec<u8>>,
    create_index: u64,
    modify_index: u64,
}

#[derive(Debug, Default)]
struct KvTable {
    values: BTreeMap<String, StoredValue>,
    /// Index each deleted key went away at.
    tombstones: BTreeMap<String, u64>,
}

impl KvTable {
    fn covered<'a, V: 'a>(
        map: &'a BTreeMap<String, V>,
        key: &'a str,
        recurse: bool,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a V)> + 'a> {
        if recurse {
            Box::new(map.range(key.to_string()..).take_while(move |(k, _)| k.starts_with(key)))
        } else {
            Box::new(map.get_key_value(key).into_iter())
        }
    }

    /// Highest index that touched `key` (or anything under it when `recurse`).
    fn scoped_index(&self, key: &str, recurse: bool) -> u64 {
        let modified = Self::covered(&self.values, key, recurse).map(|(_, v)| v.modify_index);
        let deleted = Self::covered(&self.tombstones, key, recurse).map(|(_, index)| *index);
        modified.chain(deleted).max().unwrap_or(INITIAL_INDEX)
    }
}

const INITIAL_INDEX: u64 = 1;

/// Key/value table plus agent service catalog.
#[derive(Debug)]
pub struct DevRegistry {
    kv: RwLock<KvTable>,
    services: DashMap<String, AgentServiceRegistration>,
    index: watch::Sender<u64>,
}

impl Default for DevRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DevRegistry {
    /// Creates an empty registry whose index starts at 1.
    pub fn new() -> Self {
        let (index, _) = watch::channel(INITIAL_INDEX);
        Self {
            kv: RwLock::new(KvTable::default()),
            services: DashMap::new(),
            index,
        }
    }

    /// Current key/value index. Only key/value writes advance it.
    pub fn index(&self) -> u64 {
        *self.index.borrow()
    }

    /// Writes `key`; returns the new index.
    pub fn put(&self, key: impl Into<String>, value: Option<Vec<u8>>) -> u64 {
        let key = key.into();
        let mut kv = self.kv.write();
        let next = self.index() + 1;

        let create_index = kv.values.get(&key).map_or(next, |existing| existing.create_index);
        kv.tombstones.remove(&key);
        kv.values.insert(
            key.clone(),
            StoredValue {
                value,
                create_index,
                modify_index: next,
            },
        );
        self.index.send_replace(next);

        debug!("Stored key '{}' at index {}", key, next);
        next
    }

    /// Deletes `key`, or every key starting with it when `recurse`.
    /// Returns how many keys went away; the index only moves if any did.
    pub fn delete(&self, key: &str, recurse: bool) -> usize {
        let mut kv = self.kv.write();
        let doomed: Vec<String> = KvTable::covered(&kv.values, key, recurse)
            .map(|(k, _)| k.clone())
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let next = self.index() + 1;
        for k in &doomed {
            kv.values.remove(k);
            kv.tombstones.insert(k.clone(), next);
        }
        self.index.send_replace(next);
        debug!("Deleted {} key(s) under '{}' at index {}", doomed.len(), key, next);
        doomed.len()
    }

    /// Index of the keys `key` covers; 1 if none were ever written.
    pub fn scoped_index(&self, key: &str, recurse: bool) -> u64 {
        self.kv.read().scoped_index(key, recurse)
    }

    /// Reads `key`, or every key starting with it when `recurse`, with the
    /// scoped index the answer was taken at.
    pub fn read(&self, key: &str, recurse: bool) -> (u64, Vec<KvEntry>) {
        let kv = self.kv.read();
        let entries = KvTable::covered(&kv.values, key, recurse)
            .map(|(k, v)| KvEntry::encode(k.clone(), v.value.as_deref(), v.create_index, v.modify_index))
            .collect();

        (kv.scoped_index(key, recurse), entries)
    }

    /// Blocking read: parks until the scoped index moves past `wait_index`
    /// or `wait` elapses, then answers like [`DevRegistry::read`].
    pub async fn read_blocking(&self, key: &str, recurse: bool, wait_index: u64, wait: Duration) -> (u64, Vec<KvEntry>) {
        let mut rx = self.index.subscribe();
        let wait = wait.min(MAX_WAIT);

        let parked = async {
            loop {
                rx.borrow_and_update();
                if self.scoped_index(key, recurse) > wait_index {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(wait, parked).await.is_err() {
            debug!("Blocking read of '{}' timed out at index {}", key, wait_index);
        }

        self.read(key, recurse)
    }

    /// Adds or replaces a service instance.
    pub fn register(&self, registration: AgentServiceRegistration) {
        let id = registration.id.clone();
        if self.services.insert(id.clone(), registration).is_some() {
            info!("Updated service instance: {}", id);
        } else {
            info!("Registered new service instance: {}", id);
        }
    }

    /// Removes a service instance; false if it was unknown.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.services.remove(id).is_some();
        if removed {
            info!("Deregistered service instance: {}", id);
        }
        removed
    }

    pub fn service(&self, id: &str) -> Option<AgentServiceRegistration> {
        self.services.get(id).map(|entry| entry.clone())
    }

    /// All registered instances by id.
    pub fn services(&self) -> BTreeMap<String, AgentServiceRegistration> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}
