//! Registry backed configuration layer.

use crate::change_token::{on_change, ChangeToken, ReloadToken};
use crate::data::ConfigurationData;
use crate::key_mapper::KeyMapper;
use crate::polling::{PollingOptions, PollingPrefixChangeToken};
use crate::source::ConfigurationSource;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sable_common::Result;
use sable_registry::{KvPair, QueryOptions, RegistryClient};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pairs under a prefix at a registry index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvSnapshot {
    pub index: u64,
    pub pairs: Vec<KvPair>,
}

/// Key/value store the provider reads from.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, prefix: &str) -> Result<KvSnapshot>;

    /// Fresh change token for `prefix` that fires on changes after index
    /// `since`; `0` takes the baseline from the token's first answer.
    fn watch(&self, prefix: &str, since: u64) -> Box<dyn ChangeToken>;
}

/// [`KeyValueStore`] over a [`RegistryClient`].
pub struct RegistryKeyValueStore {
    client: Arc<dyn RegistryClient>,
    options: PollingOptions,
    cancel: CancellationToken,
}

impl RegistryKeyValueStore {
    pub fn new(client: Arc<dyn RegistryClient>, options: PollingOptions, cancel: CancellationToken) -> Self {
        Self { client, options, cancel }
    }
}

#[async_trait]
impl KeyValueStore for RegistryKeyValueStore {
    async fn load(&self, prefix: &str) -> Result<KvSnapshot> {
        let response = self.client.list(prefix, &QueryOptions::immediate()).await?;
        Ok(KvSnapshot {
            index: response.last_index,
            pairs: response.entries,
        })
    }

    fn watch(&self, prefix: &str, since: u64) -> Box<dyn ChangeToken> {
        Box::new(PollingPrefixChangeToken::watch_since(
            Arc::clone(&self.client),
            prefix,
            self.options,
            since,
            &self.cancel,
        ))
    }
}

/// Configuration layer holding the mapped contents of one registry prefix.
pub struct KeyValueConfigurationProvider {
    store: Arc<dyn KeyValueStore>,
    mapper: Arc<dyn KeyMapper>,
    data: RwLock<Arc<ConfigurationData>>,
    reload: Mutex<ReloadToken>,
    last_index: AtomicU64,
}

impl KeyValueConfigurationProvider {
    pub fn new(store: Arc<dyn KeyValueStore>, mapper: Arc<dyn KeyMapper>) -> Self {
        Self {
            store,
            mapper,
            data: RwLock::new(Arc::new(ConfigurationData::new())),
            reload: Mutex::new(ReloadToken::new()),
            last_index: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        self.mapper.prefix()
    }

    /// Index of the last successful load.
    pub fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::SeqCst)
    }

    /// Reads the prefix and replaces the held data.
    ///
    /// Subscribers are notified only when the mapped data actually differs.
    pub async fn load(&self) -> Result<()> {
        let snapshot = self.store.load(self.mapper.prefix()).await?;

        let data: ConfigurationData = snapshot
            .pairs
            .iter()
            .filter(|pair| self.mapper.should_load(pair))
            .filter_map(|pair| {
                let value = pair.value.as_deref()?;
                Some((self.mapper.map_key(&pair.key), self.mapper.decode_value(&pair.key, value)))
            })
            .collect();

        self.last_index.store(snapshot.index, Ordering::SeqCst);
        debug!(
            prefix = %self.mapper.prefix(),
            index = snapshot.index,
            "Loaded {} configuration keys",
            data.len()
        );

        let changed = {
            let mut current = self.data.write();
            if **current == data {
                false
            } else {
                *current = Arc::new(data);
                true
            }
        };

        if changed {
            let previous = std::mem::take(&mut *self.reload.lock());
            previous.notify();
        }
        Ok(())
    }

    /// Reloads every time the prefix changes, until `cancel` fires.
    ///
    /// Each new token starts from the index of the last load, so writes
    /// landing between a reload and the next blocking query are not lost.
    /// A failed reload keeps the previous data and waits for the next change.
    pub fn start_watching(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        info!(prefix = %self.mapper.prefix(), "Watching registry prefix for configuration changes");

        let producer = Arc::clone(self);
        let consumer = Arc::clone(self);
        on_change(
            move || producer.store.watch(producer.mapper.prefix(), producer.last_index()),
            move || {
                let provider = Arc::clone(&consumer);
                async move {
                    if let Err(e) = provider.load().await {
                        warn!(prefix = %provider.mapper.prefix(), "Configuration reload failed: {}", e);
                    }
                }
            },
            cancel,
        )
    }
}

impl ConfigurationSource for KeyValueConfigurationProvider {
    fn name(&self) -> &str {
        self.mapper.prefix()
    }

    fn data(&self) -> Arc<ConfigurationData> {
        self.data.read().clone()
    }

    fn reload_token(&self) -> Box<dyn ChangeToken> {
        Box::new(self.reload.lock().clone())
    }
}
