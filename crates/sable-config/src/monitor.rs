//! Typed options that follow configuration reloads.
//!
//! # Rust Learning Note
//!
//! Subscribers get a `tokio::sync::watch::Receiver<T>`: it always holds the
//! latest bound value and `changed().await` wakes them when it moves. Values
//! are compared before sending, so a reload that leaves the section as it
//! was wakes nobody.
//!
//! ```rust,ignore
//! let monitor = OptionsMonitor::<NamingServiceOptions>::bind(&root, "ns")?;
//! let mut rx = monitor.subscribe();
//! while rx.changed().await.is_ok() {
//!     let options = rx.borrow_and_update().clone();
//! }
//! ```

use crate::change_token::on_change;
use crate::source::ConfigurationRoot;
use sable_common::Result;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Latest value of one configuration section.
pub struct OptionsMonitor<T> {
    section: String,
    tx: watch::Sender<T>,
}

impl<T> OptionsMonitor<T>
where
    T: DeserializeOwned + PartialEq + Clone + Send + Sync + 'static,
{
    /// Binds the section once; fails if it does not bind.
    pub fn bind(root: &ConfigurationRoot, section: impl Into<String>) -> Result<Self> {
        let section = section.into();
        let initial = root.bind::<T>(&section)?;
        let (tx, _) = watch::channel(initial);
        Ok(Self { section, tx })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Rebinds the section. Returns true if the value changed.
    ///
    /// On a binding error the previous value stays in place.
    pub fn refresh(&self, root: &ConfigurationRoot) -> Result<bool> {
        let next = root.bind::<T>(&self.section)?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(section = %self.section, "Options changed");
        }
        Ok(changed)
    }

    /// Refreshes on every reload of `root` until `cancel` fires.
    pub fn watch(self: &Arc<Self>, root: Arc<ConfigurationRoot>, cancel: CancellationToken) -> JoinHandle<()> {
        let producer_root = Arc::clone(&root);
        let monitor = Arc::clone(self);
        on_change(
            move || producer_root.reload_token(),
            move || {
                let root = Arc::clone(&root);
                let monitor = Arc::clone(&monitor);
                async move {
                    if let Err(e) = monitor.refresh(&root) {
                        warn!(section = %monitor.section, "Keeping previous options: {}", e);
                    }
                }
            },
            cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_token::{ChangeToken, ReloadToken};
    use crate::data::ConfigurationData;
    use crate::source::ConfigurationSource;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::time::Duration;

    /// Layer whose data the test replaces.
    struct MutableSource {
        data: Mutex<Arc<ConfigurationData>>,
        token: Mutex<ReloadToken>,
    }

    impl MutableSource {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                data: Mutex::new(Arc::new(pairs.iter().copied().collect())),
                token: Mutex::new(ReloadToken::new()),
            })
        }

        fn set(&self, pairs: &[(&str, &str)]) {
            *self.data.lock() = Arc::new(pairs.iter().copied().collect());
            std::mem::take(&mut *self.token.lock()).notify();
        }
    }

    impl ConfigurationSource for MutableSource {
        fn name(&self) -> &str {
            "mutable"
        }

        fn data(&self) -> Arc<ConfigurationData> {
            self.data.lock().clone()
        }

        fn reload_token(&self) -> Box<dyn ChangeToken> {
            Box::new(self.token.lock().clone())
        }
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Sample {
        name: String,
    }

    fn root(source: &Arc<MutableSource>) -> Arc<ConfigurationRoot> {
        Arc::new(ConfigurationRoot::new(vec![source.clone()]))
    }

    #[test]
    fn test_refresh_only_sends_differences() {
        let source = MutableSource::new(&[("ns:name", "orders")]);
        let root = root(&source);
        let monitor = OptionsMonitor::<Sample>::bind(&root, "ns").unwrap();
        let rx = monitor.subscribe();

        assert!(!monitor.refresh(&root).unwrap());
        assert!(!rx.has_changed().unwrap());

        source.set(&[("ns:name", "billing")]);
        assert!(monitor.refresh(&root).unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(monitor.current().name, "billing");
    }

    #[test]
    fn test_binding_error_keeps_previous_value() {
        let source = MutableSource::new(&[("ns:name", "orders")]);
        let root = root(&source);
        let monitor = OptionsMonitor::<Sample>::bind(&root, "ns").unwrap();

        source.set(&[("other:key", "x")]);
        assert!(monitor.refresh(&root).is_err());
        assert_eq!(monitor.current().name, "orders");
    }

    #[tokio::test]
    async fn test_watch_follows_reloads() {
        let source = MutableSource::new(&[("ns:name", "orders")]);
        let root = root(&source);
        let monitor = Arc::new(OptionsMonitor::<Sample>::bind(&root, "ns").unwrap());
        let mut rx = monitor.subscribe();
        let cancel = CancellationToken::new();
        let handle = monitor.watch(Arc::clone(&root), cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        source.set(&[("ns:name", "billing")]);

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("options should change")
            .unwrap();
        assert_eq!(rx.borrow_and_update().name, "billing");

        cancel.cancel();
        handle.await.unwrap();
    }
}
