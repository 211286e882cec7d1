//! Blocking-poll change token over a registry key prefix.
//!
//! # Rust Learning Note
//!
//! One background task per token runs the watch loop:
//!
//! ```text
//! loop {
//!     list(prefix, index = last + 1, wait = 10m)   // blocks in the registry
//!     ok   -> first answer: remember index, no change
//!             later: changed iff index moved -> fire, stop
//!     err  -> failures += 1, sleep 100ms * (failures + 1), retry
//! }
//! ```
//!
//! Both the in-flight list call and the backoff sleep sit inside
//! `tokio::select!` with the cancellation token, so cancelling (or dropping
//! the token) stops the loop without waiting for the registry to answer.

use crate::change_token::{CallbackList, CallbackRegistration, ChangeCallback, ChangeToken};
use parking_lot::Mutex;
use sable_registry::{QueryOptions, RegistryClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long one blocking query may be held open by the registry.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(600);

/// Base of the linear failure backoff.
pub const DEFAULT_BASE_FAILURE_DELAY: Duration = Duration::from_millis(100);

/// Watch loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingOptions {
    pub wait_time: Duration,
    pub base_failure_delay: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            wait_time: DEFAULT_WAIT_TIME,
            base_failure_delay: DEFAULT_BASE_FAILURE_DELAY,
        }
    }
}

/// State owned by one watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchState {
    last_index: u64,
    changed: bool,
    consecutive_failures: u32,
}

impl WatchState {
    /// State that already saw `index`; `0` leaves the baseline to the first answer.
    pub fn since(index: u64) -> Self {
        Self {
            last_index: index,
            ..Self::default()
        }
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True once the first query has completed.
    pub fn has_baseline(&self) -> bool {
        self.last_index != 0
    }

    /// Index to wait on in the next query.
    pub fn next_wait_index(&self) -> u64 {
        self.last_index.saturating_add(1)
    }

    /// Records a successful answer. Returns true if it is a change.
    ///
    /// The first answer only sets the baseline.
    pub fn observe(&mut self, index: u64) -> bool {
        self.consecutive_failures = 0;

        if self.last_index == 0 {
            self.last_index = index;
            return false;
        }

        let changed = index != self.last_index;
        self.last_index = index;
        if changed {
            self.changed = true;
        }
        changed
    }

    /// Records a failed query and returns how long to back off.
    pub fn record_failure(&mut self, base: Duration) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        base * (self.consecutive_failures + 1)
    }
}

struct Shared {
    state: Mutex<WatchState>,
    callbacks: Arc<CallbackList>,
}

/// Fires when anything under a registry prefix changes.
///
/// The watch starts on construction and needs a tokio runtime. Dropping the
/// token cancels its loop.
pub struct PollingPrefixChangeToken {
    prefix: String,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl PollingPrefixChangeToken {
    /// Starts watching `prefix`. The loop also stops when `parent` is cancelled.
    pub fn watch(
        client: Arc<dyn RegistryClient>,
        prefix: impl Into<String>,
        options: PollingOptions,
        parent: &CancellationToken,
    ) -> Self {
        Self::watch_since(client, prefix, options, 0, parent)
    }

    /// Like [`PollingPrefixChangeToken::watch`], but fires on any change
    /// after `index` instead of taking a baseline from the first answer.
    ///
    /// Callers that just read the prefix pass the index of that read, so a
    /// write landing before the first blocking query still fires.
    pub fn watch_since(
        client: Arc<dyn RegistryClient>,
        prefix: impl Into<String>,
        options: PollingOptions,
        index: u64,
        parent: &CancellationToken,
    ) -> Self {
        let prefix = prefix.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(WatchState::since(index)),
            callbacks: CallbackList::new(),
        });
        let cancel = parent.child_token();

        tokio::spawn(poll_loop(
            client,
            prefix.clone(),
            options,
            Arc::clone(&shared),
            cancel.clone(),
        ));

        Self { prefix, shared, cancel }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Copy of the current watch state.
    pub fn state(&self) -> WatchState {
        *self.shared.state.lock()
    }

    /// Stops the watch loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PollingPrefixChangeToken {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ChangeToken for PollingPrefixChangeToken {
    fn has_changed(&self) -> bool {
        self.shared.callbacks.has_fired()
    }

    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        self.shared.callbacks.register(callback)
    }
}

impl std::fmt::Debug for PollingPrefixChangeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingPrefixChangeToken")
            .field("prefix", &self.prefix)
            .field("state", &self.state())
            .finish()
    }
}

async fn poll_loop(
    client: Arc<dyn RegistryClient>,
    prefix: String,
    options: PollingOptions,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    debug!(prefix = %prefix, "Watch loop started");

    loop {
        let query = QueryOptions::blocking(shared.state.lock().next_wait_index(), options.wait_time);

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.list(&prefix, &query) => result,
        };

        match result {
            Ok(response) => {
                let changed = shared.state.lock().observe(response.last_index);
                debug!(
                    prefix = %prefix,
                    index = response.last_index,
                    elapsed_ms = response.request_time.as_millis() as u64,
                    "Blocking query returned"
                );
                if changed {
                    info!(prefix = %prefix, index = response.last_index, "Registry prefix changed");
                    shared.callbacks.fire();
                    break;
                }
            }
            Err(e) => {
                let (delay, failures) = {
                    let mut state = shared.state.lock();
                    let delay = state.record_failure(options.base_failure_delay);
                    (delay, state.consecutive_failures())
                };
                warn!(prefix = %prefix, failures, "Failed to query registry KV store: {}", e);
                debug!("Waiting for {:?} before next attempt", delay);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!(prefix = %prefix, "Watch loop stopped");
}
