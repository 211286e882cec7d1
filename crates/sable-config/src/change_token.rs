//! Change tokens.
//!
//! # Rust Learning Note
//!
//! A change token is a single-fire signal: once it reports a change it stays
//! changed, and a consumer that wants the next change asks the producer for
//! a fresh token. Three kinds exist:
//!
//! - [`ReloadToken`]: fired by hand (`notify`)
//! - [`CompositeChangeToken`]: fires when any inner token fires
//! - [`crate::PollingPrefixChangeToken`]: fires when a registry prefix moves
//!
//! Callbacks are held by an `Arc<CallbackList>`. A [`CallbackRegistration`]
//! only keeps a `Weak` back-reference, so a registration that outlives its
//! token does not keep the token alive:
//!
//! ```rust
//! use sable_config::{ChangeToken, ReloadToken};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let token = ReloadToken::new();
//! let seen = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&seen);
//! let _registration = token.register_change_callback(Box::new(move || {
//!     flag.store(true, Ordering::SeqCst);
//! }));
//!
//! token.notify();
//! assert!(token.has_changed());
//! assert!(seen.load(Ordering::SeqCst));
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Callback run once when a token fires.
pub type ChangeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Single-fire change signal.
pub trait ChangeToken: Send + Sync {
    /// True once the token has fired.
    fn has_changed(&self) -> bool;

    /// Runs `callback` when the token fires, or right away if it already has.
    ///
    /// Dropping the returned registration unregisters the callback.
    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration;
}

impl<T: ChangeToken + ?Sized> ChangeToken for Box<T> {
    fn has_changed(&self) -> bool {
        (**self).has_changed()
    }

    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        (**self).register_change_callback(callback)
    }
}

impl<T: ChangeToken + ?Sized> ChangeToken for Arc<T> {
    fn has_changed(&self) -> bool {
        (**self).has_changed()
    }

    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        (**self).register_change_callback(callback)
    }
}

#[derive(Default)]
struct CallbackListState {
    fired: bool,
    next_id: u64,
    callbacks: Vec<(u64, ChangeCallback)>,
}

/// Registered callbacks of one token.
#[derive(Default)]
pub(crate) struct CallbackList {
    state: Mutex<CallbackListState>,
}

impl CallbackList {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.state.lock().fired
    }

    pub(crate) fn register(self: &Arc<Self>, callback: ChangeCallback) -> CallbackRegistration {
        let mut state = self.state.lock();
        if state.fired {
            drop(state);
            callback();
            return CallbackRegistration::noop();
        }

        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.push((id, callback));
        CallbackRegistration {
            inner: RegistrationInner::Single {
                list: Arc::downgrade(self),
                id,
            },
        }
    }

    /// Fires the list. Returns false if it had already fired.
    pub(crate) fn fire(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.callbacks)
        };

        // Run outside the lock: a callback may register on this same list.
        for (_, callback) in callbacks {
            callback();
        }
        true
    }

    fn remove(&self, id: u64) {
        self.state.lock().callbacks.retain(|(existing, _)| *existing != id);
    }
}

enum RegistrationInner {
    Noop,
    Single { list: Weak<CallbackList>, id: u64 },
}

/// Handle to a registered callback; dropping it unregisters the callback.
#[must_use = "dropping a registration unregisters its callback"]
pub struct CallbackRegistration {
    inner: RegistrationInner,
}

impl CallbackRegistration {
    /// A registration that owns nothing.
    pub fn noop() -> Self {
        Self {
            inner: RegistrationInner::Noop,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.inner, RegistrationInner::Noop)
    }
}

impl Drop for CallbackRegistration {
    fn drop(&mut self) {
        if let RegistrationInner::Single { list, id } = &self.inner {
            if let Some(list) = list.upgrade() {
                list.remove(*id);
            }
        }
    }
}

impl std::fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            RegistrationInner::Noop => "noop",
            RegistrationInner::Single { .. } => "single",
        };
        f.debug_struct("CallbackRegistration").field("kind", &kind).finish()
    }
}

/// Token fired by hand. Clones share the same signal.
#[derive(Clone)]
pub struct ReloadToken {
    callbacks: Arc<CallbackList>,
}

impl ReloadToken {
    pub fn new() -> Self {
        Self {
            callbacks: CallbackList::new(),
        }
    }

    /// Fires the token. Later calls do nothing.
    pub fn notify(&self) {
        self.callbacks.fire();
    }
}

impl Default for ReloadToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeToken for ReloadToken {
    fn has_changed(&self) -> bool {
        self.callbacks.has_fired()
    }

    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        self.callbacks.register(callback)
    }
}

/// Fires when any of its inner tokens fires.
pub struct CompositeChangeToken {
    callbacks: Arc<CallbackList>,
    tokens: Vec<Box<dyn ChangeToken>>,
    _inner: Vec<CallbackRegistration>,
}

impl CompositeChangeToken {
    pub fn new(tokens: Vec<Box<dyn ChangeToken>>) -> Self {
        let callbacks = CallbackList::new();
        let inner = tokens
            .iter()
            .map(|token| {
                let weak = Arc::downgrade(&callbacks);
                token.register_change_callback(Box::new(move || {
                    if let Some(list) = weak.upgrade() {
                        list.fire();
                    }
                }))
            })
            .collect();

        Self {
            callbacks,
            tokens,
            _inner: inner,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl ChangeToken for CompositeChangeToken {
    fn has_changed(&self) -> bool {
        self.callbacks.has_fired() || self.tokens.iter().any(|t| t.has_changed())
    }

    fn register_change_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        self.callbacks.register(callback)
    }
}

/// Resolves once `token` fires.
pub async fn changed(token: &dyn ChangeToken) {
    let (tx, rx) = oneshot::channel::<()>();
    let _registration = token.register_change_callback(Box::new(move || {
        let _ = tx.send(());
    }));
    let _ = rx.await;
}

/// Runs `consumer` every time a token minted by `producer` fires.
///
/// A fresh token is requested after each change, so the loop keeps
/// following the source until `cancel` fires.
pub fn on_change<P, T, F, Fut>(producer: P, mut consumer: F, cancel: CancellationToken) -> JoinHandle<()>
where
    P: Fn() -> T + Send + 'static,
    T: ChangeToken + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let token = producer();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Change subscription cancelled");
                    break;
                }
                _ = changed(&token) => {
                    consumer().await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let make = move || -> ChangeCallback {
            let shared = Arc::clone(&shared);
            Box::new(move || {
                shared.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_reload_token_fires_once() {
        let token = ReloadToken::new();
        let (count, make) = counter();
        let _a = token.register_change_callback(make());
        let _b = token.register_change_callback(make());

        assert!(!token.has_changed());
        token.notify();
        token.notify();

        assert!(token.has_changed());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_after_fire_runs_immediately() {
        let token = ReloadToken::new();
        token.notify();

        let (count, make) = counter();
        let registration = token.register_change_callback(make());
        assert!(registration.is_noop());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_is_not_called() {
        let token = ReloadToken::new();
        let (count, make) = counter();
        drop(token.register_change_callback(make()));

        token.notify();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_noop_registration_is_stateless() {
        let a = CallbackRegistration::noop();
        let b = CallbackRegistration::noop();
        assert!(a.is_noop() && b.is_noop());
        drop(a);
        drop(b);
    }

    #[test]
    fn test_composite_fires_on_any_inner() {
        let first = ReloadToken::new();
        let second = ReloadToken::new();
        let composite = CompositeChangeToken::new(vec![Box::new(first.clone()), Box::new(second.clone())]);
        let (count, make) = counter();
        let _registration = composite.register_change_callback(make());

        assert_eq!(composite.len(), 2);
        assert!(!composite.has_changed());

        second.notify();
        assert!(composite.has_changed());
        first.notify();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_composite_over_fired_token() {
        let fired = ReloadToken::new();
        fired.notify();
        let composite = CompositeChangeToken::new(vec![Box::new(fired)]);
        assert!(composite.has_changed());
    }

    #[tokio::test]
    async fn test_changed_resolves_on_notify() {
        let token = ReloadToken::new();
        let notifier = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            notifier.notify();
        });

        tokio::time::timeout(Duration::from_secs(1), changed(&token))
            .await
            .expect("token should fire");
    }

    #[tokio::test]
    async fn test_on_change_follows_fresh_tokens() {
        let current = Arc::new(Mutex::new(ReloadToken::new()));
        let (count, _) = counter();
        let cancel = CancellationToken::new();

        let producer_slot = Arc::clone(&current);
        let seen = Arc::clone(&count);
        let handle = on_change(
            move || producer_slot.lock().clone(),
            move || {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            },
            cancel.clone(),
        );

        for expected in 1..=2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let fired = std::mem::take(&mut *current.lock());
            fired.notify();
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(count.load(Ordering::SeqCst), expected);
        }

        cancel.cancel();
        handle.await.unwrap();
    }
}
