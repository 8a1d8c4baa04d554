//! Store Implementation
//!
//! A [`Store`] owns the current state, applies actions through a root
//! reducer, and notifies subscribers after every committed change.
//!
//! # How Dispatch Works
//!
//! 1. The dispatch lock is taken, so dispatches run one at a time.
//!
//! 2. The root reducer runs against the current state. A reducer error or
//!    panic aborts the dispatch and the state is left as it was.
//!
//! 3. If the reducer handed back the very same `Arc`, nothing changed: no
//!    swap happens and no subscriber is called.
//!
//! 4. Otherwise the new state is swapped in atomically and every subscriber
//!    is called, in registration order, with the new state.
//!
//! Readers never take the dispatch lock. [`Store::get_state`] loads the
//! current `Arc` from an [`ArcSwap`], so readers on other threads see either
//! the old state or the new one, never a half-applied update.
//!
//! # Thread Safety
//!
//! `Store` is a cheap, cloneable handle; clones share the same state and
//! subscribers. It is `Send + Sync` whenever the state is.
//!
//! # Re-entrancy
//!
//! A reducer or subscriber that dispatches back into the store it is running
//! under gets [`StoreError::ReentrantDispatch`]. Dispatching into another
//! store is fine.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace, warn};

use super::context::DispatchContext;
use super::subscriber::{Callback, SubscriberRegistry, Subscription, Unsubscribe};
use super::watch::Watch;
use crate::action::Action;
use crate::error::{
    panic_message, BoxError, ReducerError, SelectError, StoreError, SubscriberError,
};
use crate::reducer::Reducer;
use crate::selector::{Equality, Identity, IdentityEq, Selector};

/// Counter for generating unique store IDs.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    pub(crate) fn new() -> Self {
        Self(STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Store settings.
///
/// ```rust
/// use trellis_core::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{ "name": "cart" }"#).unwrap();
/// assert_eq!(config.name, "cart");
/// assert!(!config.trace_payloads);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name recorded on every dispatch span.
    pub name: String,

    /// Log each action's payload at `trace` level. Payloads may be large or
    /// sensitive, so this is off by default.
    pub trace_payloads: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            trace_payloads: false,
        }
    }
}

impl StoreConfig {
    /// Default settings under the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// What a successful dispatch did.
#[derive(Debug)]
pub struct DispatchOutcome<S> {
    /// The state after the dispatch.
    pub state: Arc<S>,

    /// Whether the reducer produced a new state.
    pub changed: bool,

    /// How many subscribers were called.
    pub notified: usize,

    /// Failures raised by subscribers. The state is committed regardless.
    pub subscriber_errors: Vec<SubscriberError>,
}

impl<S> DispatchOutcome<S> {
    /// `true` if no subscriber failed.
    pub fn is_clean(&self) -> bool {
        self.subscriber_errors.is_empty()
    }

    /// Treat subscriber failures as an error.
    pub fn into_result(self) -> Result<Arc<S>, StoreError> {
        if self.subscriber_errors.is_empty() {
            Ok(self.state)
        } else {
            Err(StoreError::Subscribers {
                errors: self.subscriber_errors,
            })
        }
    }
}

struct StoreInner<S> {
    id: StoreId,
    config: StoreConfig,
    reducer: Box<dyn Reducer<S>>,
    state: ArcSwap<S>,
    dispatch_lock: Mutex<()>,
    subscribers: Arc<SubscriberRegistry<S>>,
    dispatch_count: AtomicU64,
    commit_count: AtomicU64,
}

/// The state container.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::{reducer, Action, Store};
///
/// let store = Store::new(
///     reducer::from_fn(|count: &Arc<i64>, action: &Action| match action.kind() {
///         "INCREMENT" => Arc::new(**count + 1),
///         _ => Arc::clone(count),
///     }),
///     0_i64,
/// );
///
/// let subscription = store.subscribe(|count: &Arc<i64>| println!("count is now {count}"));
///
/// let outcome = store.dispatch(Action::new("INCREMENT")).unwrap();
/// assert!(outcome.changed);
/// assert_eq!(outcome.notified, 1);
/// assert_eq!(*store.get_state(), 1);
///
/// subscription.unsubscribe();
/// ```
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Store<S>
where
    S: Send + Sync + 'static,
{
    /// Create a store with default settings.
    pub fn new<R>(reducer: R, initial: impl Into<Arc<S>>) -> Self
    where
        R: Reducer<S> + 'static,
    {
        Self::with_config(reducer, initial, StoreConfig::default())
    }

    /// Create a store with explicit settings.
    pub fn with_config<R>(reducer: R, initial: impl Into<Arc<S>>, config: StoreConfig) -> Self
    where
        R: Reducer<S> + 'static,
    {
        Self {
            inner: Arc::new(StoreInner {
                id: StoreId::new(),
                config,
                reducer: Box::new(reducer),
                state: ArcSwap::new(initial.into()),
                dispatch_lock: Mutex::new(()),
                subscribers: Arc::new(SubscriberRegistry::new()),
                dispatch_count: AtomicU64::new(0),
                commit_count: AtomicU64::new(0),
            }),
        }
    }

    /// Get the store's unique ID.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// The configured store name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The current state. Never blocks and never computes.
    pub fn get_state(&self) -> Arc<S> {
        self.inner.state.load_full()
    }

    /// Apply an action.
    ///
    /// Returns the reducer's error (state untouched) or the outcome of the
    /// dispatch. Subscriber failures do not fail the dispatch; they are
    /// reported in [`DispatchOutcome::subscriber_errors`].
    pub fn dispatch(&self, action: Action) -> Result<DispatchOutcome<S>, StoreError> {
        let inner = &*self.inner;

        if let Some(active) = DispatchContext::active(inner.id) {
            warn!(
                store = %inner.config.name,
                kind = %action.kind(),
                active = %active,
                "rejected re-entrant dispatch"
            );
            return Err(StoreError::ReentrantDispatch {
                kind: action.kind().to_string(),
                active,
            });
        }

        let span = debug_span!("dispatch", store = %inner.config.name, kind = %action.kind());
        let _enter = span.enter();

        let _lock = inner.dispatch_lock.lock();
        let _ctx = DispatchContext::enter(inner.id, action.kind());
        inner.dispatch_count.fetch_add(1, Ordering::Relaxed);

        if inner.config.trace_payloads {
            trace!(payload = %action.payload(), "dispatching");
        }

        let current = inner.state.load_full();
        let reduced = catch_unwind(AssertUnwindSafe(|| inner.reducer.reduce(&current, &action)));
        let next = match reduced {
            Ok(result) => result?,
            Err(payload) => {
                return Err(ReducerError::Panicked {
                    slice: None,
                    kind: action.kind().to_string(),
                    message: panic_message(payload.as_ref()),
                }
                .into())
            }
        };

        if Arc::ptr_eq(&current, &next) {
            trace!("state unchanged");
            return Ok(DispatchOutcome {
                state: current,
                changed: false,
                notified: 0,
                subscriber_errors: Vec::new(),
            });
        }

        inner.state.store(Arc::clone(&next));
        let commit = inner.commit_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(commit, "state committed");

        let (notified, subscriber_errors) = inner.subscribers.notify(&next);
        for error in &subscriber_errors {
            warn!(subscriber = %error.subscriber(), %error, "subscriber failed");
        }

        Ok(DispatchOutcome {
            state: next,
            changed: true,
            notified,
            subscriber_errors,
        })
    }

    /// Register a callback run after every committed change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        self.register(Box::new(move |state: &Arc<S>| {
            callback(state);
            Ok(())
        }))
    }

    /// Register a fallible callback. Its errors are reported in the
    /// [`DispatchOutcome`] of the dispatch that triggered it.
    pub fn try_subscribe<F, E>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<S>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.register(Box::new(move |state: &Arc<S>| callback(state).map_err(Into::into)))
    }

    pub(crate) fn register(&self, callback: Callback<S>) -> Subscription {
        let id = self.inner.subscribers.add(callback);
        trace!(store = %self.inner.config.name, subscriber = %id, "subscribed");

        let registry: Arc<dyn Unsubscribe> = self.inner.subscribers.clone();
        Subscription::new(id, Arc::downgrade(&registry))
    }

    /// Run `callback` whenever `selector`'s value changes by identity.
    ///
    /// The selector is evaluated once up front as the baseline; if that
    /// fails the error is returned and nothing is registered.
    pub fn watch<Sel, F>(&self, selector: Sel, callback: F) -> Result<Watch, SelectError>
    where
        Sel: Selector<S> + 'static,
        Sel::Output: Identity,
        F: Fn(&Sel::Output) + Send + Sync + 'static,
    {
        self.watch_with(selector, IdentityEq, callback)
    }

    /// Run `callback` whenever `selector`'s value changes under `equality`.
    pub fn watch_with<Sel, E, F>(
        &self,
        selector: Sel,
        equality: E,
        callback: F,
    ) -> Result<Watch, SelectError>
    where
        Sel: Selector<S> + 'static,
        E: Equality<Sel::Output> + 'static,
        F: Fn(&Sel::Output) + Send + Sync + 'static,
    {
        Watch::attach(self, selector, equality, callback)
    }

    /// Number of registered subscribers, watches included.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of dispatches that reached the reducer.
    pub fn dispatch_count(&self) -> u64 {
        self.inner.dispatch_count.load(Ordering::Relaxed)
    }

    /// Number of dispatches that committed a new state.
    pub fn commit_count(&self) -> u64 {
        self.inner.commit_count.load(Ordering::Relaxed)
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("subscribers", &self.inner.subscribers.len())
            .field("commits", &self.inner.commit_count.load(Ordering::Relaxed))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
