//! Trellis Core
//!
//! This crate provides a predictable state container with composable,
//! memoized selectors. It implements:
//!
//! - A store that owns the state and updates it only through dispatched actions
//! - Reducers, including a combinator over named state slices
//! - Memoized selectors that recompute only when their inputs change
//! - Parameterized selectors with one cache entry per argument
//! - Subscriptions and selector watches notified after each committed change
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `action`: The `{kind, payload}` message type
//! - `reducer`: The `Reducer` trait, closure adapters and `combine_reducers`
//! - `store`: The store, its subscriber registry and watches
//! - `selector`: Base, memoized and keyed selectors
//! - `error`: Error types shared by all of the above
//!
//! State is immutable and shared through `Arc`. A reducer that does not
//! handle an action returns the same `Arc` it was given, and that pointer
//! identity is the change signal for the whole crate: the store skips
//! notification for it and selectors hit their caches.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::reducer::{self, combine_reducers, StateTree};
//! use trellis_core::selector::{create_selector, slice, MemoSelector};
//! use trellis_core::{Action, Store};
//!
//! let root = combine_reducers()
//!     .slice("count", 0_i64, reducer::from_fn(|n: &Arc<i64>, action: &Action| {
//!         match action.kind() {
//!             "INCREMENT" => Arc::new(**n + 1),
//!             _ => Arc::clone(n),
//!         }
//!     }))
//!     .slice("theme", String::from("light"), reducer::from_fn(|t: &Arc<String>, _: &Action| {
//!         Arc::clone(t)
//!     }))
//!     .build();
//!
//! let initial = root.initial_state();
//! let store = Store::new(root, initial);
//!
//! let doubled: MemoSelector<StateTree, i64> =
//!     create_selector((slice::<i64>("count"),), |n: &Arc<i64>| **n * 2).build();
//!
//! store.dispatch(Action::new("INCREMENT")).unwrap();
//! assert_eq!(doubled.call(&store.get_state()).unwrap(), 2);
//!
//! // Nothing handles NOOP, so the state and every selector stay put.
//! store.dispatch(Action::new("NOOP")).unwrap();
//! assert_eq!(doubled.call(&store.get_state()).unwrap(), 2);
//! assert_eq!(doubled.recomputations(), 1);
//! ```

pub mod action;
pub mod error;
pub mod reducer;
pub mod selector;
pub mod store;

pub use action::Action;
pub use error::{ActionError, BoxError, ReducerError, SelectError, StoreError, SubscriberError};
pub use reducer::{combine_reducers, Reducer, StateTree};
pub use selector::{
    create_selector, create_selector_with, try_create_selector, try_create_selector_with,
    KeyedSelector, MemoSelector, Selector,
};
pub use store::{
    DispatchOutcome, Store, StoreConfig, StoreId, SubscriberId, Subscription, SubscriptionGuard,
    Watch,
};
