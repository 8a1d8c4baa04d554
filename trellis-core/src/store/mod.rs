//! State Store
//!
//! This module implements the store: the single owner of application state,
//! the dispatch path that updates it, and the subscriber registry that
//! reports committed changes.
//!
//! # Concepts
//!
//! ## Store
//!
//! A [`Store`] holds the current state behind an atomically swapped `Arc`.
//! [`Store::dispatch`] runs the root reducer and commits the result only if
//! it is a different `Arc` from the current state.
//!
//! ## Subscriptions
//!
//! A [`Subscription`] is a callback run after each commit with the new
//! state. It stays registered until [`Subscription::unsubscribe`] is called
//! or, for a [`SubscriptionGuard`], until the guard is dropped.
//!
//! ## Watches
//!
//! A [`Watch`] runs its callback only when a selector's value changes, which
//! is what most views want.

mod context;
#[allow(clippy::module_inception)]
mod store;
mod subscriber;
mod watch;

pub use store::{DispatchOutcome, Store, StoreConfig, StoreId};
pub use subscriber::{SubscriberId, Subscription, SubscriptionGuard};
pub use watch::Watch;
