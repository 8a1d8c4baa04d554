//! Selectors
//!
//! This module implements derived-state computation: plain selectors, memoized
//! selectors, and per-argument (keyed) memoized selectors.
//!
//! # Concepts
//!
//! ## Base Selectors
//!
//! A base selector reads one value out of the state, with [`base`], or out of
//! the state and the caller's arguments, with [`base_with_args`]. Base
//! selectors are not cached. They should hand out `Arc`s or small copies so
//! that comparing their results is cheap.
//!
//! ## Memoized Selectors
//!
//! [`create_selector`] combines a tuple of input selectors with a combiner.
//! The result is cached against the selected inputs and only recomputed when
//! an input changes under the selector's [`Equality`] strategy. By default
//! that is [`IdentityEq`]: `Arc` inputs compare by pointer, plain values by
//! value. [`create_selector_with`] takes the strategy up front, which is how
//! selectors producing plain structs are composed.
//!
//! ## Keyed Selectors
//!
//! A selector that takes arguments and is shared between callers passing
//! different arguments should be built with
//! [`build_keyed`](SelectorBuilder::build_keyed), which keeps one cache
//! entry per argument under a [`CachePolicy`].
//!
//! # Implementation Notes
//!
//! Memoized selectors are trait objects over a small engine (single entry or
//! per key) sharing the same [`MemoCell`](cache::MemoCell) logic, so both kinds
//! report the same counters and log the same way.

mod builder;
mod cache;
mod equality;
mod inputs;
mod keyed;
mod memo;
mod select;

pub use builder::{
    create_selector, create_selector_with, try_create_selector, try_create_selector_with,
    SelectorBuilder,
};
pub use equality::{Equality, FnEq, Identity, IdentityEq, ValueEq};
pub use inputs::{Combiner, InputSelectors};
pub use keyed::{CachePolicy, KeyedSelector};
pub use memo::MemoSelector;
pub use select::{
    args, base, base_with_args, no_args, slice, ArgsFn, ArgsIdentity, BoxedSelector, NoArgs,
    Selector, SliceSelector, StateFn,
};
