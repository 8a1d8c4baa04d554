//! Reducers
//!
//! A reducer is a pure function `(state, action) -> state'`. Reducers for
//! independent slices of the tree compose into a single root reducer with
//! [`combine_reducers`].
//!
//! # Reference Identity
//!
//! State is always handled as `Arc<S>`. A reducer that does not change its
//! slice must hand back the *same* `Arc` (a cheap `Arc::clone` of the input).
//! The store and every memoized selector downstream compare pointers, not
//! values, to decide whether anything happened:
//!
//! - the combined reducer keeps the old tree when every slice came back
//!   pointer-equal,
//! - the store skips notification when the root came back pointer-equal,
//! - selectors reading a slice see the same `Arc` and hit their cache.
//!
//! A reducer that allocates a fresh value for an action it ignores breaks all
//! three. That is a bug in the reducer; nothing here papers over it.
//!
//! Unknown action kinds must be ignored (input returned unchanged), never
//! turned into an error.

mod combine;

pub use combine::{combine_reducers, CombineReducers, CombinedReducer, StateTree};

use std::marker::PhantomData;
use std::sync::Arc;

use crate::action::Action;
use crate::error::{BoxError, ReducerError};

/// A pure state transition.
pub trait Reducer<S>: Send + Sync {
    /// Compute the next state. Return `Arc::clone(state)` when nothing changed.
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError>;
}

impl<S, R> Reducer<S> for Arc<R>
where
    R: Reducer<S> + ?Sized,
{
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        (**self).reduce(state, action)
    }
}

impl<S, R> Reducer<S> for Box<R>
where
    R: Reducer<S> + ?Sized,
{
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        (**self).reduce(state, action)
    }
}

/// Reducer backed by an infallible closure. See [`from_fn`].
pub struct FnReducer<S, F> {
    f: F,
    _state: PhantomData<fn(&S)>,
}

impl<S, F> Reducer<S> for FnReducer<S, F>
where
    F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync,
{
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        Ok((self.f)(state, action))
    }
}

/// Reducer backed by a fallible closure. See [`try_from_fn`].
pub struct TryFnReducer<S, F> {
    f: F,
    _state: PhantomData<fn(&S)>,
}

impl<S, F> Reducer<S> for TryFnReducer<S, F>
where
    F: Fn(&Arc<S>, &Action) -> Result<Arc<S>, BoxError> + Send + Sync,
{
    fn reduce(&self, state: &Arc<S>, action: &Action) -> Result<Arc<S>, ReducerError> {
        (self.f)(state, action).map_err(|source| ReducerError::failed(action.kind(), source))
    }
}

/// Build a reducer from a closure.
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::reducer::{self, Reducer};
/// use trellis_core::Action;
///
/// let counter = reducer::from_fn(|count: &Arc<i64>, action: &Action| match action.kind() {
///     "INCREMENT" => Arc::new(**count + 1),
///     _ => Arc::clone(count),
/// });
///
/// let state = Arc::new(1);
/// assert_eq!(*counter.reduce(&state, &Action::new("INCREMENT")).unwrap(), 2);
/// assert!(Arc::ptr_eq(&state, &counter.reduce(&state, &Action::new("NOOP")).unwrap()));
/// ```
pub fn from_fn<S, F>(f: F) -> FnReducer<S, F>
where
    F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync,
{
    FnReducer {
        f,
        _state: PhantomData,
    }
}

/// Build a reducer from a closure that may reject an action.
///
/// A returned error aborts the whole dispatch; no slice is committed.
pub fn try_from_fn<S, F>(f: F) -> TryFnReducer<S, F>
where
    F: Fn(&Arc<S>, &Action) -> Result<Arc<S>, BoxError> + Send + Sync,
{
    TryFnReducer {
        f,
        _state: PhantomData,
    }
}
