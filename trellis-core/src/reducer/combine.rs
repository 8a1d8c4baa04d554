//! Reducer Composition
//!
//! [`CombineReducers`] turns a set of typed slice reducers into one root
//! reducer over a [`StateTree`].
//!
//! # How Combination Works
//!
//! 1. Slices are registered once, in order, each with a name, an initial
//!    value and a `Reducer<T>` for that slice's type.
//!
//! 2. On every action, each slice reducer receives its own sub-state and the
//!    action.
//!
//! 3. If every slice reducer hands back its input pointer, the root reducer
//!    hands back the input tree pointer. Otherwise it builds a new tree that
//!    shares every untouched slice with the old one.
//!
//! Slices present in the tree without a registered reducer are carried over
//! untouched.

use std::any::{type_name, Any};
use std::borrow::Cow;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::Reducer;
use crate::action::Action;
use crate::error::{panic_message, ReducerError};

/// A type-erased slice value.
type SliceValue = Arc<dyn Any + Send + Sync>;

/// A type-erased slice reducer. Returns `None` when the slice is unchanged.
type SliceFn =
    Box<dyn Fn(&SliceValue, &Action) -> Result<Option<SliceValue>, ReducerError> + Send + Sync>;

/// A state tree made of independently typed, named slices.
///
/// Cloning a tree is cheap: slices are reference counted and shared.
#[derive(Clone, Default)]
pub struct StateTree {
    slices: IndexMap<Cow<'static, str>, SliceValue>,
}

impl StateTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a slice, returning the tree.
    pub fn with_slice<T>(mut self, name: impl Into<Cow<'static, str>>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.insert_arc(name, Arc::new(value));
        self
    }

    /// Add (or replace) a slice that is already shared.
    pub fn insert_arc<T>(&mut self, name: impl Into<Cow<'static, str>>, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        self.slices.insert(name.into(), value);
    }

    /// Get a slice by name, if present and of type `T`.
    ///
    /// The returned `Arc` points at the stored slice, so two lookups on the
    /// same tree are pointer-equal.
    pub fn slice<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.slices
            .get(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Check whether a slice is present.
    pub fn contains(&self, name: &str) -> bool {
        self.slices.contains_key(name)
    }

    /// Slice names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(|name| name.as_ref())
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Check whether the tree has no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("slices", &self.slices.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct SliceEntry {
    name: Cow<'static, str>,
    initial: SliceValue,
    reduce: SliceFn,
}

/// Builder for a [`CombinedReducer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::reducer::{self, combine_reducers};
/// use trellis_core::Action;
///
/// let root = combine_reducers()
///     .slice("count", 0_i64, reducer::from_fn(|n: &Arc<i64>, action: &Action| {
///         if action.is("INCREMENT") { Arc::new(**n + 1) } else { Arc::clone(n) }
///     }))
///     .slice("theme", String::from("light"), reducer::from_fn(|t: &Arc<String>, action: &Action| {
///         if action.is("DARK") { Arc::new("dark".to_string()) } else { Arc::clone(t) }
///     }))
///     .build();
///
/// let tree = root.initial_state();
/// assert_eq!(*tree.slice::<i64>("count").unwrap(), 0);
/// ```
#[derive(Default)]
pub struct CombineReducers {
    slices: Vec<SliceEntry>,
}

/// Start building a combined root reducer.
pub fn combine_reducers() -> CombineReducers {
    CombineReducers::default()
}

impl CombineReducers {
    /// Register a slice with its initial value and reducer.
    ///
    /// Registering the same name twice replaces the earlier registration but
    /// keeps its position.
    pub fn slice<T, R>(self, name: impl Into<Cow<'static, str>>, initial: T, reducer: R) -> Self
    where
        T: Send + Sync + 'static,
        R: Reducer<T> + 'static,
    {
        self.slice_arc(name, Arc::new(initial), reducer)
    }

    /// Register a slice whose initial value is already shared.
    pub fn slice_arc<T, R>(
        mut self,
        name: impl Into<Cow<'static, str>>,
        initial: Arc<T>,
        reducer: R,
    ) -> Self
    where
        T: Send + Sync + 'static,
        R: Reducer<T> + 'static,
    {
        let name = name.into();
        let slice_name = name.clone();

        let reduce: SliceFn = Box::new(move |value: &SliceValue, action: &Action| {
            let typed = Arc::clone(value)
                .downcast::<T>()
                .map_err(|_| ReducerError::SliceType {
                    slice: slice_name.clone(),
                    expected: type_name::<T>(),
                })?;

            let next = reducer.reduce(&typed, action)?;

            if Arc::ptr_eq(&next, &typed) {
                Ok(None)
            } else {
                Ok(Some(next as SliceValue))
            }
        });

        let entry = SliceEntry {
            name,
            initial: initial as SliceValue,
            reduce,
        };

        match self.slices.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.slices.push(entry),
        }
        self
    }

    /// Finish the root reducer.
    pub fn build(self) -> CombinedReducer {
        CombinedReducer {
            slices: self.slices,
        }
    }
}

/// Root reducer over a [`StateTree`], produced by [`CombineReducers`].
pub struct CombinedReducer {
    slices: Vec<SliceEntry>,
}

impl CombinedReducer {
    /// Build the initial tree from every registered slice.
    pub fn initial_state(&self) -> StateTree {
        let mut tree = StateTree::new();
        for entry in &self.slices {
            tree.slices
                .insert(entry.name.clone(), Arc::clone(&entry.initial));
        }
        tree
    }

    /// Registered slice names in order.
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|entry| entry.name.as_ref())
    }

    fn reduce_slice(
        &self,
        entry: &SliceEntry,
        value: &SliceValue,
        action: &Action,
    ) -> Result<Option<SliceValue>, ReducerError> {
        catch_unwind(AssertUnwindSafe(|| (entry.reduce)(value, action)))
            .unwrap_or_else(|payload| {
                Err(ReducerError::Panicked {
                    slice: None,
                    kind: action.kind().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
            .map_err(|err| err.in_slice(&entry.name))
    }
}

impl Reducer<StateTree> for CombinedReducer {
    fn reduce(
        &self,
        state: &Arc<StateTree>,
        action: &Action,
    ) -> Result<Arc<StateTree>, ReducerError> {
        let mut changed: Vec<(&Cow<'static, str>, SliceValue)> = Vec::new();

        for entry in &self.slices {
            let value = state
                .slices
                .get(&entry.name)
                .ok_or_else(|| ReducerError::MissingSlice {
                    slice: entry.name.clone(),
                })?;

            if let Some(next) = self.reduce_slice(entry, value, action)? {
                changed.push((&entry.name, next));
            }
        }

        if changed.is_empty() {
            return Ok(Arc::clone(state));
        }

        trace!(
            action = action.kind(),
            slices = ?changed.iter().map(|(name, _)| name.as_ref()).collect::<Vec<_>>(),
            "slices changed"
        );

        let mut tree = StateTree::clone(state);
        for (name, value) in changed {
            tree.slices.insert(name.clone(), value);
        }
        Ok(Arc::new(tree))
    }
}
