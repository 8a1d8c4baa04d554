//! Memoization Core
//!
//! Shared machinery behind [`MemoSelector`](super::MemoSelector) and
//! [`KeyedSelector`](super::KeyedSelector).
//!
//! # How a Lookup Works
//!
//! 1. The caller evaluates the input selectors and hands the selected inputs
//!    to a [`MemoCell`].
//!
//! 2. Under the cell's lock, the inputs are compared with the stored ones
//!    using the selector's equality strategy.
//!
//! 3. On a match the stored result is cloned out. The combiner is not called.
//!
//! 4. Otherwise the combiner runs, still under the lock, and its result
//!    replaces the entry. If the combiner fails the old entry stays.
//!
//! Running the combiner under the cell lock means two threads racing on the
//! same inputs compute once. The lock is per cell, so different selectors (or
//! different argument keys of one keyed selector) never contend.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use super::equality::Equality;
use crate::error::{BoxError, SelectError};

/// Counter for generating unique selector IDs.
static SELECTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique selector ID.
pub(crate) fn next_selector_id() -> u64 {
    SELECTOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased combiner.
pub(crate) type ComputeFn<I, R> = Box<dyn Fn(&I) -> Result<R, BoxError> + Send + Sync>;

/// Hit/miss counters for one selector.
#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    recomputations: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.recomputations.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Identity and counters of a selector, shared by its clones.
#[derive(Debug)]
pub(crate) struct SelectorMeta {
    pub(crate) id: u64,
    pub(crate) name: Cow<'static, str>,
    pub(crate) stats: CacheStats,
}

impl SelectorMeta {
    pub(crate) fn new(name: Option<Cow<'static, str>>) -> Self {
        let id = next_selector_id();
        Self {
            id,
            name: name.unwrap_or_else(|| Cow::Owned(format!("selector#{id}"))),
            stats: CacheStats::default(),
        }
    }
}

/// The last `(inputs, result)` pair seen by a cell.
struct CacheEntry<I, R> {
    inputs: I,
    result: R,
}

/// A single-entry cache.
pub(crate) struct MemoCell<I, R> {
    entry: Mutex<Option<CacheEntry<I, R>>>,
}

impl<I, R> MemoCell<I, R> {
    pub(crate) fn new() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }

    pub(crate) fn is_filled(&self) -> bool {
        self.entry.lock().is_some()
    }

    pub(crate) fn clear(&self) {
        *self.entry.lock() = None;
    }
}

/// Combiner plus equality strategies of one selector.
pub(crate) struct Memoizer<I, R> {
    combine: ComputeFn<I, R>,
    equality: Box<dyn Equality<I>>,
    result_equality: Option<Box<dyn Equality<R>>>,
}

impl<I, R> Memoizer<I, R>
where
    R: Clone,
{
    pub(crate) fn new(
        combine: ComputeFn<I, R>,
        equality: Box<dyn Equality<I>>,
        result_equality: Option<Box<dyn Equality<R>>>,
    ) -> Self {
        Self {
            combine,
            equality,
            result_equality,
        }
    }

    /// Return the cached result for `inputs`, or compute and cache it.
    pub(crate) fn lookup(
        &self,
        cell: &MemoCell<I, R>,
        inputs: I,
        meta: &SelectorMeta,
    ) -> Result<R, SelectError> {
        let mut slot = cell.entry.lock();

        if let Some(entry) = slot.as_ref() {
            if self.equality.equal(&entry.inputs, &inputs) {
                meta.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(selector = %meta.name, "cache hit");
                return Ok(entry.result.clone());
            }
        }

        let computed = (self.combine)(&inputs).map_err(|source| SelectError::Compute {
            selector: meta.name.clone(),
            source,
        })?;
        meta.stats.recomputations.fetch_add(1, Ordering::Relaxed);
        trace!(selector = %meta.name, "recomputed");

        // Keep the previous result's identity when it is equal by the
        // configured result equality.
        let result = match (&self.result_equality, slot.as_ref()) {
            (Some(eq), Some(previous)) if eq.equal(&previous.result, &computed) => {
                previous.result.clone()
            }
            _ => computed,
        };

        *slot = Some(CacheEntry {
            inputs,
            result: result.clone(),
        });
        Ok(result)
    }
}
