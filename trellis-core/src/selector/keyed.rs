//! Parameterized Selectors
//!
//! A [`KeyedSelector`] keeps one independent cache entry per distinct
//! argument set. Without that, a selector called alternately with
//! `"fruit"` and `"dairy"` would miss on every call, and everything built on
//! top of it would recompute too.
//!
//! # Cache Keys
//!
//! By default the key is the argument value itself (`A: Hash + Eq + Clone`),
//! so two equal argument values share an entry. A key function can be
//! supplied instead, for instance to key by `Arc::as_ptr` (identity) or by
//! one field of a larger argument struct.
//!
//! # Growth
//!
//! With [`CachePolicy::Unbounded`] (the default) entries are never evicted:
//! memory grows with the number of distinct keys ever seen. Callers with an
//! open-ended key space should pick [`CachePolicy::Lru`], which drops the
//! least recently used key once `capacity` is exceeded. An evicted key simply
//! recomputes on its next call.
//!
//! # Locking
//!
//! Each key owns its own [`MemoCell`], so computations for different keys do
//! not serialize on each other. A key enters the cache only after its first
//! successful computation; two callers racing on a brand new key may both
//! compute it. Unbounded caches use a sharded `DashMap`; LRU caches keep their
//! order in an `IndexMap` behind a short-lived mutex.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cache::{CacheStats, MemoCell, Memoizer, SelectorMeta};
use super::inputs::InputSelectors;
use super::memo::Engine;
use super::select::Selector;
use crate::error::SelectError;

/// Retention policy for per-argument cache entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep every entry forever.
    #[default]
    Unbounded,

    /// Keep at most `capacity` entries, evicting the least recently used.
    Lru { capacity: NonZeroUsize },
}

/// Per-key cells under one of the two policies.
enum KeyedCells<K, I, R> {
    Unbounded(DashMap<K, Arc<MemoCell<I, R>>>),
    Lru {
        capacity: usize,
        cells: Mutex<IndexMap<K, Arc<MemoCell<I, R>>>>,
    },
}

impl<K, I, R> KeyedCells<K, I, R>
where
    K: Hash + Eq,
{
    fn new(policy: CachePolicy) -> Self {
        match policy {
            CachePolicy::Unbounded => Self::Unbounded(DashMap::new()),
            CachePolicy::Lru { capacity } => Self::Lru {
                capacity: capacity.get(),
                cells: Mutex::new(IndexMap::new()),
            },
        }
    }

    /// Find the cell for `key`, marking it most recently used.
    fn get(&self, key: &K) -> Option<Arc<MemoCell<I, R>>> {
        match self {
            Self::Unbounded(cells) => cells.get(key).map(|cell| Arc::clone(cell.value())),
            Self::Lru { cells, .. } => {
                let mut cells = cells.lock();
                let index = cells.get_index_of(key)?;
                let last = cells.len() - 1;
                cells.move_index(index, last);
                Some(Arc::clone(&cells[last]))
            }
        }
    }

    /// Store a freshly filled cell for `key`, evicting as the policy requires.
    ///
    /// A cell stored for the same key by a concurrent caller is kept.
    fn insert(&self, key: K, cell: Arc<MemoCell<I, R>>, stats: &CacheStats) {
        match self {
            Self::Unbounded(cells) => {
                cells.entry(key).or_insert(cell);
            }
            Self::Lru { capacity, cells } => {
                let mut cells = cells.lock();
                let index = match cells.get_index_of(&key) {
                    Some(index) => index,
                    None => cells.insert_full(key, cell).0,
                };
                let last = cells.len() - 1;
                cells.move_index(index, last);

                while cells.len() > *capacity {
                    cells.shift_remove_index(0);
                    stats.record_eviction();
                }
            }
        }
    }

    fn clear(&self) {
        match self {
            Self::Unbounded(cells) => cells.clear(),
            Self::Lru { cells, .. } => cells.lock().clear(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Unbounded(cells) => cells.len(),
            Self::Lru { cells, .. } => cells.lock().len(),
        }
    }
}

/// Key function over the caller's arguments.
pub(crate) type KeyFn<A, K> = Box<dyn Fn(&A) -> K + Send + Sync>;

/// Per-key engine.
pub(crate) struct PerKey<S, A, K, I, R>
where
    I: InputSelectors<S, A>,
{
    inputs: I,
    key: KeyFn<A, K>,
    memoizer: Memoizer<I::Outputs, R>,
    cells: KeyedCells<K, I::Outputs, R>,
    _marker: PhantomData<fn(&S)>,
}

impl<S, A, K, I, R> PerKey<S, A, K, I, R>
where
    I: InputSelectors<S, A>,
    K: Hash + Eq,
    R: Clone,
{
    pub(crate) fn new(
        inputs: I,
        key: KeyFn<A, K>,
        memoizer: Memoizer<I::Outputs, R>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            inputs,
            key,
            memoizer,
            cells: KeyedCells::new(policy),
            _marker: PhantomData,
        }
    }
}

impl<S, A, K, I, R> Engine<S, A, R> for PerKey<S, A, K, I, R>
where
    I: InputSelectors<S, A>,
    K: Hash + Eq + Send + Sync,
    R: Clone + Send + Sync,
{
    fn run(&self, state: &S, args: &A, meta: &SelectorMeta) -> Result<R, SelectError> {
        let inputs = self.inputs.select_inputs(state, args)?;
        let key = (self.key)(args);

        if let Some(cell) = self.cells.get(&key) {
            return self.memoizer.lookup(&cell, inputs, meta);
        }

        // A new key is only stored once its first computation succeeds, so a
        // failure neither evicts another key nor leaves an empty entry.
        let cell = Arc::new(MemoCell::new());
        let result = self.memoizer.lookup(&cell, inputs, meta)?;
        self.cells.insert(key, cell, &meta.stats);
        Ok(result)
    }

    fn clear(&self) {
        self.cells.clear();
    }

    fn entry_count(&self) -> usize {
        self.cells.len()
    }

    fn arity(&self) -> usize {
        self.inputs.arity()
    }
}

/// A selector keeping one cache entry per distinct argument key.
///
/// Built with [`SelectorBuilder::build_keyed`](super::SelectorBuilder::build_keyed)
/// or [`SelectorBuilder::build_keyed_by`](super::SelectorBuilder::build_keyed_by).
pub struct KeyedSelector<S, R, A> {
    engine: Arc<dyn Engine<S, A, R>>,
    meta: Arc<SelectorMeta>,
    policy: CachePolicy,
}

impl<S, R, A> KeyedSelector<S, R, A> {
    pub(crate) fn from_engine(
        engine: Arc<dyn Engine<S, A, R>>,
        meta: SelectorMeta,
        policy: CachePolicy,
    ) -> Self {
        Self {
            engine,
            meta: Arc::new(meta),
            policy,
        }
    }

    /// Get the selector's unique ID.
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Get the selector's name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The retention policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Number of times the combiner has run, across all keys.
    pub fn recomputations(&self) -> u64 {
        self.meta.stats.recomputations()
    }

    /// Number of calls answered from a cache entry, across all keys.
    pub fn hits(&self) -> u64 {
        self.meta.stats.hits()
    }

    /// Number of keys dropped by the LRU policy.
    pub fn evictions(&self) -> u64 {
        self.meta.stats.evictions()
    }

    /// Reset hit, recomputation and eviction counters.
    pub fn reset_recomputations(&self) {
        self.meta.stats.reset();
    }

    /// Number of argument keys currently holding an entry.
    pub fn entry_count(&self) -> usize {
        self.engine.entry_count()
    }

    /// Drop every per-key entry.
    pub fn clear_cache(&self) {
        self.engine.clear();
    }
}

impl<S, R, A> Selector<S, A> for KeyedSelector<S, R, A>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = R;

    fn select(&self, state: &S, args: &A) -> Result<R, SelectError> {
        self.engine.run(state, args, &self.meta)
    }
}

impl<S, R, A> Clone for KeyedSelector<S, R, A> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            meta: Arc::clone(&self.meta),
            policy: self.policy,
        }
    }
}

impl<S, R, A> fmt::Debug for KeyedSelector<S, R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedSelector")
            .field("id", &self.meta.id)
            .field("name", &self.meta.name)
            .field("policy", &self.policy)
            .field("entries", &self.entry_count())
            .field("recomputations", &self.recomputations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{args, base, create_selector, try_create_selector};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone)]
    struct Item {
        category: &'static str,
        price: f64,
    }

    struct Catalog {
        items: Arc<Vec<Item>>,
    }

    fn catalog() -> Catalog {
        Catalog {
            items: Arc::new(vec![
                Item {
                    category: "fruit",
                    price: 2.0,
                },
                Item {
                    category: "dairy",
                    price: 3.0,
                },
                Item {
                    category: "fruit",
                    price: 4.0,
                },
            ]),
        }
    }

    fn category_total(
        policy: CachePolicy,
        calls: Arc<AtomicI32>,
    ) -> KeyedSelector<Catalog, f64, String> {
        create_selector(
            (base(|c: &Catalog| Arc::clone(&c.items)), args::<String>()),
            move |items: &Arc<Vec<Item>>, category: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                items
                    .iter()
                    .filter(|item| item.category == category)
                    .map(|item| item.price)
                    .sum::<f64>()
            },
        )
        .name("category_total")
        .cache_policy(policy)
        .build_keyed()
    }

    #[test]
    fn keyed_entries_are_independent() {
        let calls = Arc::new(AtomicI32::new(0));
        let total = category_total(CachePolicy::Unbounded, calls.clone());
        let state = catalog();

        assert_eq!(total.select(&state, &"fruit".to_string()).unwrap(), 6.0);
        assert_eq!(total.select(&state, &"dairy".to_string()).unwrap(), 3.0);
        assert_eq!(total.select(&state, &"fruit".to_string()).unwrap(), 6.0);

        // fruit, dairy computed once each; the second fruit call hit.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(total.hits(), 1);
        assert_eq!(total.entry_count(), 2);
    }

    #[test]
    fn keyed_entry_invalidates_on_input_change() {
        let calls = Arc::new(AtomicI32::new(0));
        let total = category_total(CachePolicy::Unbounded, calls.clone());

        let first = catalog();
        total.select(&first, &"fruit".to_string()).unwrap();

        let restocked = Catalog {
            items: Arc::new(vec![Item {
                category: "fruit",
                price: 1.0,
            }]),
        };
        assert_eq!(total.select(&restocked, &"fruit".to_string()).unwrap(), 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(total.entry_count(), 1);
    }

    #[test]
    fn lru_policy_evicts_least_recently_used() {
        let calls = Arc::new(AtomicI32::new(0));
        let capacity = NonZeroUsize::new(2).unwrap();
        let total = category_total(CachePolicy::Lru { capacity }, calls.clone());
        let state = catalog();

        total.select(&state, &"fruit".to_string()).unwrap();
        total.select(&state, &"dairy".to_string()).unwrap();
        // Touch fruit so dairy becomes the oldest.
        total.select(&state, &"fruit".to_string()).unwrap();
        total.select(&state, &"bakery".to_string()).unwrap();

        assert_eq!(total.entry_count(), 2);
        assert_eq!(total.evictions(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // fruit survived, dairy was evicted and recomputes faithfully.
        total.select(&state, &"fruit".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(total.select(&state, &"dairy".to_string()).unwrap(), 3.0);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    /// Sum of the `n` cheapest prices; fails for negative `n`.
    fn cheapest(policy: CachePolicy, calls: Arc<AtomicI32>) -> KeyedSelector<Catalog, f64, i64> {
        try_create_selector(
            (base(|c: &Catalog| Arc::clone(&c.items)), args::<i64>()),
            move |items: &Arc<Vec<Item>>, n: &i64| -> Result<f64, &'static str> {
                calls.fetch_add(1, Ordering::SeqCst);
                let n = usize::try_from(*n).map_err(|_| "count must not be negative")?;
                let mut prices: Vec<f64> = items.iter().map(|item| item.price).collect();
                prices.sort_by(f64::total_cmp);
                Ok(prices.into_iter().take(n).sum())
            },
        )
        .name("cheapest")
        .cache_policy(policy)
        .build_keyed()
    }

    #[test]
    fn lru_failure_keeps_other_keys() {
        let calls = Arc::new(AtomicI32::new(0));
        let capacity = NonZeroUsize::new(1).unwrap();
        let cheapest = cheapest(CachePolicy::Lru { capacity }, calls.clone());
        let state = catalog();

        assert_eq!(cheapest.select(&state, &1).unwrap(), 2.0);

        let err = cheapest.select(&state, &-1).unwrap_err();
        assert!(matches!(err, SelectError::Compute { .. }));

        // Key 1 is still cached: no recomputation, no eviction.
        assert_eq!(cheapest.select(&state, &1).unwrap(), 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cheapest.evictions(), 0);
        assert_eq!(cheapest.entry_count(), 1);
        assert_eq!(cheapest.hits(), 1);
    }

    #[test]
    fn unbounded_failures_leave_no_entries() {
        let calls = Arc::new(AtomicI32::new(0));
        let cheapest = cheapest(CachePolicy::Unbounded, calls.clone());
        let state = catalog();

        for n in -5..0 {
            assert!(cheapest.select(&state, &n).is_err());
        }
        assert_eq!(cheapest.entry_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        assert_eq!(cheapest.select(&state, &2).unwrap(), 5.0);
        assert!(cheapest.select(&state, &-1).is_err());
        assert_eq!(cheapest.select(&state, &2).unwrap(), 5.0);
        assert_eq!(cheapest.entry_count(), 1);
        assert_eq!(cheapest.hits(), 1);
    }

    #[test]
    fn failing_key_never_evicts_cached_keys() {
        let calls = Arc::new(AtomicI32::new(0));
        let capacity = NonZeroUsize::new(2).unwrap();
        let cheapest = cheapest(CachePolicy::Lru { capacity }, calls.clone());
        let state = catalog();

        cheapest.select(&state, &1).unwrap();
        cheapest.select(&state, &3).unwrap();
        assert!(cheapest.select(&state, &-2).is_err());
        assert!(cheapest.select(&state, &-2).is_err());

        // Neither cached key was pushed out by the failing one.
        cheapest.select(&state, &1).unwrap();
        cheapest.select(&state, &3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cheapest.evictions(), 0);
    }

    #[test]
    fn custom_key_function_groups_arguments() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let threshold: KeyedSelector<Catalog, usize, (u32, &'static str)> = create_selector(
            (base(|c: &Catalog| Arc::clone(&c.items)), args::<(u32, &'static str)>()),
            move |items: &Arc<Vec<Item>>, args: &(u32, &'static str)| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                items.iter().filter(|item| item.price >= f64::from(args.0)).count()
            },
        )
        .build_keyed_by(|args: &(u32, &'static str)| args.0);

        let state = catalog();
        assert_eq!(threshold.select(&state, &(3, "first caller")).unwrap(), 2);
        // Same key, but the args input differs, so the entry recomputes in place.
        assert_eq!(threshold.select(&state, &(3, "second caller")).unwrap(), 2);
        assert_eq!(threshold.entry_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cache_policy_deserializes() {
        let policy: CachePolicy = serde_json::from_str(r#"{"kind":"lru","capacity":16}"#).unwrap();
        assert_eq!(
            policy,
            CachePolicy::Lru {
                capacity: NonZeroUsize::new(16).unwrap()
            }
        );

        let policy: CachePolicy = serde_json::from_str(r#"{"kind":"unbounded"}"#).unwrap();
        assert_eq!(policy, CachePolicy::Unbounded);
    }

    #[test]
    fn clear_cache_drops_all_keys() {
        let calls = Arc::new(AtomicI32::new(0));
        let total = category_total(CachePolicy::Unbounded, calls.clone());
        let state = catalog();

        total.select(&state, &"fruit".to_string()).unwrap();
        total.select(&state, &"dairy".to_string()).unwrap();
        total.clear_cache();
        assert_eq!(total.entry_count(), 0);

        total.select(&state, &"fruit".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
