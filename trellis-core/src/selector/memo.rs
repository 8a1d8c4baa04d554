//! Memoized Selector
//!
//! A [`MemoSelector`] is a cached derived value that recomputes only when its
//! selected inputs change.
//!
//! # How Memoized Selectors Work
//!
//! 1. Every call evaluates the input selectors against `(state, args)`.
//!
//! 2. The selected inputs are compared with the ones stored by the previous
//!    call, using the selector's equality strategy.
//!
//! 3. If they match, the cached result is returned and the combiner does not
//!    run.
//!
//! 4. Otherwise the combiner runs and its result replaces the cache.
//!
//! The cache holds exactly one entry (the last call). Calling the same
//! selector with alternating arguments therefore misses every time; use a
//! [`KeyedSelector`](super::KeyedSelector) for that.
//!
//! # Why This Matters
//!
//! Input selectors are usually other memoized selectors. When a dispatch
//! leaves an input's result untouched (same `Arc`), every selector above it
//! hits its cache in turn, however deep the graph:
//!
//! - the `theme` slice changes
//! - `cart_items` still returns the same `Arc`
//! - `cart_total`, built on `cart_items`, does not recompute
//!
//! # Thread Safety
//!
//! Memoized selectors are thread-safe and cheap to clone; clones share the
//! cache. The combiner runs with the cache lock held, so keep it fast and do
//! not call back into the same selector from it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::cache::{MemoCell, Memoizer, SelectorMeta};
use super::inputs::InputSelectors;
use super::select::Selector;
use crate::error::SelectError;

/// Evaluation strategy behind a memoized selector handle.
pub(crate) trait Engine<S, A, R>: Send + Sync {
    /// Evaluate the selector.
    fn run(&self, state: &S, args: &A, meta: &SelectorMeta) -> Result<R, SelectError>;

    /// Drop every cache entry.
    fn clear(&self);

    /// Number of filled cache entries.
    fn entry_count(&self) -> usize;

    /// Number of input selectors.
    fn arity(&self) -> usize;
}

/// Single-entry engine.
pub(crate) struct SingleEntry<S, A, I, R>
where
    I: InputSelectors<S, A>,
{
    inputs: I,
    memoizer: Memoizer<I::Outputs, R>,
    cell: MemoCell<I::Outputs, R>,
    _marker: PhantomData<fn(&S, &A)>,
}

impl<S, A, I, R> SingleEntry<S, A, I, R>
where
    I: InputSelectors<S, A>,
    R: Clone,
{
    pub(crate) fn new(inputs: I, memoizer: Memoizer<I::Outputs, R>) -> Self {
        Self {
            inputs,
            memoizer,
            cell: MemoCell::new(),
            _marker: PhantomData,
        }
    }
}

impl<S, A, I, R> Engine<S, A, R> for SingleEntry<S, A, I, R>
where
    I: InputSelectors<S, A>,
    R: Clone + Send + Sync,
{
    fn run(&self, state: &S, args: &A, meta: &SelectorMeta) -> Result<R, SelectError> {
        let inputs = self.inputs.select_inputs(state, args)?;
        self.memoizer.lookup(&self.cell, inputs, meta)
    }

    fn clear(&self) {
        self.cell.clear();
    }

    fn entry_count(&self) -> usize {
        usize::from(self.cell.is_filled())
    }

    fn arity(&self) -> usize {
        self.inputs.arity()
    }
}

/// A selector that caches its last result.
///
/// Built with [`create_selector`](super::create_selector) or
/// [`try_create_selector`](super::try_create_selector).
///
/// # Type Parameters
///
/// - `S`: the state type the selector reads.
/// - `R`: the derived value. Cloned on every hit, so prefer `Arc` for
///   anything larger than a number.
/// - `A`: caller arguments forwarded to the input selectors (`()` when none).
pub struct MemoSelector<S, R, A = ()> {
    engine: Arc<dyn Engine<S, A, R>>,
    meta: Arc<SelectorMeta>,
}

impl<S, R, A> MemoSelector<S, R, A> {
    pub(crate) fn from_engine(engine: Arc<dyn Engine<S, A, R>>, meta: SelectorMeta) -> Self {
        Self {
            engine,
            meta: Arc::new(meta),
        }
    }

    /// Get the selector's unique ID.
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Get the selector's name (used in logs and errors).
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Number of times the combiner has run.
    pub fn recomputations(&self) -> u64 {
        self.meta.stats.recomputations()
    }

    /// Number of calls answered from the cache.
    pub fn hits(&self) -> u64 {
        self.meta.stats.hits()
    }

    /// Reset the hit and recomputation counters.
    pub fn reset_recomputations(&self) {
        self.meta.stats.reset();
    }

    /// Drop the cached entry. The next call recomputes.
    pub fn clear_cache(&self) {
        self.engine.clear();
    }

    /// Check if the selector has a cached value.
    pub fn has_value(&self) -> bool {
        self.engine.entry_count() > 0
    }

    /// Number of input selectors.
    pub fn arity(&self) -> usize {
        self.engine.arity()
    }
}

impl<S, R> MemoSelector<S, R, ()> {
    /// Evaluate an argument-free selector.
    pub fn call(&self, state: &S) -> Result<R, SelectError> {
        self.engine.run(state, &(), &self.meta)
    }
}

impl<S, R, A> Selector<S, A> for MemoSelector<S, R, A>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = R;

    fn select(&self, state: &S, args: &A) -> Result<R, SelectError> {
        self.engine.run(state, args, &self.meta)
    }
}

impl<S, R, A> Clone for MemoSelector<S, R, A> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            meta: Arc::clone(&self.meta),
        }
    }
}

impl<S, R, A> fmt::Debug for MemoSelector<S, R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoSelector")
            .field("id", &self.meta.id)
            .field("name", &self.meta.name)
            .field("has_value", &self.has_value())
            .field("recomputations", &self.recomputations())
            .field("hits", &self.hits())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{base, create_selector, try_create_selector, ValueEq};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone)]
    struct Shop {
        prices: Arc<Vec<f64>>,
        tax_rate: f64,
        theme: Arc<String>,
    }

    fn shop() -> Shop {
        Shop {
            prices: Arc::new(vec![10.0, 20.0]),
            tax_rate: 0.5,
            theme: Arc::new("light".into()),
        }
    }

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subtotal: MemoSelector<Shop, f64> = create_selector(
            (base(|s: &Shop| Arc::clone(&s.prices)),),
            move |prices: &Arc<Vec<f64>>| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
                prices.iter().sum::<f64>()
            },
        )
        .build();

        // Not computed yet
        assert!(!subtotal.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(subtotal.call(&shop()).unwrap(), 30.0);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(subtotal.has_value());
    }

    #[test]
    fn memo_caches_value_when_inputs_unchanged() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subtotal: MemoSelector<Shop, f64> = create_selector(
            (base(|s: &Shop| Arc::clone(&s.prices)),),
            move |prices: &Arc<Vec<f64>>| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
                prices.iter().sum::<f64>()
            },
        )
        .build();

        let state = shop();
        assert_eq!(subtotal.call(&state).unwrap(), 30.0);
        assert_eq!(subtotal.call(&state).unwrap(), 30.0);

        // A new state sharing the same prices allocation still hits.
        let restyled = Shop {
            theme: Arc::new("dark".into()),
            ..state.clone()
        };
        assert_eq!(subtotal.call(&restyled).unwrap(), 30.0);

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(subtotal.recomputations(), 1);
        assert_eq!(subtotal.hits(), 2);
    }

    #[test]
    fn memo_recomputes_when_any_input_changes() {
        let total: MemoSelector<Shop, f64> = create_selector(
            (
                base(|s: &Shop| Arc::clone(&s.prices)),
                base(|s: &Shop| s.tax_rate),
            ),
            |prices: &Arc<Vec<f64>>, rate: &f64| prices.iter().sum::<f64>() * (1.0 + rate),
        )
        .build();

        let state = shop();
        assert_eq!(total.call(&state).unwrap(), 45.0);

        let taxed = Shop {
            tax_rate: 0.0,
            ..state.clone()
        };
        assert_eq!(total.call(&taxed).unwrap(), 30.0);

        // Equal contents, new allocation: identity says changed.
        let repriced = Shop {
            prices: Arc::new(vec![10.0, 20.0]),
            ..taxed.clone()
        };
        assert_eq!(total.call(&repriced).unwrap(), 30.0);

        assert_eq!(total.recomputations(), 3);
    }

    #[test]
    fn value_equality_ignores_new_allocations() {
        let subtotal: MemoSelector<Shop, f64> = create_selector(
            (base(|s: &Shop| Arc::clone(&s.prices)),),
            |prices: &Arc<Vec<f64>>| prices.iter().sum::<f64>(),
        )
        .equality(ValueEq)
        .build();

        subtotal.call(&shop()).unwrap();
        subtotal.call(&shop()).unwrap();
        assert_eq!(subtotal.recomputations(), 1);
    }

    #[test]
    fn memo_clone_shares_cache() {
        let memo1: MemoSelector<Shop, usize> = create_selector(
            (base(|s: &Shop| Arc::clone(&s.prices)),),
            |prices: &Arc<Vec<f64>>| prices.len(),
        )
        .build();

        let state = shop();
        assert_eq!(memo1.call(&state).unwrap(), 2);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());
        assert_eq!(memo2.call(&state).unwrap(), 2);
        assert_eq!(memo1.recomputations(), 1);

        memo1.clear_cache();
        assert!(!memo2.has_value());
    }

    #[test]
    fn memo_depends_on_memo() {
        let subtotal: MemoSelector<Shop, f64> = create_selector(
            (base(|s: &Shop| Arc::clone(&s.prices)),),
            |prices: &Arc<Vec<f64>>| prices.iter().sum::<f64>(),
        )
        .name("subtotal")
        .build();

        let total: MemoSelector<Shop, f64> = create_selector(
            (subtotal.clone(), base(|s: &Shop| s.tax_rate)),
            |subtotal: &f64, rate: &f64| subtotal * (1.0 + rate),
        )
        .name("total")
        .build();

        let label: MemoSelector<Shop, Arc<String>> = create_selector(
            (total.clone(), base(|s: &Shop| Arc::clone(&s.theme))),
            |total: &f64, theme: &Arc<String>| Arc::new(format!("{theme}: {total:.2}")),
        )
        .build();

        let state = shop();
        assert_eq!(*label.call(&state).unwrap(), "light: 45.00");

        // Tax change: subtotal hits, total and label recompute.
        let taxed = Shop {
            tax_rate: 0.0,
            ..state.clone()
        };
        assert_eq!(*label.call(&taxed).unwrap(), "light: 30.00");
        assert_eq!(subtotal.recomputations(), 1);
        assert_eq!(total.recomputations(), 2);
        assert_eq!(label.recomputations(), 2);

        // Same tax, same prices: only the innermost inputs are read.
        label.call(&taxed).unwrap();
        assert_eq!(total.recomputations(), 2);
        assert_eq!(label.recomputations(), 2);
        assert_eq!(label.arity(), 2);
    }

    #[test]
    fn failing_combiner_reports_selector_name() {
        let checked: MemoSelector<Shop, f64> = try_create_selector(
            (base(|s: &Shop| s.tax_rate),),
            |rate: &f64| {
                if *rate < 0.0 {
                    Err(format!("negative tax rate {rate}"))
                } else {
                    Ok(*rate)
                }
            },
        )
        .name("checked_rate")
        .build();

        let state = shop();
        assert_eq!(checked.call(&state).unwrap(), 0.5);

        let broken = Shop {
            tax_rate: -1.0,
            ..state.clone()
        };
        let err = checked.call(&broken).unwrap_err();
        assert_eq!(
            err.to_string(),
            "selector `checked_rate` failed to compute: negative tax rate -1"
        );

        // Previous entry still answers.
        assert_eq!(checked.call(&state).unwrap(), 0.5);
        assert_eq!(checked.recomputations(), 1);
    }

    #[test]
    fn reset_recomputations_zeroes_counters() {
        let rate: MemoSelector<Shop, f64> =
            create_selector((base(|s: &Shop| s.tax_rate),), |rate: &f64| *rate).build();

        rate.call(&shop()).unwrap();
        rate.call(&shop()).unwrap();
        assert_eq!((rate.recomputations(), rate.hits()), (1, 1));

        rate.reset_recomputations();
        assert_eq!((rate.recomputations(), rate.hits()), (0, 0));
        assert!(rate.has_value());
    }
}
