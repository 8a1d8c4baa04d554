//! Selector Builder
//!
//! [`create_selector`] and [`try_create_selector`] start a
//! [`SelectorBuilder`]; its options are set with chained calls and it is
//! finished with [`build`](SelectorBuilder::build) (one cache entry) or
//! [`build_keyed`](SelectorBuilder::build_keyed) (one entry per argument).

use std::borrow::Cow;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::cache::{ComputeFn, Memoizer, SelectorMeta};
use super::equality::{Equality, Identity, IdentityEq};
use super::inputs::{Combiner, InputSelectors};
use super::keyed::{CachePolicy, KeyFn, KeyedSelector, PerKey};
use super::memo::{MemoSelector, SingleEntry};
use crate::error::BoxError;

/// Options for a memoized selector under construction.
pub struct SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
{
    inputs: I,
    combine: ComputeFn<I::Outputs, R>,
    name: Option<Cow<'static, str>>,
    equality: Box<dyn Equality<I::Outputs>>,
    result_equality: Option<Box<dyn Equality<R>>>,
    policy: CachePolicy,
    _marker: PhantomData<fn(&S, &A)>,
}

/// Start a memoized selector from input selectors and an infallible combiner.
///
/// Inputs are compared with [`IdentityEq`] unless
/// [`equality`](SelectorBuilder::equality) says otherwise. Inputs without an
/// [`Identity`] impl need [`create_selector_with`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trellis_core::selector::{base, create_selector, MemoSelector};
///
/// struct Cart { prices: Arc<Vec<f64>>, discount: f64 }
///
/// let total: MemoSelector<Cart, f64> = create_selector(
///     (base(|c: &Cart| Arc::clone(&c.prices)), base(|c: &Cart| c.discount)),
///     |prices: &Arc<Vec<f64>>, discount: &f64| prices.iter().sum::<f64>() - discount,
/// )
/// .name("cart_total")
/// .build();
///
/// let cart = Cart { prices: Arc::new(vec![10.0, 5.0]), discount: 2.0 };
/// assert_eq!(total.call(&cart).unwrap(), 13.0);
/// assert_eq!(total.call(&cart).unwrap(), 13.0);
/// assert_eq!(total.recomputations(), 1);
/// ```
pub fn create_selector<S, A, I, C, R>(inputs: I, combine: C) -> SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
    I::Outputs: Identity,
    C: Combiner<I::Outputs, R> + 'static,
    R: Clone + Send + Sync + 'static,
{
    create_selector_with(inputs, combine, IdentityEq)
}

/// Start a memoized selector with an explicit input equality strategy.
///
/// Unlike [`create_selector`], the selected inputs need not implement
/// [`Identity`], so selectors producing plain structs or enums can feed this
/// one when compared with [`ValueEq`](super::ValueEq) or
/// [`FnEq`](super::FnEq).
///
/// # Example
///
/// ```rust
/// use trellis_core::selector::{base, create_selector_with, MemoSelector, ValueEq};
///
/// #[derive(Clone, PartialEq)]
/// struct Totals { items: usize, price: f64 }
///
/// let totals: MemoSelector<Vec<f64>, Totals> = create_selector_with(
///     (base(|prices: &Vec<f64>| prices.clone()),),
///     |prices: &Vec<f64>| Totals { items: prices.len(), price: prices.iter().sum() },
///     ValueEq,
/// )
/// .build();
///
/// let label: MemoSelector<Vec<f64>, String> = create_selector_with(
///     (totals,),
///     |t: &Totals| format!("{} items, {:.2}", t.items, t.price),
///     ValueEq,
/// )
/// .build();
///
/// assert_eq!(label.call(&vec![1.0, 2.5]).unwrap(), "2 items, 3.50");
/// ```
pub fn create_selector_with<S, A, I, C, R, Q>(
    inputs: I,
    combine: C,
    equality: Q,
) -> SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
    C: Combiner<I::Outputs, R> + 'static,
    R: Clone + Send + Sync + 'static,
    Q: Equality<I::Outputs> + 'static,
{
    let combine: ComputeFn<I::Outputs, R> =
        Box::new(move |selected: &I::Outputs| Ok(combine.combine(selected)));
    SelectorBuilder::from_parts(inputs, combine, Box::new(equality))
}

/// Start a memoized selector whose combiner may fail.
///
/// A failure is returned to the caller as a
/// [`SelectError::Compute`](crate::error::SelectError::Compute) and leaves the
/// cache untouched.
pub fn try_create_selector<S, A, I, C, R, E>(inputs: I, combine: C) -> SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
    I::Outputs: Identity,
    C: Combiner<I::Outputs, Result<R, E>> + 'static,
    E: Into<BoxError>,
    R: Clone + Send + Sync + 'static,
{
    try_create_selector_with(inputs, combine, IdentityEq)
}

/// Fallible counterpart of [`create_selector_with`].
pub fn try_create_selector_with<S, A, I, C, R, E, Q>(
    inputs: I,
    combine: C,
    equality: Q,
) -> SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
    C: Combiner<I::Outputs, Result<R, E>> + 'static,
    E: Into<BoxError>,
    R: Clone + Send + Sync + 'static,
    Q: Equality<I::Outputs> + 'static,
{
    let combine: ComputeFn<I::Outputs, R> =
        Box::new(move |selected: &I::Outputs| combine.combine(selected).map_err(Into::into));
    SelectorBuilder::from_parts(inputs, combine, Box::new(equality))
}

impl<S, A, I, R> SelectorBuilder<S, A, I, R>
where
    I: InputSelectors<S, A>,
    R: Clone + Send + Sync + 'static,
{
    fn from_parts(
        inputs: I,
        combine: ComputeFn<I::Outputs, R>,
        equality: Box<dyn Equality<I::Outputs>>,
    ) -> Self {
        Self {
            inputs,
            combine,
            name: None,
            equality,
            result_equality: None,
            policy: CachePolicy::default(),
            _marker: PhantomData,
        }
    }

    /// Name the selector for logs and error messages.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the input equality strategy.
    pub fn equality<E>(mut self, equality: E) -> Self
    where
        E: Equality<I::Outputs> + 'static,
    {
        self.equality = Box::new(equality);
        self
    }

    /// Keep the previous result (and its identity) when a recomputation
    /// yields a result equal to it under `equality`.
    ///
    /// Off by default: a recomputation normally hands out a fresh value even
    /// if it is logically unchanged, and selectors built on top see it as a
    /// changed input.
    pub fn result_equality<E>(mut self, equality: E) -> Self
    where
        E: Equality<R> + 'static,
    {
        self.result_equality = Some(Box::new(equality));
        self
    }

    /// Retention policy for keyed selectors. Ignored by [`build`](Self::build).
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for `cache_policy(CachePolicy::Lru { capacity })`.
    pub fn lru(self, capacity: NonZeroUsize) -> Self {
        self.cache_policy(CachePolicy::Lru { capacity })
    }

    fn into_parts(self) -> (I, Memoizer<I::Outputs, R>, SelectorMeta, CachePolicy) {
        let memoizer = Memoizer::new(self.combine, self.equality, self.result_equality);
        (self.inputs, memoizer, SelectorMeta::new(self.name), self.policy)
    }

    /// Finish a selector with a single cache entry.
    pub fn build(self) -> MemoSelector<S, R, A>
    where
        S: 'static,
        A: 'static,
        I: 'static,
    {
        let (inputs, memoizer, meta, _) = self.into_parts();
        MemoSelector::from_engine(Arc::new(SingleEntry::new(inputs, memoizer)), meta)
    }

    /// Finish a selector with one cache entry per distinct argument value.
    pub fn build_keyed(self) -> KeyedSelector<S, R, A>
    where
        S: 'static,
        A: Hash + Eq + Clone + Send + Sync + 'static,
        I: 'static,
    {
        self.build_keyed_by(A::clone)
    }

    /// Finish a selector with one cache entry per key derived from the
    /// arguments by `key`.
    pub fn build_keyed_by<K, F>(self, key: F) -> KeyedSelector<S, R, A>
    where
        S: 'static,
        A: 'static,
        I: 'static,
        K: Hash + Eq + Send + Sync + 'static,
        F: Fn(&A) -> K + Send + Sync + 'static,
    {
        let (inputs, memoizer, meta, policy) = self.into_parts();
        let key: KeyFn<A, K> = Box::new(key);
        KeyedSelector::from_engine(
            Arc::new(PerKey::new(inputs, key, memoizer, policy)),
            meta,
            policy,
        )
    }
}
