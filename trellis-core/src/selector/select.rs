//! Selector Trait and Base Selectors
//!
//! A [`Selector`] is a pure function from `(state, args)` to a derived value.
//! Base selectors wrap plain closures that read one field; memoized selectors
//! (see [`MemoSelector`](super::MemoSelector)) combine other selectors.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::SelectError;
use crate::reducer::StateTree;

/// A pure derivation from state (and optional caller arguments).
///
/// `A` is the argument type; argument-free selectors use `()`.
pub trait Selector<S, A = ()>: Send + Sync {
    /// The derived value. Cloned out of caches, so keep it cheap (`Arc`, numbers).
    type Output: Clone + Send + Sync + 'static;

    /// Compute (or fetch from cache) the derived value.
    fn select(&self, state: &S, args: &A) -> Result<Self::Output, SelectError>;
}

/// Boxed selector with a fixed output type, used by dynamically sized inputs.
pub type BoxedSelector<S, A, T> = Box<dyn Selector<S, A, Output = T>>;

impl<S, A, T> Selector<S, A> for Arc<T>
where
    T: Selector<S, A> + ?Sized,
{
    type Output = T::Output;

    fn select(&self, state: &S, args: &A) -> Result<Self::Output, SelectError> {
        (**self).select(state, args)
    }
}

impl<S, A, T> Selector<S, A> for Box<T>
where
    T: Selector<S, A> + ?Sized,
{
    type Output = T::Output;

    fn select(&self, state: &S, args: &A) -> Result<Self::Output, SelectError> {
        (**self).select(state, args)
    }
}

/// Selector reading the state only. See [`base`].
pub struct StateFn<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<S, A, F, T> Selector<S, A> for StateFn<F, T>
where
    F: Fn(&S) -> T + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    #[inline]
    fn select(&self, state: &S, _args: &A) -> Result<T, SelectError> {
        Ok((self.f)(state))
    }
}

/// Selector reading the state and the caller's arguments. See [`base_with_args`].
pub struct ArgsFn<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<S, A, F, T> Selector<S, A> for ArgsFn<F, T>
where
    F: Fn(&S, &A) -> T + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    #[inline]
    fn select(&self, state: &S, args: &A) -> Result<T, SelectError> {
        Ok((self.f)(state, args))
    }
}

/// Base selector over the state only. Works with any argument type.
///
/// ```rust
/// use trellis_core::selector::{base, Selector};
///
/// struct Cart { total: f64 }
///
/// let total = base(|cart: &Cart| cart.total);
/// assert_eq!(total.select(&Cart { total: 12.5 }, &()).unwrap(), 12.5);
/// ```
pub fn base<S, T, F>(f: F) -> StateFn<F, T>
where
    F: Fn(&S) -> T + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    StateFn {
        f,
        _output: PhantomData,
    }
}

/// Base selector over the state and the caller's arguments.
pub fn base_with_args<S, A, T, F>(f: F) -> ArgsFn<F, T>
where
    F: Fn(&S, &A) -> T + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    ArgsFn {
        f,
        _output: PhantomData,
    }
}

/// Selector that forwards the caller's arguments as its value.
pub struct ArgsIdentity<A>(PhantomData<fn() -> A>);

impl<S, A> Selector<S, A> for ArgsIdentity<A>
where
    A: Clone + Send + Sync + 'static,
{
    type Output = A;

    #[inline]
    fn select(&self, _state: &S, args: &A) -> Result<A, SelectError> {
        Ok(args.clone())
    }
}

/// Input selector yielding the call's arguments, so a combiner can see them.
pub fn args<A>() -> ArgsIdentity<A> {
    ArgsIdentity(PhantomData)
}

/// Adapter that calls an argument-free selector from any argument context.
/// See [`no_args`].
pub struct NoArgs<Sel>(Sel);

impl<S, A, Sel> Selector<S, A> for NoArgs<Sel>
where
    Sel: Selector<S, ()>,
{
    type Output = Sel::Output;

    #[inline]
    fn select(&self, state: &S, _args: &A) -> Result<Self::Output, SelectError> {
        self.0.select(state, &())
    }
}

/// Use an argument-free selector as an input of a parameterized one.
pub fn no_args<Sel>(selector: Sel) -> NoArgs<Sel> {
    NoArgs(selector)
}

/// Base selector returning one typed slice of a [`StateTree`].
pub struct SliceSelector<T> {
    name: Cow<'static, str>,
    _slice: PhantomData<fn() -> T>,
}

impl<A, T> Selector<StateTree, A> for SliceSelector<T>
where
    T: Send + Sync + 'static,
{
    type Output = Arc<T>;

    fn select(&self, state: &StateTree, _args: &A) -> Result<Arc<T>, SelectError> {
        state.slice::<T>(&self.name).ok_or_else(|| SelectError::Slice {
            slice: self.name.clone(),
            expected: std::any::type_name::<T>(),
        })
    }
}

/// Select a slice of a [`StateTree`] by name.
///
/// The value is the stored `Arc`, so an untouched slice keeps its identity
/// across dispatches.
pub fn slice<T>(name: impl Into<Cow<'static, str>>) -> SliceSelector<T>
where
    T: Send + Sync + 'static,
{
    SliceSelector {
        name: name.into(),
        _slice: PhantomData,
    }
}
