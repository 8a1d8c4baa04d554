//! Selector Inputs and Combiners
//!
//! A memoized selector is built from an ordered set of input selectors and a
//! combiner over their results. Two shapes are supported:
//!
//! - fixed arity: a tuple of 1 to 8 selectors, each with its own output type,
//!   combined by a closure taking one reference per input;
//! - dynamic: a `Vec` of [`BoxedSelector`]s sharing one output type, combined
//!   by a closure taking a slice.
//!
//! Either way, the selected inputs form a single value (a tuple or a `Vec`)
//! that the memoizer compares against its cached inputs.

use super::select::{BoxedSelector, Selector};
use crate::error::SelectError;

/// An ordered set of input selectors.
pub trait InputSelectors<S, A>: Send + Sync {
    /// The selected values, in input order.
    type Outputs: Clone + Send + Sync + 'static;

    /// Evaluate every input against `(state, args)`.
    fn select_inputs(&self, state: &S, args: &A) -> Result<Self::Outputs, SelectError>;

    /// Number of inputs.
    fn arity(&self) -> usize;
}

/// A combiner over selected inputs of type `I`, producing `R`.
///
/// Implemented for closures taking one reference per tuple element
/// (`Fn(&T1, &T2) -> R` for `(T1, T2)`), and for `Fn(&[T]) -> R` over `Vec<T>`.
pub trait Combiner<I, R>: Send + Sync {
    /// Combine the selected inputs.
    fn combine(&self, inputs: &I) -> R;
}

macro_rules! impl_inputs {
    ($(($sel:ident, $out:ident, $idx:tt)),+) => {
        impl<S, A, $($sel),+> InputSelectors<S, A> for ($($sel,)+)
        where
            $($sel: Selector<S, A>,)+
        {
            type Outputs = ($($sel::Output,)+);

            #[inline]
            fn select_inputs(&self, state: &S, args: &A) -> Result<Self::Outputs, SelectError> {
                Ok(($(self.$idx.select(state, args)?,)+))
            }

            fn arity(&self) -> usize {
                [$($idx),+].len()
            }
        }

        impl<F, R, $($out),+> Combiner<($($out,)+), R> for F
        where
            F: Fn($(&$out),+) -> R + Send + Sync,
        {
            #[inline]
            fn combine(&self, inputs: &($($out,)+)) -> R {
                (self)($(&inputs.$idx),+)
            }
        }
    };
}

impl_inputs!((S1, T1, 0));
impl_inputs!((S1, T1, 0), (S2, T2, 1));
impl_inputs!((S1, T1, 0), (S2, T2, 1), (S3, T3, 2));
impl_inputs!((S1, T1, 0), (S2, T2, 1), (S3, T3, 2), (S4, T4, 3));
impl_inputs!((S1, T1, 0), (S2, T2, 1), (S3, T3, 2), (S4, T4, 3), (S5, T5, 4));
impl_inputs!(
    (S1, T1, 0),
    (S2, T2, 1),
    (S3, T3, 2),
    (S4, T4, 3),
    (S5, T5, 4),
    (S6, T6, 5)
);
impl_inputs!(
    (S1, T1, 0),
    (S2, T2, 1),
    (S3, T3, 2),
    (S4, T4, 3),
    (S5, T5, 4),
    (S6, T6, 5),
    (S7, T7, 6)
);
impl_inputs!(
    (S1, T1, 0),
    (S2, T2, 1),
    (S3, T3, 2),
    (S4, T4, 3),
    (S5, T5, 4),
    (S6, T6, 5),
    (S7, T7, 6),
    (S8, T8, 7)
);

impl<S, A, T> InputSelectors<S, A> for Vec<BoxedSelector<S, A, T>>
where
    T: Clone + Send + Sync + 'static,
{
    type Outputs = Vec<T>;

    fn select_inputs(&self, state: &S, args: &A) -> Result<Vec<T>, SelectError> {
        self.iter().map(|input| input.select(state, args)).collect()
    }

    fn arity(&self) -> usize {
        self.len()
    }
}

impl<F, R, T> Combiner<Vec<T>, R> for F
where
    F: Fn(&[T]) -> R + Send + Sync,
{
    #[inline]
    fn combine(&self, inputs: &Vec<T>) -> R {
        (self)(inputs.as_slice())
    }
}
