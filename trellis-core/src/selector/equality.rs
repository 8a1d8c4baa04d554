//! Equality Strategies
//!
//! A memoized selector decides whether its cache entry still applies by
//! comparing the freshly selected inputs with the stored ones. How that
//! comparison is done is an explicit [`Equality`] strategy chosen when the
//! selector is built.
//!
//! # Strategies
//!
//! - [`IdentityEq`] (the default): reference identity for shared values
//!   (`Arc::ptr_eq`), plain value equality for primitives and strings,
//!   element-wise for tuples, options and vectors. See [`Identity`].
//! - [`ValueEq`]: `PartialEq` all the way down.
//! - [`FnEq`]: any closure.

use std::borrow::Cow;
use std::sync::Arc;

/// Cheap "is this the same value" check used by [`IdentityEq`].
///
/// Shared values (`Arc<T>`) compare by pointer. Everything that has no
/// meaningful identity of its own (numbers, strings, `()`) compares by value.
/// Containers compare element-wise with the same rule.
pub trait Identity {
    /// Check whether `self` and `other` are the same value.
    fn identical(&self, other: &Self) -> bool;
}

macro_rules! identity_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                #[inline]
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identity_by_value!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str, Cow<'static, str>,
);

impl<T: ?Sized> Identity for Arc<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Identity> Identity for Vec<T> {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.identical(b))
    }
}

macro_rules! identity_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: Identity),+> Identity for ($($name,)+) {
            #[inline]
            fn identical(&self, other: &Self) -> bool {
                $(self.$idx.identical(&other.$idx))&&+
            }
        }
    };
}

identity_tuple!(A 0);
identity_tuple!(A 0, B 1);
identity_tuple!(A 0, B 1, C 2);
identity_tuple!(A 0, B 1, C 2, D 3);
identity_tuple!(A 0, B 1, C 2, D 3, E 4);
identity_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
identity_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
identity_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// An equality strategy over values of type `T`.
pub trait Equality<T: ?Sized>: Send + Sync {
    /// Check whether two values are equal under this strategy.
    fn equal(&self, a: &T, b: &T) -> bool;
}

/// Identity for shared values, value equality for primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityEq;

impl<T: Identity + ?Sized> Equality<T> for IdentityEq {
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        a.identical(b)
    }
}

/// Structural equality through `PartialEq`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueEq;

impl<T: PartialEq + ?Sized> Equality<T> for ValueEq {
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Equality defined by a closure.
#[derive(Clone, Copy)]
pub struct FnEq<F>(pub F);

impl<T, F> Equality<T> for FnEq<F>
where
    T: ?Sized,
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        (self.0)(a, b)
    }
}

impl<T, E> Equality<T> for Arc<E>
where
    T: ?Sized,
    E: Equality<T> + ?Sized,
{
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        (**self).equal(a, b)
    }
}

impl<T, E> Equality<T> for Box<E>
where
    T: ?Sized,
    E: Equality<T> + ?Sized,
{
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        (**self).equal(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert!(IdentityEq.equal(&3_i32, &3));
        assert!(!IdentityEq.equal(&3_i32, &4));
        assert!(IdentityEq.equal(&"cart".to_string(), &"cart".to_string()));
        assert!(IdentityEq.equal(&1.5_f64, &1.5));
    }

    #[test]
    fn shared_values_compare_by_pointer() {
        let a = Arc::new(vec![1, 2, 3]);
        let b = Arc::new(vec![1, 2, 3]);

        assert!(IdentityEq.equal(&a, &Arc::clone(&a)));
        assert!(!IdentityEq.equal(&a, &b));
        assert!(ValueEq.equal(&a, &b));
    }

    #[test]
    fn tuples_compare_element_wise() {
        let items = Arc::new(vec![10.0_f64]);
        let left = (Arc::clone(&items), 0.1_f64, "EUR");
        let right = (Arc::clone(&items), 0.1_f64, "EUR");
        let other = (Arc::new(vec![10.0_f64]), 0.1_f64, "EUR");

        assert!(IdentityEq.equal(&left, &right));
        assert!(!IdentityEq.equal(&left, &other));
    }

    #[test]
    fn options_and_vectors_recurse() {
        let shared = Arc::new(1);
        assert!(IdentityEq.equal(&Some(Arc::clone(&shared)), &Some(Arc::clone(&shared))));
        assert!(!IdentityEq.equal(&Some(Arc::clone(&shared)), &None));
        assert!(IdentityEq.equal(&vec![Arc::clone(&shared)], &vec![Arc::clone(&shared)]));
        assert!(!IdentityEq.equal(&vec![Arc::clone(&shared)], &vec![]));
    }

    #[test]
    fn closure_equality() {
        let close_enough = FnEq(|a: &f64, b: &f64| (a - b).abs() < 0.01);
        assert!(close_enough.equal(&1.0, &1.001));
        assert!(!close_enough.equal(&1.0, &1.1));
    }
}
