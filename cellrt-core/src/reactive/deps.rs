//! Dependency Lists
//!
//! Derived values, memoized functions and effects are gated by a [`Deps`]
//! list: an ordered sequence of values captured at declaration time and
//! compared element-wise against the list from the previous pass.
//!
//! # Shallow Equality
//!
//! Comparison is deliberately shallow:
//!
//! - Scalars and strings compare by value. Floats use same-value semantics,
//!   so `NaN` equals `NaN` while `0.0` and `-0.0` differ.
//! - Shared containers (`Rc<T>`, `Arc<T>`) compare by identity. A freshly
//!   allocated container with equal contents counts as changed.
//! - Runtime handles (setters, dispatchers, callbacks, refs, contexts)
//!   compare by identity.
//!
//! An empty list never changes, so anything gated by it runs exactly once.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;

/// A value that can take part in a dependency list.
pub trait DepValue: 'static {
    /// Whether `other` is the same dependency value as `self`.
    ///
    /// Values of a different type are never the same.
    fn same_as(&self, other: &dyn Any) -> bool;

    /// Upcast for comparisons.
    fn as_any(&self) -> &dyn Any;
}

macro_rules! impl_dep_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DepValue for $ty {
                fn same_as(&self, other: &dyn Any) -> bool {
                    other.downcast_ref::<$ty>().is_some_and(|other| self == other)
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )*
    };
}

impl_dep_value_by_eq!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

macro_rules! impl_dep_value_for_float {
    ($($ty:ty),*) => {
        $(
            impl DepValue for $ty {
                fn same_as(&self, other: &dyn Any) -> bool {
                    other.downcast_ref::<$ty>().is_some_and(|other| {
                        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
                    })
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )*
    };
}

impl_dep_value_for_float!(f32, f64);

impl<T: DepValue> DepValue for Option<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        match (self, other.downcast_ref::<Option<T>>()) {
            (None, Some(None)) => true,
            (Some(a), Some(Some(b))) => a.same_as(b.as_any()),
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: ?Sized + 'static> DepValue for Rc<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Rc<T>>()
            .is_some_and(|other| Rc::ptr_eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: ?Sized + 'static> DepValue for Arc<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Arc<T>>()
            .is_some_and(|other| Arc::ptr_eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An ordered dependency list.
///
/// Build one with [`Deps::new`] and [`Deps::with`], or with the
/// [`deps!`](crate::deps) macro.
#[derive(Default)]
pub struct Deps {
    values: SmallVec<[Box<dyn DepValue>; 4]>,
}

impl Deps {
    /// An empty list: "compute once, never again".
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, builder style.
    pub fn with(mut self, value: impl DepValue) -> Self {
        self.push(value);
        self
    }

    /// Append a value.
    pub fn push(&mut self, value: impl DepValue) {
        self.values.push(Box::new(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Element-wise shallow comparison against a previous list.
    ///
    /// Lists of different length are never the same.
    pub fn same_as(&self, previous: &Deps) -> bool {
        self.values.len() == previous.values.len()
            && self
                .values
                .iter()
                .zip(previous.values.iter())
                .all(|(current, previous)| current.same_as(previous.as_any()))
    }
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deps").field("len", &self.len()).finish()
    }
}

/// Whether a gated declaration must run, given its previous list.
///
/// `None` as the current list means "every pass".
pub(crate) fn deps_changed(current: Option<&Deps>, previous: Option<&Deps>) -> bool {
    match (current, previous) {
        (Some(current), Some(previous)) => !current.same_as(previous),
        _ => true,
    }
}

/// Build a [`Deps`] list from expressions.
///
/// ```rust
/// use cellrt_core::deps;
///
/// let count = 3;
/// let label = String::from("clicks");
/// let list = deps![count, label.clone()];
/// assert_eq!(list.len(), 2);
/// assert!(deps![].is_empty());
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        $crate::reactive::Deps::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::reactive::Deps::new()$(.with($value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_compare_by_value() {
        assert!(deps![1, "a", true].same_as(&deps![1, "a", true]));
        assert!(!deps![1].same_as(&deps![2]));
        assert!(!deps![String::from("x")].same_as(&deps![String::from("y")]));
    }

    #[test]
    fn different_types_never_match() {
        assert!(!deps![1i32].same_as(&deps![1i64]));
    }

    #[test]
    fn length_mismatch_is_a_change() {
        assert!(!deps![1, 2].same_as(&deps![1]));
    }

    #[test]
    fn empty_lists_never_change() {
        assert!(deps![].same_as(&deps![]));
        assert!(!deps_changed(Some(&deps![]), Some(&deps![])));
    }

    #[test]
    fn floats_use_same_value_semantics() {
        assert!(deps![f64::NAN].same_as(&deps![f64::NAN]));
        assert!(!deps![0.0f64].same_as(&deps![-0.0f64]));
        assert!(deps![1.5f32].same_as(&deps![1.5f32]));
    }

    #[test]
    fn containers_compare_by_identity() {
        let shared = Rc::new(vec![1, 2, 3]);
        assert!(deps![shared.clone()].same_as(&deps![shared.clone()]));

        // Equal contents, fresh allocation: treated as changed.
        let fresh = Rc::new(vec![1, 2, 3]);
        assert!(!deps![fresh].same_as(&deps![shared]));

        let a = Arc::new("theme");
        assert!(deps![a.clone()].same_as(&deps![a]));
    }

    #[test]
    fn options_compare_their_contents() {
        assert!(deps![None::<i32>].same_as(&deps![None::<i32>]));
        assert!(deps![Some(4)].same_as(&deps![Some(4)]));
        assert!(!deps![Some(4)].same_as(&deps![None::<i32>]));
    }

    #[test]
    fn missing_lists_always_change() {
        assert!(deps_changed(None, Some(&deps![1])));
        assert!(deps_changed(Some(&deps![1]), None));
        assert!(deps_changed(None, None));
    }
}
