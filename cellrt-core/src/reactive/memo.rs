//! Memo Implementation
//!
//! Derived values and memoized functions share one recomputation policy:
//! the stored item is reused while the dependency list is unchanged, and
//! replaced when it changes.
//!
//! # Why Two Kinds
//!
//! - A derived value caches the *result* of a computation, so an expensive
//!   `compute_fn` runs only when its inputs change.
//! - A memoized function caches a *reference*. Nothing is computed; the point
//!   is that the returned [`Callback`] keeps its identity across passes, so a
//!   child that receives it as props is not re-evaluated.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use super::deps::{DepValue, Deps};

/// Storage behind a `declare_derived` slot.
pub(crate) struct DerivedState<T> {
    current: RefCell<Option<(T, Deps)>>,
}

impl<T: Clone> DerivedState<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }

    /// Cached value if `deps` matches the stored list.
    pub(crate) fn cached(&self, deps: &Deps) -> Option<T> {
        match &*self.current.borrow() {
            Some((value, stored)) if deps.same_as(stored) => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) fn store(&self, value: T, deps: Deps) {
        *self.current.borrow_mut() = Some((value, deps));
    }
}

/// Storage behind a `declare_memo_fn` slot.
pub(crate) struct MemoFnState<F> {
    current: RefCell<Option<(Callback<F>, Deps)>>,
}

impl<F> MemoFnState<F> {
    pub(crate) fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }

    pub(crate) fn cached(&self, deps: &Deps) -> Option<Callback<F>> {
        match &*self.current.borrow() {
            Some((callback, stored)) if deps.same_as(stored) => Some(callback.clone()),
            _ => None,
        }
    }

    pub(crate) fn store(&self, callback: Callback<F>, deps: Deps) {
        *self.current.borrow_mut() = Some((callback, deps));
    }
}

/// A function reference with stable identity.
///
/// Calls go straight through to the wrapped function. Equality is identity:
/// two callbacks are equal only if they came from the same memoization.
///
/// ```rust
/// use cellrt_core::Callback;
///
/// fn greet(name: &str) -> String {
///     format!("hello {name}")
/// }
///
/// let a = Callback::new(greet as fn(&str) -> String);
/// let b = Callback::new(greet as fn(&str) -> String);
/// assert_eq!(a("ada"), "hello ada");
/// assert_eq!(a, a.clone());
/// assert_ne!(a, b);
/// ```
pub struct Callback<F: ?Sized> {
    func: Rc<F>,
}

impl<F> Callback<F> {
    pub fn new(func: F) -> Self {
        Self { func: Rc::new(func) }
    }
}

impl<F: ?Sized> Callback<F> {
    /// Whether both callbacks are the same reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.func) as *const (),
            Rc::as_ptr(&other.func) as *const (),
        )
    }
}

impl<F: ?Sized> Deref for Callback<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.func
    }
}

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
        }
    }
}

impl<F: ?Sized> PartialEq for Callback<F> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("func", &(Rc::as_ptr(&self.func) as *const ()))
            .finish()
    }
}

impl<F: ?Sized + 'static> DepValue for Callback<F> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Callback<F>>()
            .is_some_and(|other| self.ptr_eq(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps;

    #[test]
    fn derived_state_hits_on_same_deps() {
        let state = DerivedState::new();
        assert_eq!(state.cached(&deps![1]), None);

        state.store(10, deps![1]);
        assert_eq!(state.cached(&deps![1]), Some(10));
        assert_eq!(state.cached(&deps![2]), None);
    }

    #[test]
    fn memo_fn_state_returns_same_reference() {
        let state = MemoFnState::new();
        let callback = Callback::new(|| 1);
        state.store(callback.clone(), deps![]);

        let cached = state.cached(&deps![]).unwrap();
        assert!(cached.ptr_eq(&callback));
        assert_eq!(cached(), 1);
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let a = Callback::new(|x: i32| x + 1);
        let b = a.clone();
        assert_eq!(a, b);
        assert!(a.same_as(b.as_any()));
        assert_eq!(b(1), 2);
    }
}
