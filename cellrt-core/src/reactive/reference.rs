//! Persistent References
//!
//! A [`RefHandle`] is a mutable holder that survives across passes and never
//! schedules re-evaluation. Typical uses: a handle to a host element that an
//! effect measures or focuses, or bookkeeping an event handler needs.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::deps::DepValue;
use crate::error::{Result, RuntimeError};
use crate::graph::ComponentNode;

pub(crate) struct RefState<T> {
    current: RefCell<T>,
    owner: Weak<ComponentNode>,
}

impl<T> RefState<T> {
    pub(crate) fn new(initial: T, owner: Weak<ComponentNode>) -> Self {
        Self {
            current: RefCell::new(initial),
            owner,
        }
    }
}

/// Handle to a persistent reference. The same handle is returned on every
/// pass; reads and writes fail once the owning component is unmounted.
pub struct RefHandle<T> {
    state: Rc<RefState<T>>,
}

impl<T> RefHandle<T> {
    pub(crate) fn new(state: Rc<RefState<T>>) -> Self {
        Self { state }
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        match self.state.owner.upgrade() {
            Some(owner) if owner.is_mounted() => Ok(()),
            _ => Err(RuntimeError::lifecycle(
                operation,
                "owning component is unmounted",
            )),
        }
    }

    /// Read `.current` by clone.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Overwrite `.current`.
    pub fn set(&self, value: T) -> Result<()> {
        self.replace(value).map(drop)
    }

    /// Overwrite `.current`, returning the old value.
    pub fn replace(&self, value: T) -> Result<T> {
        self.check("RefHandle::replace")?;
        Ok(self.state.current.replace(value))
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.check("RefHandle::with")?;
        Ok(f(&self.state.current.borrow()))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.check("RefHandle::with_mut")?;
        Ok(f(&mut self.state.current.borrow_mut()))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> PartialEq for RefHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: fmt::Debug> fmt::Debug for RefHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.current.try_borrow() {
            Ok(current) => f.debug_struct("RefHandle").field("current", &*current).finish(),
            Err(_) => f.debug_struct("RefHandle").finish_non_exhaustive(),
        }
    }
}

impl<T: 'static> DepValue for RefHandle<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<RefHandle<T>>()
            .is_some_and(|other| self.ptr_eq(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_ref_rejects_access() {
        let handle = RefHandle::new(Rc::new(RefState::new(5, Weak::new())));
        assert!(handle.get().unwrap_err().is_lifecycle_violation());
        assert!(handle.set(6).unwrap_err().is_lifecycle_violation());
    }

    #[test]
    fn clones_share_identity() {
        let handle = RefHandle::new(Rc::new(RefState::new(String::new(), Weak::new())));
        assert_eq!(handle, handle.clone());
    }
}
