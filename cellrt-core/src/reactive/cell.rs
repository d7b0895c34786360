//! Cells and Reducers
//!
//! A cell is a value slot owned by one component instance. Its [`Setter`]
//! writes the slot and schedules the owner for re-evaluation. A reducer is a
//! cell whose writes go through a pure `(state, action) -> state` function,
//! reached through a [`Dispatch`] handle.
//!
//! # Update Policy
//!
//! Writes are applied immediately; the re-evaluation they cause is batched:
//! any number of writes to components before the next pass cause one
//! evaluation per component. With `skip_equal_updates` (the default) a write
//! whose value equals the current one schedules nothing at all. A dispatch
//! whose reducer returns an equal state never schedules.
//!
//! Handles stay usable from effect actions and event handlers for as long as
//! the owning component is mounted. After unmount every write fails with
//! `LifecycleViolation`.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::deps::DepValue;
use crate::error::{Result, RuntimeError};
use crate::graph::ComponentNode;

/// Storage behind a cell slot.
pub(crate) struct CellState<T> {
    value: RefCell<T>,
    owner: Weak<ComponentNode>,
}

impl<T: PartialEq + 'static> CellState<T> {
    pub(crate) fn new(value: T, owner: Weak<ComponentNode>) -> Self {
        Self {
            value: RefCell::new(value),
            owner,
        }
    }

    pub(crate) fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    fn owner(&self, operation: &'static str) -> Result<Rc<ComponentNode>> {
        self.owner
            .upgrade()
            .filter(|owner| owner.is_mounted())
            .ok_or_else(|| RuntimeError::lifecycle(operation, "owning component is unmounted"))
    }

    /// Store `next` and schedule the owner, unless the equal-value policy
    /// says otherwise. Returns whether a re-evaluation was scheduled.
    fn commit(&self, owner: &Rc<ComponentNode>, next: T) -> bool {
        let unchanged = *self.value.borrow() == next;
        if unchanged && owner.config().skip_equal_updates {
            tracing::trace!(component = %owner.id(), "equal update skipped");
            return false;
        }
        *self.value.borrow_mut() = next;
        owner.schedule_update();
        true
    }
}

// ----------------------------------------------------------------------------
// Setter
// ----------------------------------------------------------------------------

/// Write handle for a cell. The same handle is returned on every pass.
pub struct Setter<T> {
    state: Rc<CellState<T>>,
}

impl<T: PartialEq + 'static> Setter<T> {
    pub(crate) fn new(state: Rc<CellState<T>>) -> Self {
        Self { state }
    }

    /// Replace the value.
    pub fn set(&self, value: T) -> Result<()> {
        self.update(|_| value)
    }

    /// Compute the next value from the current one.
    ///
    /// Successive calls before the next pass each see the result of the
    /// previous call, so three `update(|n| n + 1)` calls add three.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let owner = self.state.owner("Setter::update")?;
        let next = f(&self.state.value.borrow());
        self.state.commit(&owner, next);
        Ok(())
    }
}

impl<T> Setter<T> {
    /// Whether both handles write the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> PartialEq for Setter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("cell", &Rc::as_ptr(&self.state))
            .finish()
    }
}

impl<T: 'static> DepValue for Setter<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Setter<T>>()
            .is_some_and(|other| self.ptr_eq(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ----------------------------------------------------------------------------
// Reducer
// ----------------------------------------------------------------------------

type ReducerFn<S, A> = Rc<dyn Fn(&S, A) -> S>;

/// Storage behind a reducer slot.
pub(crate) struct ReducerState<S, A> {
    cell: CellState<S>,
    reducer: RefCell<ReducerFn<S, A>>,
}

impl<S: PartialEq + 'static, A: 'static> ReducerState<S, A> {
    pub(crate) fn new(initial: S, reducer: ReducerFn<S, A>, owner: Weak<ComponentNode>) -> Self {
        Self {
            cell: CellState::new(initial, owner),
            reducer: RefCell::new(reducer),
        }
    }

    pub(crate) fn get(&self) -> S
    where
        S: Clone,
    {
        self.cell.get()
    }

    /// Swap in the reducer from the latest evaluation.
    pub(crate) fn replace_reducer(&self, reducer: ReducerFn<S, A>) {
        *self.reducer.borrow_mut() = reducer;
    }
}

trait DispatchTarget<A> {
    fn dispatch(&self, action: A) -> Result<()>;
}

impl<S: PartialEq + 'static, A: 'static> DispatchTarget<A> for ReducerState<S, A> {
    fn dispatch(&self, action: A) -> Result<()> {
        let owner = self.cell.owner("Dispatch::dispatch")?;
        let reducer = Rc::clone(&self.reducer.borrow());

        let outcome = {
            let state = self.cell.value.borrow();
            panic::catch_unwind(AssertUnwindSafe(|| reducer(&state, action)))
        };
        let next = outcome.map_err(|payload| RuntimeError::ReducerContractViolation {
            reason: panic_message(payload.as_ref()),
        })?;

        // Unmatched actions return the state unchanged; whatever the
        // equal-update policy, that is not an update.
        if *self.cell.value.borrow() == next {
            tracing::trace!(component = %owner.id(), "reducer returned unchanged state");
            return Ok(());
        }
        self.cell.commit(&owner, next);
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("reducer panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("reducer panicked: {message}")
    } else {
        "reducer panicked".to_string()
    }
}

/// Action sink for a reducer. The same handle is returned on every pass.
pub struct Dispatch<A> {
    target: Rc<dyn DispatchTarget<A>>,
}

impl<A: 'static> Dispatch<A> {
    pub(crate) fn new<S: PartialEq + 'static>(state: Rc<ReducerState<S, A>>) -> Self {
        Self { target: state }
    }

    /// Run the reducer on the current state and store the result.
    ///
    /// A reducer that panics yields `ReducerContractViolation` and leaves the
    /// state untouched.
    pub fn dispatch(&self, action: A) -> Result<()> {
        self.target.dispatch(action)
    }
}

impl<A> Dispatch<A> {
    /// Whether both handles feed the same reducer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.target) as *const (),
            Rc::as_ptr(&other.target) as *const (),
        )
    }
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            target: Rc::clone(&self.target),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("reducer", &(Rc::as_ptr(&self.target) as *const ()))
            .finish()
    }
}

impl<A: 'static> DepValue for Dispatch<A> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Dispatch<A>>()
            .is_some_and(|other| self.ptr_eq(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
