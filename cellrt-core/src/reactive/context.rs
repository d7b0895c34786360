//! Evaluation Context
//!
//! The evaluation context tracks which component is currently running its
//! render function. Declarations consult it to reject use outside of the
//! evaluation they belong to (a [`Scope`](super::Scope) captured into an
//! effect action, for instance).
//!
//! # Implementation
//!
//! We use a thread-local stack. The runtime pushes the component before
//! calling its render function and pops it when the returned guard drops,
//! so the stack stays balanced even if the render function panics.

use std::cell::RefCell;

use crate::graph::ComponentId;

thread_local! {
    static EVALUATION_STACK: RefCell<Vec<ComponentId>> = const { RefCell::new(Vec::new()) };
}

/// Guard marking a component as the one being evaluated.
///
/// The entry is popped when the guard is dropped.
pub(crate) struct EvaluationContext {
    component: ComponentId,
}

impl EvaluationContext {
    /// Enter the evaluation of `component`.
    pub(crate) fn enter(component: ComponentId) -> Self {
        EVALUATION_STACK.with(|stack| stack.borrow_mut().push(component));
        Self { component }
    }

    /// The component currently being evaluated, if any.
    pub(crate) fn current_component() -> Option<ComponentId> {
        EVALUATION_STACK.with(|stack| stack.borrow().last().copied())
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        EVALUATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.component),
                "EvaluationContext mismatch: expected {:?}, got {:?}",
                self.component,
                popped
            );
        });
    }
}
