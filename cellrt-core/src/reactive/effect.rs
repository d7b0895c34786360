//! Effect Implementation
//!
//! An Effect is a side-effecting action declared during evaluation and run
//! after the pass commits, gated by its dependency list.
//!
//! # How Effects Work
//!
//! 1. During evaluation, `declare_effect` compares the new dependency list
//!    with the list of the last *committed* run. If they differ (or the
//!    effect never ran, or no list was given) the action is stored as the
//!    slot's pending run and the slot is queued on its component.
//!
//! 2. After the component's subtree is evaluated, its queued slots move to
//!    the runtime's layout or standard queue, children before parents.
//!
//! 3. Running a slot takes the pending run, calls the previous cleanup (if
//!    any), then calls the action. Only a successful action commits its
//!    dependency list and stores its new cleanup.
//!
//! # Phases
//!
//! - *Layout* effects run synchronously after evaluation and before the frame
//!   is presented, which makes them the place for measurements.
//! - *Standard* effects run after presentation, on the next
//!   [`Runtime::tick`](super::Runtime::tick).
//!
//! # Cleanup
//!
//! The cleanup returned by a run executes immediately before the next run of
//! the same effect, and once when the component unmounts.

use std::cell::{Cell, RefCell};
use std::fmt;

use super::deps::{deps_changed, Deps};
use crate::error::{Result, RuntimeError};

/// When an effect runs relative to frame presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    /// Before the frame is presented.
    Layout,
    /// After the frame is presented.
    Standard,
}

/// A cleanup action registered by an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self(Box::new(cleanup))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect action may return.
///
/// Implemented for `()`, [`Cleanup`], `Option<Cleanup>` and `Result` of any
/// of those with [`RuntimeError`], so actions can use `?`.
pub trait IntoEffectOutcome {
    fn into_outcome(self) -> Result<Option<Cleanup>>;
}

impl IntoEffectOutcome for () {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(None)
    }
}

impl IntoEffectOutcome for Cleanup {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(Some(self))
    }
}

impl IntoEffectOutcome for Option<Cleanup> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(self)
    }
}

impl<T: IntoEffectOutcome> IntoEffectOutcome for Result<T, RuntimeError> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        self.and_then(IntoEffectOutcome::into_outcome)
    }
}

pub(crate) type EffectAction = Box<dyn FnOnce() -> Result<Option<Cleanup>>>;

struct PendingRun {
    action: EffectAction,
    deps: Option<Deps>,
}

/// State behind one `declare_effect` / `declare_layout_effect` position.
pub(crate) struct EffectSlot {
    phase: EffectPhase,
    component: String,
    has_run: Cell<bool>,
    committed_deps: RefCell<Option<Deps>>,
    cleanup: RefCell<Option<Cleanup>>,
    pending: RefCell<Option<PendingRun>>,
    runs: Cell<u64>,
}

impl EffectSlot {
    pub(crate) fn new(phase: EffectPhase, component: String) -> Self {
        Self {
            phase,
            component,
            has_run: Cell::new(false),
            committed_deps: RefCell::new(None),
            cleanup: RefCell::new(None),
            pending: RefCell::new(None),
            runs: Cell::new(0),
        }
    }

    pub(crate) fn phase(&self) -> EffectPhase {
        self.phase
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Record this evaluation's action. Returns true when the action must
    /// run, i.e. when the slot should be queued.
    ///
    /// The latest evaluation wins: a pending run from an earlier evaluation
    /// is replaced, or dropped if the dependencies are back to the
    /// committed ones.
    pub(crate) fn prepare(&self, action: EffectAction, deps: Option<Deps>) -> bool {
        let due = !self.has_run.get()
            || deps_changed(deps.as_ref(), self.committed_deps.borrow().as_ref());
        *self.pending.borrow_mut() = due.then(|| PendingRun { action, deps });
        due
    }

    /// Run the pending action, if any, after the previous cleanup.
    ///
    /// Returns whether an action ran.
    pub(crate) fn run(&self) -> Result<bool> {
        let Some(PendingRun { action, deps }) = self.pending.borrow_mut().take() else {
            return Ok(false);
        };

        let previous = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = previous {
            cleanup.run();
        }

        let cleanup = action().map_err(|err| match err {
            RuntimeError::Action { component, message } if component.is_empty() => {
                RuntimeError::Action {
                    component: self.component.clone(),
                    message,
                }
            }
            other => other,
        })?;

        *self.cleanup.borrow_mut() = cleanup;
        *self.committed_deps.borrow_mut() = deps;
        self.has_run.set(true);
        self.runs.set(self.runs.get() + 1);
        tracing::debug!(
            component = %self.component,
            phase = ?self.phase,
            runs = self.runs(),
            "effect ran"
        );
        Ok(true)
    }

    /// Drop a pending run without executing it.
    pub(crate) fn cancel(&self) {
        self.pending.borrow_mut().take();
    }

    /// Cancel any pending run and execute the outstanding cleanup once.
    pub(crate) fn teardown(&self) {
        self.cancel();
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    pub(crate) fn runs(&self) -> u64 {
        self.runs.get()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps;
    use std::rc::Rc;

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn logging_action(log: &Rc<RefCell<Vec<String>>>, label: &str) -> EffectAction {
        let log = log.clone();
        let label = label.to_string();
        Box::new(move || {
            log.borrow_mut().push(format!("run {label}"));
            let log = log.clone();
            Ok(Some(Cleanup::new(move || {
                log.borrow_mut().push(format!("cleanup {label}"))
            })))
        })
    }

    #[test]
    fn first_prepare_is_always_due() {
        let slot = EffectSlot::new(EffectPhase::Standard, "Widget".into());
        assert!(slot.prepare(Box::new(|| Ok(None)), Some(deps![])));
        assert!(slot.is_pending());
    }

    #[test]
    fn unchanged_deps_skip_after_commit() {
        let slot = EffectSlot::new(EffectPhase::Standard, "Widget".into());
        slot.prepare(Box::new(|| Ok(None)), Some(deps![1]));
        assert!(slot.run().unwrap());

        assert!(!slot.prepare(Box::new(|| Ok(None)), Some(deps![1])));
        assert!(!slot.run().unwrap());
        assert_eq!(slot.runs(), 1);
    }

    #[test]
    fn cleanup_runs_before_next_action() {
        let log = recorder();
        let slot = EffectSlot::new(EffectPhase::Standard, "Widget".into());

        slot.prepare(logging_action(&log, "a"), Some(deps![1]));
        slot.run().unwrap();
        slot.prepare(logging_action(&log, "b"), Some(deps![2]));
        slot.run().unwrap();

        assert_eq!(*log.borrow(), vec!["run a", "cleanup a", "run b"]);
    }

    #[test]
    fn teardown_runs_cleanup_once_and_cancels() {
        let log = recorder();
        let slot = EffectSlot::new(EffectPhase::Layout, "Widget".into());

        slot.prepare(logging_action(&log, "a"), None);
        slot.run().unwrap();
        slot.prepare(logging_action(&log, "b"), None);

        slot.teardown();
        slot.teardown();
        assert!(!slot.run().unwrap());
        assert_eq!(*log.borrow(), vec!["run a", "cleanup a"]);
    }

    #[test]
    fn failed_action_does_not_commit() {
        let slot = EffectSlot::new(EffectPhase::Standard, "Title".into());
        slot.prepare(Box::new(|| Err(RuntimeError::action("boom"))), Some(deps![1]));

        match slot.run() {
            Err(RuntimeError::Action { component, message }) => {
                assert_eq!(component, "Title");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Deps were not committed, so the same list is still due.
        assert!(slot.prepare(Box::new(|| Ok(None)), Some(deps![1])));
    }

    #[test]
    fn outcomes_convert() {
        assert!(().into_outcome().unwrap().is_none());
        assert!(Cleanup::new(|| {}).into_outcome().unwrap().is_some());
        let failed: Result<()> = Err(RuntimeError::action("x"));
        assert!(failed.into_outcome().is_err());
    }
}
