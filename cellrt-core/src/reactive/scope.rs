//! Evaluation Scope
//!
//! A [`Scope`] is handed to a component's render function and is the only way
//! to make declarations. Each declaration claims the next positional slot of
//! the component instance.
//!
//! # Positional Identity
//!
//! Slot `n` belongs to whatever the `n`-th declaration of the first pass was.
//! On later passes the runtime checks that the `n`-th declaration has the same
//! kind and value type, and once the render function returns, that the count
//! matches. Any mismatch is an `OrderingViolation`: declarations must not be
//! made conditionally or in loops of varying length.
//!
//! # Lifetime
//!
//! A scope may be cloned and captured, but declarations, context reads and
//! context provision only work while its component is the one currently
//! being evaluated. Anything else is a `LifecycleViolation`. The handles a
//! declaration returns (setters, dispatchers, refs) are not bound by this
//! and stay usable while the component is mounted.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use super::cell::{CellState, Dispatch, ReducerState, Setter};
use super::context::EvaluationContext;
use super::deps::Deps;
use super::effect::{EffectPhase, EffectSlot, IntoEffectOutcome};
use super::memo::{Callback, DerivedState, MemoFnState};
use super::reference::{RefHandle, RefState};
use super::shared::{same_value, ProvidedValue, SharedContext};
use crate::error::{Result, RuntimeError};
use crate::graph::{ComponentId, ComponentNode, Slot, SlotKind};
use crate::view::{Provision, View};

/// Declaration handle for one evaluation of one component.
#[derive(Clone)]
pub struct Scope {
    node: Rc<ComponentNode>,
}

impl Scope {
    pub(crate) fn new(node: Rc<ComponentNode>) -> Self {
        Self { node }
    }

    /// Id of the component this scope belongs to.
    pub fn component_id(&self) -> ComponentId {
        self.node.id()
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if !self.node.is_mounted() {
            return Err(RuntimeError::lifecycle(operation, "component is unmounted"));
        }
        match EvaluationContext::current_component() {
            Some(current) if current == self.node.id() => Ok(()),
            Some(current) => Err(RuntimeError::lifecycle(
                operation,
                format!(
                    "scope of `{}` used while {current} is evaluating",
                    self.node.name()
                ),
            )),
            None => Err(RuntimeError::lifecycle(
                operation,
                "called outside of an evaluation pass",
            )),
        }
    }

    /// Claim the next slot, creating its state on the first pass.
    fn claim_slot<X: Any>(
        &self,
        operation: &'static str,
        kind: SlotKind,
        init: impl FnOnce() -> Slot,
    ) -> Result<Rc<X>> {
        self.ensure_active(operation)?;
        let index = self.node.next_slot_index();

        let violation = |detail: String| RuntimeError::OrderingViolation {
            component: self.node.name(),
            slot: index,
            detail,
        };

        match self.node.slot_state(index) {
            Some((found, state)) => {
                if found != kind {
                    return Err(violation(format!(
                        "expected a {found} declaration, found {kind}"
                    )));
                }
                state.downcast::<X>().map_err(|_| {
                    violation(format!(
                        "{kind} changed value type to `{}`",
                        type_name::<X>()
                    ))
                })
            }
            None if !self.node.has_evaluated() => {
                let slot = init();
                let state = Rc::clone(&slot.state).downcast::<X>().map_err(|_| {
                    violation(format!("{kind} slot initialised with a foreign type"))
                })?;
                self.node.push_slot(slot);
                Ok(state)
            }
            None => Err(violation(format!(
                "{kind} declared beyond the previous pass's declarations"
            ))),
        }
    }

    fn owner(&self) -> std::rc::Weak<ComponentNode> {
        Rc::downgrade(&self.node)
    }

    // ------------------------------------------------------------------
    // Cells and reducers
    // ------------------------------------------------------------------

    /// Declare a cell. Returns the current value and the cell's setter.
    pub fn declare_cell<T>(&self, initial: T) -> Result<(T, Setter<T>)>
    where
        T: Clone + PartialEq + 'static,
    {
        self.declare_cell_with(|| initial)
    }

    /// Declare a cell whose initial value is computed on the first pass only.
    pub fn declare_cell_with<T>(&self, init: impl FnOnce() -> T) -> Result<(T, Setter<T>)>
    where
        T: Clone + PartialEq + 'static,
    {
        let owner = self.owner();
        let state: Rc<CellState<T>> = self.claim_slot("declare_cell", SlotKind::Cell, || Slot {
            kind: SlotKind::Cell,
            state: Rc::new(CellState::new(init(), owner)),
            effect: None,
        })?;
        Ok((state.get(), Setter::new(state)))
    }

    /// Declare a reducer. Returns the current state and the dispatcher.
    ///
    /// `reducer` replaces the previous pass's reducer, so dispatches always
    /// run the one from the latest evaluation.
    pub fn declare_reducer<S, A>(
        &self,
        reducer: impl Fn(&S, A) -> S + 'static,
        initial: S,
    ) -> Result<(S, Dispatch<A>)>
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
    {
        let reducer: Rc<dyn Fn(&S, A) -> S> = Rc::new(reducer);
        let owner = self.owner();
        let fresh = Rc::clone(&reducer);
        let state: Rc<ReducerState<S, A>> =
            self.claim_slot("declare_reducer", SlotKind::Reducer, || Slot {
                kind: SlotKind::Reducer,
                state: Rc::new(ReducerState::new(initial, fresh, owner)),
                effect: None,
            })?;
        state.replace_reducer(reducer);
        Ok((state.get(), Dispatch::new(state)))
    }

    // ------------------------------------------------------------------
    // Derived values and memoized functions
    // ------------------------------------------------------------------

    /// Declare a derived value. `compute` runs on the first pass and
    /// whenever `deps` differs from the previous pass's list.
    pub fn declare_derived<T>(&self, compute: impl FnOnce() -> T, deps: Deps) -> Result<T>
    where
        T: Clone + 'static,
    {
        let state: Rc<DerivedState<T>> =
            self.claim_slot("declare_derived", SlotKind::Derived, || Slot {
                kind: SlotKind::Derived,
                state: Rc::new(DerivedState::<T>::new()),
                effect: None,
            })?;
        if let Some(value) = state.cached(&deps) {
            return Ok(value);
        }
        let value = compute();
        state.store(value.clone(), deps);
        Ok(value)
    }

    /// Declare a memoized function. The returned callback keeps its identity
    /// while `deps` is unchanged.
    pub fn declare_memo_fn<F: 'static>(&self, func: F, deps: Deps) -> Result<Callback<F>> {
        let state: Rc<MemoFnState<F>> =
            self.claim_slot("declare_memo_fn", SlotKind::MemoFn, || Slot {
                kind: SlotKind::MemoFn,
                state: Rc::new(MemoFnState::<F>::new()),
                effect: None,
            })?;
        if let Some(callback) = state.cached(&deps) {
            return Ok(callback);
        }
        let callback = Callback::new(func);
        state.store(callback.clone(), deps);
        Ok(callback)
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Declare a standard-phase effect. It runs after the frame is
    /// presented, on the next [`Runtime::tick`](super::Runtime::tick).
    ///
    /// With `deps = None` the effect runs after every evaluation.
    pub fn declare_effect<O: IntoEffectOutcome>(
        &self,
        action: impl FnOnce() -> O + 'static,
        deps: Option<Deps>,
    ) -> Result<()> {
        self.declare_effect_in("declare_effect", EffectPhase::Standard, action, deps)
    }

    /// Declare a layout-phase effect. It runs synchronously after the pass
    /// evaluates, before the frame is presented.
    pub fn declare_layout_effect<O: IntoEffectOutcome>(
        &self,
        action: impl FnOnce() -> O + 'static,
        deps: Option<Deps>,
    ) -> Result<()> {
        self.declare_effect_in("declare_layout_effect", EffectPhase::Layout, action, deps)
    }

    fn declare_effect_in<O: IntoEffectOutcome>(
        &self,
        operation: &'static str,
        phase: EffectPhase,
        action: impl FnOnce() -> O + 'static,
        deps: Option<Deps>,
    ) -> Result<()> {
        let kind = match phase {
            EffectPhase::Layout => SlotKind::LayoutEffect,
            EffectPhase::Standard => SlotKind::Effect,
        };
        let name = self.node.name();
        let slot: Rc<EffectSlot> = self.claim_slot(operation, kind, || {
            let effect = Rc::new(EffectSlot::new(phase, name));
            Slot {
                kind,
                state: Rc::clone(&effect) as Rc<dyn Any>,
                effect: Some(effect),
            }
        })?;

        if slot.prepare(Box::new(move || action().into_outcome()), deps) {
            self.node.queue_effect(slot);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Declare a persistent reference. Writing it never schedules anything.
    pub fn declare_ref<T: 'static>(&self, initial: T) -> Result<RefHandle<T>> {
        let owner = self.owner();
        let state: Rc<RefState<T>> = self.claim_slot("declare_ref", SlotKind::Ref, || Slot {
            kind: SlotKind::Ref,
            state: Rc::new(RefState::new(initial, owner)),
            effect: None,
        })?;
        Ok(RefHandle::new(state))
    }

    // ------------------------------------------------------------------
    // Shared context
    // ------------------------------------------------------------------

    /// Read a shared context: the value of the nearest enclosing provider,
    /// or the context's default.
    pub fn read_context<T: Clone + PartialEq + 'static>(
        &self,
        context: &SharedContext<T>,
    ) -> Result<T> {
        self.ensure_active("read_context")?;
        self.node.record_context_read(context.id());

        let env = self.node.env();
        let provided = env
            .get(context.id())
            .and_then(|provided| provided.value.downcast_ref::<T>().cloned());
        Ok(provided.unwrap_or_else(|| context.default_value().clone()))
    }

    /// Wrap `subtree` in a provider binding `context` to `value`.
    pub fn provide_context<T: Clone + PartialEq + 'static>(
        &self,
        context: &SharedContext<T>,
        value: T,
        subtree: impl Into<View>,
    ) -> Result<View> {
        self.ensure_active("provide_context")?;
        let provided = ProvidedValue {
            value: Rc::new(value),
            same: same_value::<T>,
            provider: self.node.id(),
        };
        Ok(View::Provider(Provision::new(
            context.id(),
            provided,
            subtree.into(),
        )))
    }

    // ------------------------------------------------------------------
    // Props
    // ------------------------------------------------------------------

    /// Props of the current component.
    pub fn props<P: 'static>(&self) -> Result<Rc<P>> {
        self.ensure_active("props")?;
        let props = self.node.props().ok_or_else(|| {
            RuntimeError::lifecycle("props", format!("`{}` has no props", self.node.name()))
        })?;
        props.downcast::<P>().map_err(|_| {
            RuntimeError::lifecycle(
                "props",
                format!(
                    "`{}` props are not of type `{}`",
                    self.node.name(),
                    type_name::<P>()
                ),
            )
        })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("component", &self.node.id())
            .field("name", &self.node.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Weak;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::deps;
    use crate::graph::UpdateScheduler;
    use crate::reactive::shared::ContextEnv;
    use crate::view::ComponentSpec;

    fn scope() -> Scope {
        let node = ComponentNode::new(
            ComponentSpec::new("Widget", |_| Ok(View::Empty)),
            0,
            Rc::new(ContextEnv::default()),
            Weak::<RefCell<UpdateScheduler>>::new(),
            Rc::new(RuntimeConfig::default()),
        );
        Scope::new(node)
    }

    /// Run one evaluation of the scope's component.
    fn pass<R>(scope: &Scope, body: impl FnOnce(&Scope) -> Result<R>) -> Result<R> {
        scope.node.begin_evaluation();
        let _guard = EvaluationContext::enter(scope.component_id());
        let out = body(scope)?;
        scope.node.finish_evaluation()?;
        Ok(out)
    }

    #[test]
    fn cells_persist_across_passes() {
        let scope = scope();
        let (value, set) = pass(&scope, |s| s.declare_cell(1)).unwrap();
        assert_eq!(value, 1);
        set.set(5).unwrap();

        let (value, again) = pass(&scope, |s| s.declare_cell(1)).unwrap();
        assert_eq!(value, 5);
        assert_eq!(set, again);
    }

    #[test]
    fn lazy_initialiser_runs_once() {
        let scope = scope();
        let calls = Rc::new(RefCell::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            pass(&scope, move |s| {
                s.declare_cell_with(move || {
                    *calls.borrow_mut() += 1;
                    0
                })
            })
            .unwrap();
        }
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn declarations_outside_evaluation_fail() {
        let scope = scope();
        let err = scope.declare_cell(0).unwrap_err();
        assert!(err.is_lifecycle_violation());
    }

    #[test]
    fn changed_kind_is_an_ordering_violation() {
        let scope = scope();
        pass(&scope, |s| s.declare_cell(0).map(drop)).unwrap();
        let err = pass(&scope, |s| s.declare_ref(0).map(drop)).unwrap_err();
        assert!(err.is_ordering_violation());
    }

    #[test]
    fn changed_type_is_an_ordering_violation() {
        let scope = scope();
        pass(&scope, |s| s.declare_cell(0u8).map(drop)).unwrap();
        let err = pass(&scope, |s| s.declare_cell("zero").map(drop)).unwrap_err();
        assert!(err.is_ordering_violation());
    }

    #[test]
    fn extra_declaration_is_an_ordering_violation() {
        let scope = scope();
        pass(&scope, |s| s.declare_cell(0).map(drop)).unwrap();
        let err = pass(&scope, |s| {
            s.declare_cell(0)?;
            s.declare_cell(1).map(drop)
        })
        .unwrap_err();
        assert!(err.is_ordering_violation());
    }

    #[test]
    fn derived_recomputes_only_on_change() {
        let scope = scope();
        let runs = Rc::new(RefCell::new(0));
        let mut values = Vec::new();
        for input in [2, 2, 3] {
            let runs = runs.clone();
            let value = pass(&scope, move |s| {
                s.declare_derived(
                    move || {
                        *runs.borrow_mut() += 1;
                        input * 10
                    },
                    deps![input],
                )
            })
            .unwrap();
            values.push(value);
        }
        assert_eq!(values, vec![20, 20, 30]);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn memo_fn_keeps_identity() {
        let scope = scope();
        let make = |s: &Scope, key: i32| s.declare_memo_fn(move |x: i32| x + key, deps![key]);
        let first = pass(&scope, |s| make(s, 1)).unwrap();
        let second = pass(&scope, |s| make(s, 1)).unwrap();
        let third = pass(&scope, |s| make(s, 2)).unwrap();

        assert!(first.ptr_eq(&second));
        assert!(!second.ptr_eq(&third));
        assert_eq!(third(1), 3);
    }

    #[test]
    fn read_context_falls_back_to_default() {
        let scope = scope();
        let theme = crate::reactive::create_shared_context(String::from("light"));
        let value = pass(&scope, |s| s.read_context(&theme)).unwrap();
        assert_eq!(value, "light");
    }

    #[test]
    fn props_are_required_for_props_access() {
        let scope = scope();
        let err = pass(&scope, |s| s.props::<u32>().map(drop)).unwrap_err();
        assert!(err.is_lifecycle_violation());
    }
}
