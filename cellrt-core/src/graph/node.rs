//! Component Nodes
//!
//! A [`ComponentNode`] is one mounted component instance: its declaration
//! slots, its children, the context environment it was rendered in and the
//! output of its latest evaluation.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

use super::scheduler::UpdateScheduler;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::reactive::effect::EffectSlot;
use crate::reactive::shared::{ContextEnv, ContextId};
use crate::view::{ComponentSpec, RenderFn, View};

/// Unique identifier for a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Generate a new unique component ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of declaration stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Cell,
    Derived,
    MemoFn,
    Effect,
    LayoutEffect,
    Ref,
    Reducer,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotKind::Cell => "cell",
            SlotKind::Derived => "derived",
            SlotKind::MemoFn => "memo_fn",
            SlotKind::Effect => "effect",
            SlotKind::LayoutEffect => "layout_effect",
            SlotKind::Ref => "ref",
            SlotKind::Reducer => "reducer",
        };
        f.write_str(name)
    }
}

/// One declaration's state, type-erased.
pub(crate) struct Slot {
    pub(crate) kind: SlotKind,
    pub(crate) state: Rc<dyn Any>,
    /// Set for effect slots so teardown can reach them without downcasting.
    pub(crate) effect: Option<Rc<EffectSlot>>,
}

/// A mounted component instance.
pub(crate) struct ComponentNode {
    id: ComponentId,
    depth: usize,
    config: Rc<RuntimeConfig>,
    scheduler: Weak<RefCell<UpdateScheduler>>,

    spec: RefCell<ComponentSpec>,
    env: RefCell<Rc<ContextEnv>>,

    mounted: Cell<bool>,
    dirty: Cell<bool>,
    /// True once a first evaluation completed; fixes the slot layout.
    evaluated: Cell<bool>,
    render_count: Cell<u64>,

    cursor: Cell<usize>,
    slots: RefCell<Vec<Slot>>,
    read_contexts: RefCell<IndexSet<ContextId>>,
    queued_effects: RefCell<Vec<Rc<EffectSlot>>>,

    children: RefCell<Vec<Rc<ComponentNode>>>,
    last_view: RefCell<View>,
}

impl ComponentNode {
    pub(crate) fn new(
        spec: ComponentSpec,
        depth: usize,
        env: Rc<ContextEnv>,
        scheduler: Weak<RefCell<UpdateScheduler>>,
        config: Rc<RuntimeConfig>,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: ComponentId::new(),
            depth,
            config,
            scheduler,
            spec: RefCell::new(spec),
            env: RefCell::new(env),
            mounted: Cell::new(true),
            dirty: Cell::new(false),
            evaluated: Cell::new(false),
            render_count: Cell::new(0),
            cursor: Cell::new(0),
            slots: RefCell::new(Vec::new()),
            read_contexts: RefCell::new(IndexSet::new()),
            queued_effects: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            last_view: RefCell::new(View::Empty),
        })
    }

    pub(crate) fn id(&self) -> ComponentId {
        self.id
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn name(&self) -> String {
        self.spec.borrow().name().to_string()
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn has_evaluated(&self) -> bool {
        self.evaluated.get()
    }

    pub(crate) fn render_count(&self) -> u64 {
        self.render_count.get()
    }

    // ------------------------------------------------------------------
    // Spec, props and environment
    // ------------------------------------------------------------------

    pub(crate) fn spec(&self) -> Ref<'_, ComponentSpec> {
        self.spec.borrow()
    }

    pub(crate) fn replace_spec(&self, spec: ComponentSpec) {
        *self.spec.borrow_mut() = spec;
    }

    pub(crate) fn render_fn(&self) -> RenderFn {
        self.spec.borrow().render_fn()
    }

    pub(crate) fn props(&self) -> Option<Rc<dyn Any>> {
        self.spec.borrow().props_value()
    }

    pub(crate) fn env(&self) -> Rc<ContextEnv> {
        Rc::clone(&self.env.borrow())
    }

    pub(crate) fn set_env(&self, env: Rc<ContextEnv>) {
        *self.env.borrow_mut() = env;
    }

    /// Record that the current evaluation read `context`.
    pub(crate) fn record_context_read(&self, context: ContextId) {
        self.read_contexts.borrow_mut().insert(context);
    }

    /// Whether any context read by the last evaluation resolves to a
    /// different value in `next`.
    pub(crate) fn reads_changed_context(&self, next: &ContextEnv) -> bool {
        let current = self.env.borrow();
        self.read_contexts
            .borrow()
            .iter()
            .any(|context| current.differs_for(next, *context))
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Mark this component for re-evaluation in the next pass.
    pub(crate) fn schedule_update(self: &Rc<Self>) {
        self.dirty.set(true);
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.borrow_mut().schedule(self);
        }
    }

    // ------------------------------------------------------------------
    // Evaluation bookkeeping
    // ------------------------------------------------------------------

    /// Reset per-pass state before the render function runs.
    pub(crate) fn begin_evaluation(&self) {
        self.dirty.set(false);
        self.cursor.set(0);
        self.read_contexts.borrow_mut().clear();
        self.queued_effects.borrow_mut().clear();
    }

    /// Claim the next declaration position.
    pub(crate) fn next_slot_index(&self) -> usize {
        let index = self.cursor.get();
        self.cursor.set(index + 1);
        index
    }

    pub(crate) fn slot_state(&self, index: usize) -> Option<(SlotKind, Rc<dyn Any>)> {
        self.slots
            .borrow()
            .get(index)
            .map(|slot| (slot.kind, Rc::clone(&slot.state)))
    }

    pub(crate) fn push_slot(&self, slot: Slot) {
        self.slots.borrow_mut().push(slot);
    }

    pub(crate) fn queue_effect(&self, effect: Rc<EffectSlot>) {
        self.queued_effects.borrow_mut().push(effect);
    }

    pub(crate) fn take_queued_effects(&self) -> Vec<Rc<EffectSlot>> {
        std::mem::take(&mut *self.queued_effects.borrow_mut())
    }

    /// Validate the declaration count and seal the slot layout.
    pub(crate) fn finish_evaluation(&self) -> Result<()> {
        let declared = self.cursor.get();
        let expected = self.slots.borrow().len();
        if self.evaluated.get() && declared != expected {
            self.abort_evaluation();
            return Err(RuntimeError::OrderingViolation {
                component: self.name(),
                slot: declared.min(expected),
                detail: format!(
                    "pass made {declared} declarations, previous pass made {expected}"
                ),
            });
        }
        self.evaluated.set(true);
        self.render_count.set(self.render_count.get() + 1);
        Ok(())
    }

    /// Discard the effects queued by a failed evaluation.
    ///
    /// A failed first evaluation also forgets its slots, so the next attempt
    /// starts from scratch.
    pub(crate) fn abort_evaluation(&self) {
        for effect in self.take_queued_effects() {
            effect.cancel();
        }
        if !self.evaluated.get() {
            self.slots.borrow_mut().clear();
        }
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub(crate) fn children(&self) -> Ref<'_, Vec<Rc<ComponentNode>>> {
        self.children.borrow()
    }

    pub(crate) fn take_children(&self) -> Vec<Rc<ComponentNode>> {
        std::mem::take(&mut *self.children.borrow_mut())
    }

    pub(crate) fn set_children(&self, children: Vec<Rc<ComponentNode>>) {
        *self.children.borrow_mut() = children;
    }

    pub(crate) fn last_view(&self) -> Ref<'_, View> {
        self.last_view.borrow()
    }

    pub(crate) fn set_last_view(&self, view: View) {
        *self.last_view.borrow_mut() = view;
    }

    /// Unmount this node: cancel pending effects and run every outstanding
    /// cleanup exactly once. Children must be torn down first.
    pub(crate) fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.dirty.set(false);
        self.queued_effects.borrow_mut().clear();

        let effects: Vec<Rc<EffectSlot>> = self
            .slots
            .borrow()
            .iter()
            .filter_map(|slot| slot.effect.clone())
            .collect();
        for effect in effects {
            effect.teardown();
        }
        self.slots.borrow_mut().clear();

        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.borrow_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("depth", &self.depth)
            .field("mounted", &self.is_mounted())
            .field("render_count", &self.render_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Rc<ComponentNode> {
        ComponentNode::new(
            ComponentSpec::new("Widget", |_| Ok(View::Empty)),
            0,
            Rc::new(ContextEnv::default()),
            Weak::new(),
            Rc::new(RuntimeConfig::default()),
        )
    }

    #[test]
    fn component_ids_are_unique() {
        assert_ne!(ComponentId::new(), ComponentId::new());
    }

    #[test]
    fn new_nodes_are_mounted_and_clean() {
        let node = node();
        assert!(node.is_mounted());
        assert!(!node.is_dirty());
        assert!(!node.has_evaluated());
        assert_eq!(node.name(), "Widget");
    }

    #[test]
    fn slot_cursor_advances() {
        let node = node();
        node.begin_evaluation();
        assert_eq!(node.next_slot_index(), 0);
        assert_eq!(node.next_slot_index(), 1);
        node.begin_evaluation();
        assert_eq!(node.next_slot_index(), 0);
    }

    #[test]
    fn declaration_count_is_checked_after_first_pass() {
        let node = node();
        node.begin_evaluation();
        node.next_slot_index();
        node.push_slot(Slot {
            kind: SlotKind::Ref,
            state: Rc::new(0u8),
            effect: None,
        });
        node.finish_evaluation().unwrap();
        assert_eq!(node.render_count(), 1);

        node.begin_evaluation();
        let err = node.finish_evaluation().unwrap_err();
        assert!(err.is_ordering_violation());
    }

    #[test]
    fn schedule_update_marks_dirty() {
        let node = node();
        node.schedule_update();
        assert!(node.is_dirty());
        node.begin_evaluation();
        assert!(!node.is_dirty());
    }

    #[test]
    fn unmount_is_idempotent() {
        let node = node();
        node.unmount();
        node.unmount();
        assert!(!node.is_mounted());
    }

    #[test]
    fn slot_kinds_display() {
        assert_eq!(SlotKind::LayoutEffect.to_string(), "layout_effect");
        assert_eq!(SlotKind::MemoFn.to_string(), "memo_fn");
    }
}
