//! Update Scheduler
//!
//! The scheduler collects the components whose cells, reducers or contexts
//! changed since the last pass, and hands them back parents-first.
//!
//! # Algorithm
//!
//! 1. A setter or dispatch marks its component dirty and inserts it here.
//!    Repeated updates to the same component before the next pass collapse
//!    into one entry (batching).
//! 2. At the start of a pass the runtime drains the queue. Entries are
//!    sorted by tree depth, which is a topological order for a tree: a
//!    parent is always evaluated before its descendants.
//! 3. If evaluating a parent already re-evaluated a scheduled child, the
//!    child is no longer dirty and the runtime skips it.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::node::{ComponentId, ComponentNode};

/// Queue of components awaiting re-evaluation.
pub(crate) struct UpdateScheduler {
    pending: IndexMap<ComponentId, Weak<ComponentNode>>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub(crate) fn new() -> Self {
        Self {
            pending: IndexMap::new(),
        }
    }

    /// Queue a component. Already-queued components keep their position.
    pub(crate) fn schedule(&mut self, node: &Rc<ComponentNode>) {
        if !self.pending.contains_key(&node.id()) {
            tracing::trace!(component = %node.id(), "scheduled for re-evaluation");
            self.pending.insert(node.id(), Rc::downgrade(node));
        }
    }

    /// Drop a component from the queue (it was evaluated or unmounted).
    pub(crate) fn remove(&mut self, id: ComponentId) {
        self.pending.shift_remove(&id);
    }

    pub(crate) fn contains(&self, id: ComponentId) -> bool {
        self.pending.contains_key(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the queue, parents first.
    ///
    /// Components that were dropped or unmounted in the meantime are
    /// discarded. The sort is stable, so siblings keep scheduling order.
    pub(crate) fn take_ordered(&mut self) -> Vec<Rc<ComponentNode>> {
        let mut nodes: Vec<Rc<ComponentNode>> = self
            .pending
            .drain(..)
            .filter_map(|(_, node)| node.upgrade())
            .filter(|node| node.is_mounted())
            .collect();
        nodes.sort_by_key(|node| node.depth());
        nodes
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::shared::ContextEnv;
    use crate::view::{ComponentSpec, View};

    fn node_at(depth: usize, scheduler: &Rc<RefCell<UpdateScheduler>>) -> Rc<ComponentNode> {
        ComponentNode::new(
            ComponentSpec::new(format!("Depth{depth}"), |_| Ok(View::Empty)),
            depth,
            Rc::new(ContextEnv::default()),
            Rc::downgrade(scheduler),
            Rc::new(RuntimeConfig::default()),
        )
    }

    #[test]
    fn repeated_updates_are_batched() {
        let scheduler = Rc::new(RefCell::new(UpdateScheduler::new()));
        let node = node_at(0, &scheduler);

        node.schedule_update();
        node.schedule_update();
        node.schedule_update();

        assert_eq!(scheduler.borrow().len(), 1);
        assert!(scheduler.borrow().contains(node.id()));
    }

    #[test]
    fn drains_parents_first() {
        let scheduler = Rc::new(RefCell::new(UpdateScheduler::new()));
        let leaf = node_at(2, &scheduler);
        let root = node_at(0, &scheduler);
        let middle = node_at(1, &scheduler);

        leaf.schedule_update();
        root.schedule_update();
        middle.schedule_update();

        let order: Vec<_> = scheduler
            .borrow_mut()
            .take_ordered()
            .iter()
            .map(|node| node.id())
            .collect();
        assert_eq!(order, vec![root.id(), middle.id(), leaf.id()]);
        assert!(scheduler.borrow().is_empty());
    }

    #[test]
    fn unmounted_components_are_skipped() {
        let scheduler = Rc::new(RefCell::new(UpdateScheduler::new()));
        let kept = node_at(0, &scheduler);
        let gone = node_at(0, &scheduler);

        kept.schedule_update();
        gone.schedule_update();
        gone.unmount();

        let drained = scheduler.borrow_mut().take_ordered();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id(), kept.id());
    }
}
