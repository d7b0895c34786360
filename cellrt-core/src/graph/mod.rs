//! Component Tree
//!
//! This module holds the mounted component instances and the scheduler that
//! decides which of them to re-evaluate next.
//!
//! # Overview
//!
//! The tree is owned top-down: the runtime owns its roots, every node owns
//! its children. Handles given out to user code (setters, dispatchers, refs)
//! hold weak references to their node, so an unmounted component is dropped
//! even if a stale handle survives, and the handle reports a lifecycle
//! violation instead of touching freed state.
//!
//! # Design Decisions
//!
//! 1. Declaration state lives in a positional slot vector per node. The
//!    position is the identity of a declaration, so the node validates kind,
//!    value type and count on every pass.
//!
//! 2. The scheduler is keyed by component id and orders by depth. For a tree
//!    this is all the topological sorting needed.

mod node;
mod scheduler;

pub use node::{ComponentId, SlotKind};
pub(crate) use node::{ComponentNode, Slot};
pub(crate) use scheduler::UpdateScheduler;
