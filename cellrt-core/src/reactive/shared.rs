//! Shared Context
//!
//! A [`SharedContext`] is a key for a value that a provider publishes to its
//! subtree. Lookups resolve to the nearest enclosing provider, or to the
//! context's default when there is none.
//!
//! # Implementation
//!
//! There is no global table. Each component instance carries a
//! [`ContextEnv`]: the set of provided values in force where it was
//! rendered. The parent builds its children's environments while walking
//! the view it returned, adding an entry whenever it passes through a
//! provider. When a provided value changes, reconciliation compares the old
//! and new environments of every descendant and re-evaluates exactly the
//! ones that read the changed context.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::deps::DepValue;
use crate::graph::ComponentId;

/// Unique identifier for a shared context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct ContextDef<T> {
    id: ContextId,
    default: T,
}

/// Handle to a shared context with a default value.
pub struct SharedContext<T> {
    def: Rc<ContextDef<T>>,
}

/// Create a shared context. Readers without an enclosing provider observe
/// `default`.
pub fn create_shared_context<T: Clone + PartialEq + 'static>(default: T) -> SharedContext<T> {
    SharedContext {
        def: Rc::new(ContextDef {
            id: ContextId::next(),
            default,
        }),
    }
}

impl<T> SharedContext<T> {
    pub fn id(&self) -> ContextId {
        self.def.id
    }

    pub fn default_value(&self) -> &T {
        &self.def.default
    }
}

impl<T> Clone for SharedContext<T> {
    fn clone(&self) -> Self {
        Self {
            def: Rc::clone(&self.def),
        }
    }
}

impl<T> PartialEq for SharedContext<T> {
    fn eq(&self, other: &Self) -> bool {
        self.def.id == other.def.id
    }
}

impl<T> fmt::Debug for SharedContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext").field("id", &self.def.id).finish()
    }
}

impl<T: 'static> DepValue for SharedContext<T> {
    fn same_as(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<SharedContext<T>>()
            .is_some_and(|other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type-erased equality used to compare provided values.
pub(crate) type SameFn = fn(&dyn Any, &dyn Any) -> bool;

pub(crate) fn same_value<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A value published by a provider.
#[derive(Clone)]
pub(crate) struct ProvidedValue {
    pub(crate) value: Rc<dyn Any>,
    pub(crate) same: SameFn,
    pub(crate) provider: ComponentId,
}

/// Provided values in force at one point of the tree.
#[derive(Clone, Default)]
pub(crate) struct ContextEnv {
    values: IndexMap<ContextId, ProvidedValue>,
}

impl ContextEnv {
    /// A copy of this environment with `context` bound to `value`.
    pub(crate) fn with_value(&self, context: ContextId, value: ProvidedValue) -> Self {
        let mut next = self.clone();
        next.values.insert(context, value);
        next
    }

    pub(crate) fn get(&self, context: ContextId) -> Option<&ProvidedValue> {
        self.values.get(&context)
    }

    /// Whether `context` resolves differently in `other`.
    pub(crate) fn differs_for(&self, other: &ContextEnv, context: ContextId) -> bool {
        match (self.get(context), other.get(context)) {
            (None, None) => false,
            (Some(a), Some(b)) => {
                !(Rc::ptr_eq(&a.value, &b.value) || (a.same)(a.value.as_ref(), b.value.as_ref()))
            }
            _ => true,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Debug for ContextEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.values
                    .iter()
                    .map(|(id, provided)| (id, provided.provider)),
            )
            .finish()
    }
}
