//! Reactive Primitives
//!
//! This module implements the per-component declarations (cells, derived
//! values, memoized functions, effects, references, reducers and shared
//! context) and the runtime that evaluates components and runs their effects.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell is a piece of state owned by one component instance. Writing it
//! through its setter schedules that component for re-evaluation. Writes
//! made before the next pass are batched into a single evaluation.
//!
//! ## Derived Values and Memoized Functions
//!
//! Both are gated by a dependency list. A derived value recomputes when the
//! list changes; a memoized function keeps its identity until it does.
//!
//! ## Effects
//!
//! An effect synchronizes state with the outside world. It runs after the
//! evaluation that declared it, only when its dependency list changed, and
//! may leave a cleanup behind. Layout effects run before the frame is
//! presented, standard effects after.
//!
//! ## Shared Context
//!
//! A provider binds a context to a value for its subtree. A component that
//! reads the context is re-evaluated when the value it observed changes.
//!
//! # Implementation Notes
//!
//! Declarations are identified by position, not by name. The runtime keeps
//! a thread-local evaluation stack so a [`Scope`] used outside its own
//! component's evaluation is detected instead of corrupting another
//! component's slots. The stack is internal: only the runtime can mark a
//! component as evaluating.
//!
//! ```compile_fail
//! use cellrt_core::reactive::EvaluationContext;
//! ```

pub mod deps;
mod cell;
mod context;
pub(crate) mod effect;
mod memo;
mod reference;
mod runtime;
mod scope;
pub(crate) mod shared;

pub use cell::{Dispatch, Setter};
pub use deps::{DepValue, Deps};
pub use effect::{Cleanup, EffectPhase, IntoEffectOutcome};
pub use memo::Callback;
pub use reference::RefHandle;
pub use runtime::{FlushReport, Frame, NullPresenter, PassReport, Presenter, Runtime};
pub use scope::Scope;
pub use shared::{create_shared_context, ContextId, SharedContext};
