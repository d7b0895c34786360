//! cellrt Core
//!
//! This crate provides a single-threaded reactive runtime for component-based
//! user interfaces. It implements:
//!
//! - Per-component state (cells and reducers)
//! - Derived values and memoized functions gated by dependency lists
//! - Layout and standard effects with cleanup
//! - Persistent references and provider-scoped shared context
//! - A pass pipeline: evaluate, commit, layout effects, present, effects
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: declarations, the evaluation scope and the runtime
//! - `graph`: component tree nodes and the update scheduler
//! - `view`: what a render function returns
//! - `error`, `config`: error taxonomy and runtime configuration
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use cellrt_core::{ComponentSpec, Runtime, Setter, View};
//!
//! let handle: Rc<RefCell<Option<Setter<i32>>>> = Rc::default();
//! let exported = handle.clone();
//!
//! let mut runtime = Runtime::new();
//! runtime.mount(ComponentSpec::new("Counter", move |scope| {
//!     let (count, set_count) = scope.declare_cell(0)?;
//!     *exported.borrow_mut() = Some(set_count);
//!     Ok(View::text(format!("count: {count}")))
//! }));
//! runtime.flush()?;
//! assert_eq!(runtime.frame().to_string(), "count: 0");
//!
//! // Simulate a click.
//! let set_count = handle.borrow().clone().unwrap();
//! set_count.update(|n| n + 1)?;
//! runtime.flush()?;
//! assert_eq!(runtime.frame().to_string(), "count: 1");
//! # Ok::<(), cellrt_core::RuntimeError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod view;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use graph::ComponentId;
pub use reactive::{
    create_shared_context, Callback, Cleanup, Deps, Dispatch, FlushReport, Frame, PassReport,
    Presenter, RefHandle, Runtime, Scope, Setter, SharedContext,
};
pub use view::{ComponentSpec, View};
