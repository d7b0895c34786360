//! Error Types
//!
//! Every failure the runtime can report is a [`RuntimeError`]. Errors abort
//! the evaluation pass they occur in and surface from [`Runtime::render_pass`],
//! [`Runtime::tick`] or [`Runtime::flush`]; the runtime never swallows them.
//!
//! [`Runtime::render_pass`]: crate::reactive::Runtime::render_pass
//! [`Runtime::tick`]: crate::reactive::Runtime::tick
//! [`Runtime::flush`]: crate::reactive::Runtime::flush

use crate::graph::ComponentId;

/// Result alias used throughout the crate.
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// Errors produced by the reactive runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A core operation was used outside the evaluation it belongs to, or on
    /// a component that has already been unmounted.
    #[error("lifecycle violation in `{operation}`: {detail}")]
    LifecycleViolation {
        operation: &'static str,
        detail: String,
    },

    /// Declarations ran in a different order (or count) than in the previous
    /// pass of the same component instance.
    #[error("ordering violation in component `{component}` at slot {slot}: {detail}")]
    OrderingViolation {
        component: String,
        slot: usize,
        detail: String,
    },

    /// A reducer panicked instead of returning the next state.
    #[error("reducer contract violation: {reason}")]
    ReducerContractViolation { reason: String },

    /// An effect action reported a failure.
    #[error("effect action in component `{component}` failed: {message}")]
    Action { component: String, message: String },

    /// Updates kept scheduling further passes past the configured limit.
    #[error("update depth exceeded: more than {limit} passes in a single flush")]
    UpdateDepthExceeded { limit: usize },

    /// No mounted root has this id.
    #[error("no mounted component with id {id:?}")]
    UnknownComponent { id: ComponentId },

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Build an [`RuntimeError::Action`] error from inside an effect action.
    ///
    /// The component name is filled in by the runtime when the error
    /// propagates out of the effect.
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            component: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn lifecycle(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::LifecycleViolation {
            operation,
            detail: detail.into(),
        }
    }

    /// Returns true for [`RuntimeError::LifecycleViolation`].
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, Self::LifecycleViolation { .. })
    }

    /// Returns true for [`RuntimeError::OrderingViolation`].
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, Self::OrderingViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        let err = RuntimeError::lifecycle("declare_cell", "no active evaluation");
        assert_eq!(
            err.to_string(),
            "lifecycle violation in `declare_cell`: no active evaluation"
        );
        assert!(err.is_lifecycle_violation());
        assert!(!err.is_ordering_violation());
    }

    #[test]
    fn action_errors_start_without_component() {
        match RuntimeError::action("title unavailable") {
            RuntimeError::Action { component, message } => {
                assert!(component.is_empty());
                assert_eq!(message, "title unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn config_errors_convert_from_serde() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: RuntimeError = parse.into();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
