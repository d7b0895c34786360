//! Runtime Configuration
//!
//! [`RuntimeConfig`] holds the few policy knobs of the runtime. It can be
//! built in code or deserialized from JSON; missing fields take their
//! defaults.
//!
//! ```rust
//! use cellrt_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "max_passes": 8 }"#).unwrap();
//! assert_eq!(config.max_passes, 8);
//! assert!(config.skip_equal_updates);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default upper bound on passes per [`flush`](crate::reactive::Runtime::flush).
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Policy knobs for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of evaluation passes a single flush may run before it
    /// fails with `UpdateDepthExceeded`. Layout-effect re-evaluations count
    /// toward the limit.
    pub max_passes: usize,

    /// When true, a setter call whose result equals the current value
    /// schedules no re-evaluation. When false, every setter call schedules
    /// one (calls before the next pass are still batched). A reducer that
    /// returns an equal state never schedules, whatever this says.
    pub skip_equal_updates: bool,
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            skip_equal_updates: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_passes, DEFAULT_MAX_PASSES);
        assert!(config.skip_equal_updates);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "skip_equal_updates": false }"#).unwrap();
        assert_eq!(config.max_passes, DEFAULT_MAX_PASSES);
        assert!(!config.skip_equal_updates);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = RuntimeConfig::from_json("{ max_passes: }").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
