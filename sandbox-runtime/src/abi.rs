//! Runtime limits and infrastructure errors
//!
//! Script-level failures (a thrown `ReferenceError`, a syntax error) are not
//! represented here; they travel as [`crate::Exception`] and end up as a
//! `Failure`. These types cover the plumbing around execution.

use crate::dom::NodeId;
use sandbox_types::ProtocolError;
use serde::{Deserialize, Serialize};

/// Runtime limits for script execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeLimits {
    /// Maximum nested script function calls (default: 256)
    pub max_call_depth: usize,
    /// Maximum render passes for a single update (default: 25)
    pub max_render_passes: usize,
    /// Maximum accepted source length in bytes (default: 1 MiB)
    pub max_source_bytes: usize,
    /// Maximum syntactic nesting of brackets, blocks and tags (default: 256)
    pub max_nesting_depth: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_render_passes: 25,
            max_source_bytes: 1024 * 1024, // 1 MiB
            max_nesting_depth: sandbox_script::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Error types for runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Source too large: {size} bytes exceeds the {limit} byte limit")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Nothing is mounted")]
    NotMounted,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to spawn runtime thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_fill_missing_fields() {
        let limits: RuntimeLimits = serde_json::from_str(r#"{"max_call_depth": 64}"#).unwrap();
        assert_eq!(limits.max_call_depth, 64);
        assert_eq!(limits.max_render_passes, 25);
        assert_eq!(limits.max_source_bytes, 1024 * 1024);
        assert_eq!(limits.max_nesting_depth, 256);
    }
}
