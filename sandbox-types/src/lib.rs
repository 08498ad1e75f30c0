//! Shared types for the component sandbox
//!
//! This crate provides the message schema exchanged between the editor host
//! and the execution runtime, the typed in-process channel pair carrying it,
//! and a JSON-lines codec for running the runtime in a separate process.
//!
//! Every message is a flat envelope `{"type": ..., ...payload}`:
//!
//! | direction       | type              | payload            |
//! |-----------------|-------------------|--------------------|
//! | runtime → host  | `FRAME_READY`     | none               |
//! | host → runtime  | `EXECUTE_CODE`    | `{code}`           |
//! | runtime → host  | `EXECUTION_ERROR` | `{error, stack?}`  |

pub mod channel;
pub mod codec;

use serde::{Deserialize, Serialize};

pub use channel::{channel, HostPort, RuntimePort};
pub use codec::{decode_line, encode_line, ProtocolError};

/// Identifier of the element the runtime mounts author components into
pub const DEFAULT_ANCHOR_ID: &str = "preview-root";

/// Quiet period after the last edit before the host dispatches
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 500;

/// Messages sent from the host to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "EXECUTE_CODE")]
    ExecuteCode { code: String },
}

/// Messages sent from the runtime to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeMessage {
    /// The runtime's listener is installed; the host may begin dispatching
    #[serde(rename = "FRAME_READY")]
    FrameReady,

    /// The last execution attempt failed
    #[serde(rename = "EXECUTION_ERROR")]
    ExecutionError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

/// Request to execute one version of the author's source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl From<ExecutionRequest> for HostMessage {
    fn from(request: ExecutionRequest) -> Self {
        HostMessage::ExecuteCode { code: request.code }
    }
}

impl From<HostMessage> for ExecutionRequest {
    fn from(message: HostMessage) -> Self {
        match message {
            HostMessage::ExecuteCode { code } => ExecutionRequest { code },
        }
    }
}

/// A failed execution attempt, normalized from every error class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub stack: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<Failure> for RuntimeMessage {
    fn from(failure: Failure) -> Self {
        RuntimeMessage::ExecutionError {
            error: failure.message,
            stack: failure.stack,
        }
    }
}

/// Outcome of one execution attempt
///
/// Success is never transmitted: silence on the channel means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failure(Failure),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ExecutionOutcome::Success => None,
            ExecutionOutcome::Failure(failure) => Some(failure),
        }
    }

    /// The message the runtime posts for this outcome, if any
    pub fn into_message(self) -> Option<RuntimeMessage> {
        match self {
            ExecutionOutcome::Success => None,
            ExecutionOutcome::Failure(failure) => Some(failure.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_code_envelope() {
        let msg = HostMessage::ExecuteCode {
            code: "function App() {}".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "EXECUTE_CODE", "code": "function App() {}"}));
    }

    #[test]
    fn test_frame_ready_envelope() {
        let value = serde_json::to_value(RuntimeMessage::FrameReady).unwrap();
        assert_eq!(value, json!({"type": "FRAME_READY"}));
    }

    #[test]
    fn test_execution_error_omits_missing_stack() {
        let msg: RuntimeMessage = Failure::new("App is not defined").into();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "EXECUTION_ERROR", "error": "App is not defined"}));
    }

    #[test]
    fn test_execution_error_accepts_stack() {
        let msg: RuntimeMessage = serde_json::from_value(json!({
            "type": "EXECUTION_ERROR",
            "error": "boom",
            "stack": "Error: boom\n    at App (1:1)"
        }))
        .unwrap();
        assert_eq!(
            msg,
            RuntimeMessage::ExecutionError {
                error: "boom".to_string(),
                stack: Some("Error: boom\n    at App (1:1)".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<HostMessage, _> =
            serde_json::from_value(json!({"type": "RELOAD", "code": ""}));
        assert!(result.is_err());
    }

    #[test]
    fn test_success_posts_nothing() {
        assert_eq!(ExecutionOutcome::Success.into_message(), None);
        let failed = ExecutionOutcome::Failure(Failure::new("x"));
        assert!(matches!(
            failed.into_message(),
            Some(RuntimeMessage::ExecutionError { .. })
        ));
    }
}
