//! JSON-lines framing for the process transport

use serde::{de::DeserializeOwned, Serialize};

/// Maximum accepted line length (a source text plus envelope)
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes")]
    TooLarge(usize),

    #[error("Channel closed")]
    Disconnected,
}

/// Encode a message as a single JSON line, including the trailing newline
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line produced by [`encode_line`]
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::TooLarge(line.len()));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}
