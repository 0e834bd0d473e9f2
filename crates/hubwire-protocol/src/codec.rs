//! Codec for encoding and decoding hub envelopes.
//!
//! The wire format is one JSON object per message. Framing (the trailing
//! newline) is handled by the connection, not here.

use serde_json::Map;
use thiserror::Error;

use crate::envelope::{Envelope, Value};

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound text is not a usable envelope.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The receive buffer grew past its limit without yielding a message.
    #[error("Receive buffer size {size} exceeds limit {limit}")]
    BufferOverflow {
        /// Bytes held when the limit was hit.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The command/value pair is not valid for the device kind.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Encode an envelope to its wire text (without the newline delimiter).
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode an envelope from wire text.
///
/// The text must be a JSON object with a non-empty `deviceType`, a
/// non-negative integer `id` and a non-empty `command`. A missing or `null`
/// `value` decodes to `None`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] if the text is not JSON, is not
/// an object, or lacks a required field.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedMessage(format!("invalid JSON: {e}")))?;

    let serde_json::Value::Object(mut object) = parsed else {
        return Err(ProtocolError::MalformedMessage(
            "expected a JSON object".to_string(),
        ));
    };

    let device_type = required_string(&object, "deviceType")?;
    let command = required_string(&object, "command")?;
    let id = match object.get("id") {
        Some(id) => id.as_u64().ok_or_else(|| {
            ProtocolError::MalformedMessage(format!("id must be a non-negative integer, got {id}"))
        })?,
        None => return Err(ProtocolError::MalformedMessage("missing id".to_string())),
    };

    let value = match object.remove("value") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Bool(b)) => Some(Value::Bool(b)),
        Some(serde_json::Value::Number(n)) => Some(Value::Number(n)),
        Some(serde_json::Value::String(s)) => Some(Value::Text(s)),
        Some(other) => {
            return Err(ProtocolError::MalformedMessage(format!(
                "unsupported value type: {other}"
            )))
        }
    };

    Ok(Envelope {
        device_type,
        id,
        command,
        value,
    })
}

fn required_string(
    object: &Map<String, serde_json::Value>,
    field: &str,
) -> Result<String, ProtocolError> {
    match object.get(field).and_then(serde_json::Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ProtocolError::MalformedMessage(format!(
            "missing or empty {field}"
        ))),
    }
}
