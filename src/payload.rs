//! Payloads handed to a send session and data handed back by a receive session

use serde::Serialize;
use serde_json::Value;

use crate::{Result, SyncError};

/// Data to transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Sent verbatim.
    Text(String),

    /// Serialized with `serde_json` at session start.
    ///
    /// Only objects and arrays are serialized; a string value is sent
    /// verbatim, and numbers, booleans and null are rejected.
    Json(Value),
}

impl Payload {
    /// Convert any serializable value into a JSON payload.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|err| SyncError::invalid(format!("payload is not JSON-compatible: {err}")))
    }

    /// Produce the string that will be chunked onto the wire.
    pub fn serialize(&self) -> Result<String> {
        let text = match self {
            Payload::Text(text) => text.clone(),
            Payload::Json(Value::String(text)) => text.clone(),
            Payload::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string(value).map_err(|err| {
                    SyncError::invalid(format!("payload is not JSON-compatible: {err}"))
                })?
            }
            Payload::Json(other) => {
                return Err(SyncError::invalid(format!(
                    "payload must be a string or a JSON object/array, got {other}"
                )));
            }
        };

        if text.is_empty() {
            return Err(SyncError::invalid("payload must not be empty"));
        }
        Ok(text)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Reassembled data from a completed receive session.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivedPayload {
    /// The joined chunks parsed as JSON.
    Json(Value),

    /// The joined chunks, including any trailing padding, when they are not JSON.
    Text(String),
}

impl ReceivedPayload {
    /// Parse joined chunk text, falling back to the raw string.
    pub fn from_joined(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => ReceivedPayload::Json(value),
            Err(_) => ReceivedPayload::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ReceivedPayload::Json(value) => Some(value),
            ReceivedPayload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ReceivedPayload::Text(text) => Some(text),
            ReceivedPayload::Json(_) => None,
        }
    }
}
