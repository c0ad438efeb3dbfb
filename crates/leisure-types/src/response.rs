//! Response envelopes shared by every session endpoint.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::chunk::WireChunk;

/// Failure to interpret a response body.
#[derive(Error, Debug)]
pub enum WireError {
    /// The authority reported an error in its payload.
    #[error("remote error: {0}")]
    Remote(String),

    /// The payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Reject a payload that carries an `error` field, regardless of HTTP status.
pub fn check_error(payload: Value) -> Result<Value, WireError> {
    if let Some(err) = payload.as_object().and_then(|o| o.get("error")) {
        let msg = match err {
            Value::String(s) => s.clone(),
            Value::Null => return Ok(payload),
            other => other.to_string(),
        };
        return Err(WireError::Remote(msg));
    }
    Ok(payload)
}

/// The connect payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    /// Structured mode: every chunk of the document.
    Chunks(Vec<WireChunk>),
    /// Non-structured mode: the raw document text.
    Plain(String),
}

#[derive(Deserialize)]
struct ChunksPayload {
    chunks: Vec<WireChunk>,
}

#[derive(Deserialize)]
struct DocumentPayload {
    document: String,
}

impl Snapshot {
    /// Decode a connect response that already passed [`check_error`].
    pub fn from_payload(payload: Value) -> Result<Self, WireError> {
        match payload {
            Value::String(doc) => Ok(Snapshot::Plain(doc)),
            Value::Object(ref obj) if obj.contains_key("chunks") => {
                let p: ChunksPayload = serde_json::from_value(payload)?;
                Ok(Snapshot::Chunks(p.chunks))
            }
            other => {
                let p: DocumentPayload = serde_json::from_value(other)?;
                Ok(Snapshot::Plain(p.document))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_field_is_a_failure() {
        let err = check_error(json!({ "error": "doc not found" })).unwrap_err();
        assert!(matches!(err, WireError::Remote(ref m) if m == "doc not found"));
    }

    #[test]
    fn payload_without_error_passes_through() {
        let v = check_error(json!(true)).unwrap();
        assert_eq!(v, json!(true));
    }

    #[test]
    fn snapshot_accepts_both_modes() {
        let plain = Snapshot::from_payload(json!("hello\n")).unwrap();
        assert_eq!(plain, Snapshot::Plain("hello\n".into()));

        let structured = Snapshot::from_payload(json!({
            "chunks": [{ "type": "text", "id": "t1", "text": "hello\n" }]
        }))
        .unwrap();
        match structured {
            Snapshot::Chunks(chunks) => assert_eq!(chunks.len(), 1),
            other => panic!("expected chunks, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_rejects_unknown_shapes() {
        assert!(Snapshot::from_payload(json!(42)).is_err());
    }
}
