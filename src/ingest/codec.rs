//! Line codecs for the raw socket listener

use crate::core::{event::Event, pipeline_config::Codec};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while decoding one line
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Decode one line (without its terminator) into an event.
///
/// Returns `Ok(None)` for blank lines. Invalid UTF-8 is replaced rather
/// than rejected.
pub fn decode_line(codec: Codec, line: &[u8]) -> Result<Option<Event>, CodecError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return Ok(None);
    }

    match codec {
        Codec::JsonLines => match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Some(Event::from_json_object(fields))),
            other => Err(CodecError::NotAnObject(kind(&other))),
        },
        Codec::Line => {
            let mut fields = Map::new();
            fields.insert("message".to_string(), Value::String(text.to_string()));
            Ok(Some(Event::from_json_object(fields)))
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
