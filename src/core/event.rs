//! Event model flowing from the listeners to the output stage

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Field that carries the event time
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field Beats uses for per-event metadata that must not be indexed
pub const METADATA_FIELD: &str = "@metadata";

/// A single log event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event time used for index name resolution
    pub timestamp: DateTime<Utc>,

    /// Event fields, exactly as received
    pub fields: Map<String, Value>,

    /// Side-channel metadata (never written to the sink)
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Create an event from received fields, stamped with the current time
    /// unless the fields carry a parseable `@timestamp`
    pub fn from_json_object(fields: Map<String, Value>) -> Self {
        Self::from_json_object_at(fields, Utc::now())
    }

    /// Like [`Event::from_json_object`] with an explicit receive time
    pub fn from_json_object_at(mut fields: Map<String, Value>, received_at: DateTime<Utc>) -> Self {
        let timestamp = fields
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(received_at);

        let metadata = match fields.remove(METADATA_FIELD) {
            Some(Value::Object(map)) => map,
            Some(other) => {
                // Not an object: keep it as a regular field
                fields.insert(METADATA_FIELD.to_string(), other);
                Map::new()
            }
            None => Map::new(),
        };

        Self {
            timestamp,
            fields,
            metadata,
        }
    }

    /// Look up a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a nested field by path (`["a", "b"]` is `[a][b]`)
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Set a top-level field, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Remove a top-level field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// The document written to the sink
    ///
    /// Fields are passed through untouched; `@timestamp` is only added when
    /// the source did not carry one.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        if !doc.contains_key(TIMESTAMP_FIELD) {
            doc.insert(
                TIMESTAMP_FIELD.to_string(),
                Value::String(
                    self.timestamp
                        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ),
            );
        }
        Value::Object(doc)
    }
}
