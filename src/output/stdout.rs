//! Sink that prints one JSON document per line

use crate::core::event::Event;
use crate::output::{OutputError, Sink};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Writes documents to standard output
pub struct StdoutSink {
    // Serializes writers so batches do not interleave
    lock: Mutex<()>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Render events as newline-delimited JSON documents
pub fn render_lines(events: &[Event]) -> Result<String, OutputError> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(&event.to_document())?);
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn write_batch(&self, events: &[Event]) -> Result<(), OutputError> {
        let rendered = render_lines(events)?;
        let _guard = self.lock.lock().await;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_lines() {
        let events: Vec<Event> = [json!({"a": 1, "@timestamp": "2024-01-01T00:00:00Z"}), json!({"b": 2})]
            .into_iter()
            .map(|v| Event::from_json_object(v.as_object().cloned().unwrap()))
            .collect();

        let out = render_lines(&events).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"@timestamp":"2024-01-01T00:00:00Z","a":1}"#);
        assert!(lines[1].contains(r#""b":2"#));
    }
}
