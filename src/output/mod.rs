//! Output sinks and the batching stage in front of them

pub mod elasticsearch;
pub mod stage;
pub mod stdout;

use crate::core::{event::Event, pipeline_config::OutputConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use elasticsearch::ElasticsearchSink;
pub use stage::{OutputStage, StageStats};
pub use stdout::StdoutSink;

/// Error types for sink writes
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bulk request rejected ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("unreadable bulk response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("abandoned {0:?} after shutdown was requested")]
    ShutdownTimeout(std::time::Duration),
}

impl OutputError {
    /// Whether the whole request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            OutputError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            OutputError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Destination for batches of events
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Write a batch; events that cannot be stored are dropped by the sink
    async fn write_batch(&self, events: &[Event]) -> Result<(), OutputError>;
}

/// Instantiate the configured sinks
pub fn build_sinks(outputs: &[OutputConfig]) -> Result<Vec<Arc<dyn Sink>>, OutputError> {
    outputs
        .iter()
        .map(|output| -> Result<Arc<dyn Sink>, OutputError> {
            Ok(match output {
                OutputConfig::Elasticsearch(config) => Arc::new(ElasticsearchSink::new(config)?),
                OutputConfig::Stdout => Arc::new(StdoutSink::new()),
            })
        })
        .collect()
}
