//! Output stage - drains the event channel into batches for every sink

use crate::core::{
    event::Event,
    filter::{apply_all, Filter},
    pipeline_config::BatchConfig,
};
use crate::output::{OutputError, Sink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Counters reported when the stage stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub events: usize,
    pub batches: usize,
    pub failed_writes: usize,
}

/// Batches events, runs the filters and fans out to the sinks
pub struct OutputStage {
    filters: Vec<Filter>,
    sinks: Vec<Arc<dyn Sink>>,
    batch_size: usize,
    batch_delay: Duration,
    shutdown_grace: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl OutputStage {
    pub fn new(filters: Vec<Filter>, sinks: Vec<Arc<dyn Sink>>, batch: &BatchConfig) -> Self {
        Self {
            filters,
            sinks,
            batch_size: batch.size.max(1),
            batch_delay: Duration::from_millis(batch.delay_ms),
            shutdown_grace: Duration::from_millis(batch.shutdown_grace_ms),
            shutdown: None,
        }
    }

    /// Abandon writes still running `shutdown_grace` after this flips to true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run until every sender is dropped; the last partial batch is flushed
    pub async fn run(self, mut rx: mpsc::Receiver<Event>) -> StageStats {
        let mut stats = StageStats::default();

        loop {
            let mut batch = Vec::with_capacity(self.batch_size);
            match rx.recv().await {
                Some(event) => batch.push(event),
                None => break,
            }

            let deadline = Instant::now() + self.batch_delay;
            let mut closed = false;
            while batch.len() < self.batch_size {
                match timeout_at(deadline, rx.recv()).await {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            self.flush(batch, &mut stats).await;
            if closed {
                break;
            }
        }

        info!(
            "Output stage stopped: {} events in {} batches, {} failed writes",
            stats.events, stats.batches, stats.failed_writes
        );
        stats
    }

    async fn flush(&self, mut batch: Vec<Event>, stats: &mut StageStats) {
        for event in &mut batch {
            apply_all(&self.filters, event);
        }
        debug!("Flushing batch of {} events", batch.len());

        for sink in &self.sinks {
            let result = tokio::select! {
                result = sink.write_batch(&batch) => result,
                _ = self.shutdown_deadline() => {
                    warn!("{} sink still busy {:?} after shutdown, abandoning write", sink.name(), self.shutdown_grace);
                    Err(OutputError::ShutdownTimeout(self.shutdown_grace))
                }
            };
            if let Err(e) = result {
                error!("{} sink dropped a batch of {} events: {}", sink.name(), batch.len(), e);
                stats.failed_writes += 1;
            }
        }

        stats.events += batch.len();
        stats.batches += 1;
    }

    /// Resolves `shutdown_grace` after shutdown was requested, never without a signal
    async fn shutdown_deadline(&self) {
        let Some(mut shutdown) = self.shutdown.clone() else {
            return std::future::pending().await;
        };
        if shutdown.wait_for(|stop| *stop).await.is_err() {
            return std::future::pending().await;
        }
        tokio::time::sleep(self.shutdown_grace).await;
    }
}
