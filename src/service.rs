//! Running log pipeline: listeners feeding the output stage

use crate::core::pipeline_config::PipelineConfig;
use crate::ingest::ListenerSet;
use crate::output::{build_sinks, OutputStage, Sink, StageStats};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a started pipeline
pub struct PipelineService {
    name: String,
    addrs: Vec<SocketAddr>,
    shutdown: watch::Sender<bool>,
    listeners: Vec<JoinHandle<()>>,
    stage: JoinHandle<StageStats>,
}

impl PipelineService {
    /// Bind the listeners and start the pipeline with the configured sinks
    pub async fn start(config: &PipelineConfig) -> Result<Self> {
        let sinks = build_sinks(&config.outputs).context("Failed to create outputs")?;
        Self::start_with_sinks(config, sinks).await
    }

    /// Like [`PipelineService::start`] with caller-provided sinks
    pub async fn start_with_sinks(config: &PipelineConfig, sinks: Vec<Arc<dyn Sink>>) -> Result<Self> {
        let filters = config.compiled_filters()?;
        let listeners = ListenerSet::bind(&config.inputs).await?;
        let addrs = listeners.local_addrs()?;

        let (tx, rx) = mpsc::channel(config.batch.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let stage = OutputStage::new(filters, sinks, &config.batch).with_shutdown(shutdown_rx.clone());
        let stage = tokio::spawn(stage.run(rx));
        // Only the listeners hold senders, so the stage stops once they do
        let listeners = listeners.spawn(tx, shutdown_rx);

        info!("Pipeline '{}' listening on {:?}", config.name, addrs);
        Ok(Self {
            name: config.name.clone(),
            addrs,
            shutdown,
            listeners,
            stage,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound addresses, in input order
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Stop accepting, close connections and flush what is buffered
    pub async fn shutdown(self) -> Result<StageStats> {
        info!("Shutting down pipeline '{}'", self.name);
        // Receivers may already be gone; that is fine
        let _ = self.shutdown.send(true);
        for listener in self.listeners {
            listener.await.context("Listener task failed")?;
        }
        let stats = self.stage.await.context("Output stage failed")?;
        Ok(stats)
    }
}
