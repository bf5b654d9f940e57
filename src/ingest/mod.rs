//! Ingestion listeners
//!
//! Every configured input becomes one TCP listener. Listeners are bound up
//! front so address conflicts surface at startup; each then runs its own
//! accept loop and spawns one task per connection. Decoded events are sent
//! into a bounded channel drained by the output stage.

pub mod beats;
pub mod codec;
pub mod tcp;

use crate::core::{event::Event, pipeline_config::InputConfig};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub use beats::{Frame, ProtocolError};
pub use codec::{decode_line, CodecError};

/// A bound listener waiting to be started
pub struct BoundListener {
    pub input: InputConfig,
    listener: TcpListener,
}

impl BoundListener {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// All listeners of a pipeline
pub struct ListenerSet {
    listeners: Vec<BoundListener>,
}

impl ListenerSet {
    /// Bind every input
    pub async fn bind(inputs: &[InputConfig]) -> Result<Self> {
        let mut listeners = Vec::with_capacity(inputs.len());
        for input in inputs {
            let listener = TcpListener::bind(input.bind_addr())
                .await
                .with_context(|| format!("Failed to bind {} listener on {}", input.protocol(), input.bind_addr()))?;
            info!("Bound {} -> {}", input, listener.local_addr()?);
            listeners.push(BoundListener {
                input: input.clone(),
                listener,
            });
        }
        Ok(Self { listeners })
    }

    /// Actual addresses, in input order (resolves port 0)
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.listeners.iter().map(BoundListener::local_addr).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Start every accept loop
    pub fn spawn(self, tx: mpsc::Sender<Event>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.listeners
            .into_iter()
            .map(|bound| {
                let tx = tx.clone();
                let shutdown = shutdown.clone();
                match bound.input {
                    InputConfig::Beats { .. } => {
                        tokio::spawn(beats::serve(bound.listener, tx, shutdown))
                    }
                    InputConfig::Tcp { codec, .. } => {
                        tokio::spawn(tcp::serve(bound.listener, codec, tx, shutdown))
                    }
                }
            })
            .collect()
    }
}
