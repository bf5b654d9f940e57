//! Log shipper - reads log files and streams them to a raw TCP listener
//!
//! Every non-blank line becomes `{"raw_content": "<trimmed line>"}` and is
//! sent as one JSON document per line.

use indicatif::ProgressBar;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 50000;

/// Records written per socket write
pub const BATCH_SIZE: usize = 100;

/// Error types for shipping
#[derive(Debug, Error)]
pub enum ShipError {
    #[error("log folder not found: {0}")]
    NotADirectory(PathBuf),

    #[error("invalid path for pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("error while listing files: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    GaveUp { attempts: u32, last: Box<ShipError> },
}

/// Every regular file under `root`, recursively, sorted
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, ShipError> {
    if !root.is_dir() {
        return Err(ShipError::NotADirectory(root.to_path_buf()));
    }

    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = format!("{}/**/*", escaped.trim_end_matches('/'));

    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Turn one line into a record; blank lines yield nothing
pub fn parse_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(json!({ "raw_content": trimmed }))
    }
}

/// Records of one file; unreadable files are logged and yield nothing
pub fn read_log_file(path: &Path) -> Vec<Value> {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(parse_line)
            .collect(),
        Err(e) => {
            warn!("Error reading file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Records of every file, in order, ticking the progress bar per file
pub fn read_log_files(files: &[PathBuf], progress: Option<&ProgressBar>) -> Vec<Value> {
    let mut records = Vec::new();
    for file in files {
        records.extend(read_log_file(file));
        if let Some(bar) = progress {
            bar.inc(1);
        }
    }
    records
}

/// TCP client for the raw socket listener
#[derive(Debug, Clone)]
pub struct Shipper {
    host: String,
    port: u16,
    io_timeout: Duration,
    reconnect_delay: Duration,
    max_attempts: Option<u32>,
}

impl Default for Shipper {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Shipper {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            io_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }

    /// Timeout for connecting and for each batch write
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Stop retrying after this many attempts (unset = retry forever)
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Send every record over one connection; returns the number sent
    pub async fn send(&self, records: &[Value]) -> Result<usize, ShipError> {
        if records.is_empty() {
            info!("No data to send");
            return Ok(0);
        }

        let addr = self.address();
        let mut stream = timeout(self.io_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ShipError::Timeout(self.io_timeout))?
            .map_err(|source| ShipError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!("Connected to {}, sending {} records", addr, records.len());

        let mut sent = 0;
        for batch in records.chunks(BATCH_SIZE) {
            let mut payload = String::new();
            for record in batch {
                // A `Value` always serializes
                payload.push_str(&record.to_string());
                payload.push('\n');
            }
            timeout(self.io_timeout, stream.write_all(payload.as_bytes()))
                .await
                .map_err(|_| ShipError::Timeout(self.io_timeout))??;
            sent += batch.len();
            debug!("Sent {}/{} records", sent, records.len());
        }

        timeout(self.io_timeout, stream.shutdown())
            .await
            .map_err(|_| ShipError::Timeout(self.io_timeout))??;
        info!("Successfully sent {} log entries", sent);
        Ok(sent)
    }

    /// [`Shipper::send`], reconnecting after a delay until it succeeds
    pub async fn send_with_retry(&self, records: &[Value]) -> Result<usize, ShipError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send(records).await {
                Ok(sent) => return Ok(sent),
                Err(e) => {
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(ShipError::GaveUp {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    warn!(
                        "Send attempt {} failed: {}; retrying in {:?}",
                        attempt, e, self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}
