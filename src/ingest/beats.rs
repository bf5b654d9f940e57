//! Beats listener speaking the Lumberjack v2 protocol
//!
//! Frames start with the version byte `'2'` and a frame type:
//!
//! * `W` window size (u32): how many events the client sends before it
//!   waits for an acknowledgement
//! * `J` JSON event: sequence (u32), payload length (u32), payload
//! * `D` key/value event: sequence (u32), pair count (u32), then
//!   length-prefixed key and value strings
//! * `C` compressed block: length (u32), zlib stream of further frames
//!
//! The server answers with `'2' 'A' <seq>` once a window has been received.
//! All integers are big-endian.

use crate::core::event::Event;
use flate2::read::ZlibDecoder;
use serde_json::{Map, Value};
use std::io::Read;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const VERSION: u8 = b'2';
const FRAME_WINDOW: u8 = b'W';
const FRAME_JSON: u8 = b'J';
const FRAME_DATA: u8 = b'D';
const FRAME_COMPRESSED: u8 = b'C';
const FRAME_ACK: u8 = b'A';

/// Largest payload or inflated block accepted from a client
const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Protocol violations; they close the offending connection only
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unknown frame type {0:#04x}")]
    UnknownFrame(u8),

    #[error("payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),

    #[error("compressed frame inside a compressed frame")]
    NestedCompression,

    #[error("connection closed mid-frame")]
    Truncated,
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Window(u32),
    Json { seq: u32, payload: Vec<u8> },
    Data { seq: u32, fields: Map<String, Value> },
    Compressed(Vec<u8>),
}

/// Read the next frame; `Ok(None)` on a clean end of stream
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let version = match reader.read_u8().await {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let frame = match truncated(reader.read_u8().await)? {
        FRAME_WINDOW => Frame::Window(truncated(reader.read_u32().await)?),
        FRAME_JSON => {
            let seq = truncated(reader.read_u32().await)?;
            let payload = read_sized(reader).await?;
            Frame::Json { seq, payload }
        }
        FRAME_DATA => {
            let seq = truncated(reader.read_u32().await)?;
            let pairs = truncated(reader.read_u32().await)?;
            let mut fields = Map::new();
            for _ in 0..pairs {
                let key = read_sized(reader).await?;
                let value = read_sized(reader).await?;
                fields.insert(
                    String::from_utf8_lossy(&key).into_owned(),
                    Value::String(String::from_utf8_lossy(&value).into_owned()),
                );
            }
            Frame::Data { seq, fields }
        }
        FRAME_COMPRESSED => Frame::Compressed(read_sized(reader).await?),
        other => return Err(ProtocolError::UnknownFrame(other)),
    };

    Ok(Some(frame))
}

async fn read_sized<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = truncated(reader.read_u32().await)? as usize;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    truncated(reader.read_exact(&mut buf).await)?;
    Ok(buf)
}

fn truncated<T>(result: std::io::Result<T>) -> Result<T, ProtocolError> {
    result.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::Io(e)
        }
    })
}

fn inflate(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(payload)
        .take(MAX_PAYLOAD as u64 + 1)
        .read_to_end(&mut inflated)?;
    if inflated.len() > MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge(inflated.len()));
    }
    Ok(inflated)
}

/// Per-connection window bookkeeping
struct Session<W> {
    writer: W,
    peer: SocketAddr,
    tx: mpsc::Sender<Event>,
    window: u32,
    received: u32,
    forwarded: usize,
}

impl<W: AsyncWrite + Unpin> Session<W> {
    /// Handle an uncompressed frame; `false` once the output stage is gone
    async fn on_frame(&mut self, frame: Frame) -> Result<bool, ProtocolError> {
        let (seq, event) = match frame {
            Frame::Window(size) => {
                debug!("beats window of {} from {}", size, self.peer);
                self.window = size;
                self.received = 0;
                return Ok(true);
            }
            Frame::Json { seq, payload } => match serde_json::from_slice::<Value>(&payload) {
                Ok(Value::Object(fields)) => (seq, Some(Event::from_json_object(fields))),
                Ok(_) => {
                    warn!("dropping beats event {} from {}: not a JSON object", seq, self.peer);
                    (seq, None)
                }
                Err(e) => {
                    warn!("dropping beats event {} from {}: {}", seq, self.peer, e);
                    (seq, None)
                }
            },
            Frame::Data { seq, fields } => (seq, Some(Event::from_json_object(fields))),
            Frame::Compressed(_) => return Err(ProtocolError::NestedCompression),
        };

        if let Some(event) = event {
            if self.tx.send(event).await.is_err() {
                return Ok(false);
            }
            self.forwarded += 1;
        }

        // Dropped events still count towards the window, or the client
        // would wait for an ack forever
        self.received += 1;
        if self.window == 0 || self.received >= self.window {
            self.ack(seq).await?;
            self.received = 0;
        }
        Ok(true)
    }

    async fn ack(&mut self, seq: u32) -> Result<(), ProtocolError> {
        let mut frame = [VERSION, FRAME_ACK, 0, 0, 0, 0];
        frame[2..].copy_from_slice(&seq.to_be_bytes());
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        debug!("acked seq {} to {}", seq, self.peer);
        Ok(())
    }
}

/// Run one client connection to completion; returns the number of events
/// forwarded
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    tx: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<usize, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut session = Session {
        writer,
        peer,
        tx,
        window: 0,
        received: 0,
        forwarded: 0,
    };

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader) => frame?,
            _ = shutdown.changed() => break,
        };

        let keep_going = match frame {
            None => break,
            Some(Frame::Compressed(payload)) => {
                let inflated = inflate(&payload)?;
                let mut inner: &[u8] = &inflated;
                let mut keep_going = true;
                while let Some(frame) = read_frame(&mut inner).await? {
                    if !session.on_frame(frame).await? {
                        keep_going = false;
                        break;
                    }
                }
                keep_going
            }
            Some(frame) => session.on_frame(frame).await?,
        };

        if !keep_going {
            debug!("output stage gone, closing beats connection from {}", peer);
            break;
        }
    }

    Ok(session.forwarded)
}

/// Accept connections until shutdown, one task per connection
pub async fn serve(listener: TcpListener, tx: mpsc::Sender<Event>, mut shutdown: watch::Receiver<bool>) {
    let local = listener.local_addr().ok();
    info!("beats listener accepting on {:?}", local);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("beats connection from {}", peer);
                    let tx = tx.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, peer, tx, shutdown).await {
                            Ok(count) => debug!("beats connection from {} closed after {} events", peer, count),
                            Err(e) => warn!("closing beats connection from {}: {}", peer, e),
                        }
                    });
                }
                Err(e) => warn!("beats accept failed: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("beats listener on {:?} stopped", local);
}
