//! Raw TCP listener with line framing

use crate::core::{event::Event, pipeline_config::Codec};
use crate::ingest::codec::decode_line;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Longest line kept, newline included; longer lines are skipped
pub const MAX_LINE: usize = 4 * 1024 * 1024;

/// Accept connections until shutdown, one task per connection
pub async fn serve(
    listener: TcpListener,
    codec: Codec,
    tx: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    let local = listener.local_addr().ok();
    info!("tcp listener accepting on {:?} ({:?})", local, codec);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("tcp connection from {}", peer);
                    let tx = tx.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let count = read_lines(stream, peer, codec, tx, shutdown).await;
                        debug!("tcp connection from {} closed after {} events", peer, count);
                    });
                }
                Err(e) => warn!("tcp accept failed: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("tcp listener on {:?} stopped", local);
}

/// Decode lines from a connection and forward them; returns the number of
/// events forwarded
pub async fn read_lines<R>(
    stream: R,
    peer: SocketAddr,
    codec: Codec,
    tx: mpsc::Sender<Event>,
    shutdown: watch::Receiver<bool>,
) -> usize
where
    R: AsyncRead + Unpin,
{
    read_lines_limited(stream, peer, codec, tx, shutdown, MAX_LINE).await
}

async fn read_lines_limited<R>(
    stream: R,
    peer: SocketAddr,
    codec: Codec,
    tx: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
    max_line: usize,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut forwarded = 0;
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let read = tokio::select! {
            read = read_bounded_line(&mut reader, &mut buf, max_line) => read,
            _ = shutdown.changed() => break,
        };

        match read {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::TooLong(len)) => {
                line_no += 1;
                warn!(
                    "dropping line {} from {}: {} bytes exceeds the {} byte limit",
                    line_no, peer, len, max_line
                );
            }
            Ok(LineRead::Line) => {
                line_no += 1;
                match decode_line(codec, &buf) {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            debug!("output stage gone, closing connection from {}", peer);
                            break;
                        }
                        forwarded += 1;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("dropping line {} from {}: {}", line_no, peer, e),
                }
            }
            Err(e) => {
                warn!("read error from {}: {}", peer, e);
                break;
            }
        }
    }

    forwarded
}

enum LineRead {
    Eof,
    Line,
    TooLong(usize),
}

/// Like `read_until(b'\n')`, but stops buffering past `max` bytes and
/// discards the rest of that line
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match total {
                0 => LineRead::Eof,
                n if n > max => LineRead::TooLong(n),
                _ => LineRead::Line,
            });
        }

        let (used, done) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if total + used <= max {
            buf.extend_from_slice(&available[..used]);
        } else {
            buf.clear();
        }
        total += used;
        reader.consume(used);

        if done {
            return Ok(if total > max { LineRead::TooLong(total) } else { LineRead::Line });
        }
    }
}
