//! End-to-end tests of the listeners feeding the output stage

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use logship::core::pipeline_config::PipelineConfig;
use logship::core::Event;
use logship::output::{OutputError, Sink};
use logship::service::PipelineService;
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PIPELINE: &str = r#"
name: "test-logs"
inputs:
  - type: beats
    host: "127.0.0.1"
    port: 0
  - type: tcp
    host: "127.0.0.1"
    port: 0
    codec: json_lines
outputs:
  - type: stdout
batch:
  size: 50
  delay_ms: 10
"#;

#[derive(Default)]
struct Capture {
    events: Mutex<Vec<Event>>,
}

impl Capture {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Wait until at least `n` events arrived
    async fn wait_for(&self, n: usize) -> Vec<Event> {
        for _ in 0..500 {
            let events = self.events();
            if events.len() >= n {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} events, got {:?}", n, self.events());
    }
}

#[async_trait]
impl Sink for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    async fn write_batch(&self, events: &[Event]) -> Result<(), OutputError> {
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(())
    }
}

async fn start() -> (PipelineService, Arc<Capture>, SocketAddr, SocketAddr) {
    let config = PipelineConfig::from_yaml(PIPELINE).unwrap();
    let capture = Arc::new(Capture::default());
    let service = PipelineService::start_with_sinks(&config, vec![capture.clone() as Arc<dyn Sink>])
        .await
        .unwrap();
    let addrs = service.local_addrs().to_vec();
    (service, capture, addrs[0], addrs[1])
}

fn sized(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn window_frame(size: u32) -> Vec<u8> {
    let mut buf = vec![b'2', b'W'];
    buf.extend_from_slice(&size.to_be_bytes());
    buf
}

fn json_frame(seq: u32, payload: &Value) -> Vec<u8> {
    let mut buf = vec![b'2', b'J'];
    buf.extend_from_slice(&seq.to_be_bytes());
    sized(&mut buf, payload.to_string().as_bytes());
    buf
}

fn data_frame(seq: u32, pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = vec![b'2', b'D'];
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
    for (key, value) in pairs {
        sized(&mut buf, key.as_bytes());
        sized(&mut buf, value.as_bytes());
    }
    buf
}

fn compressed_frame(inner: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(inner).unwrap();
    let deflated = encoder.finish().unwrap();
    let mut buf = vec![b'2', b'C'];
    sized(&mut buf, &deflated);
    buf
}

async fn read_ack(stream: &mut TcpStream) -> u32 {
    let mut ack = [0u8; 6];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut ack))
        .await
        .expect("ack timed out")
        .unwrap();
    assert_eq!(&ack[..2], b"2A");
    u32::from_be_bytes([ack[2], ack[3], ack[4], ack[5]])
}

#[tokio::test]
async fn test_tcp_json_lines_are_forwarded_unmodified() {
    let (service, capture, _, tcp) = start().await;

    let mut client = TcpStream::connect(tcp).await.unwrap();
    client
        .write_all(
            b"{\"raw_content\":\"GET / 200\",\"host\":\"web-1\"}\n\
              not json at all\n\
              \n\
              [1,2,3]\n\
              {\"raw_content\":\"second\",\"@timestamp\":\"2024-05-01T10:00:00Z\"}\r\n",
        )
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    let events = capture.wait_for(2).await;
    let stats = service.shutdown().await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(stats.events, 2);
    assert_eq!(events[0].get("raw_content"), Some(&json!("GET / 200")));
    assert_eq!(events[0].get("host"), Some(&json!("web-1")));
    assert_eq!(events[1].get("raw_content"), Some(&json!("second")));
    assert_eq!(events[1].timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

#[tokio::test]
async fn test_connections_are_independent() {
    let (service, capture, _, tcp) = start().await;

    let mut clients = Vec::new();
    for n in 0..3 {
        let mut client = TcpStream::connect(tcp).await.unwrap();
        client
            .write_all(format!("{{\"client\":{}}}\n", n).as_bytes())
            .await
            .unwrap();
        clients.push(client);
    }

    let events = capture.wait_for(3).await;
    let mut seen: Vec<i64> = events
        .iter()
        .map(|e| e.get("client").and_then(Value::as_i64).unwrap())
        .collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);

    // Open connections do not block shutdown
    service.shutdown().await.unwrap();
    drop(clients);
}

#[tokio::test]
async fn test_beats_window_is_acknowledged() {
    let (service, capture, beats, _) = start().await;

    let mut client = TcpStream::connect(beats).await.unwrap();
    let mut frames = window_frame(3);
    frames.extend(json_frame(1, &json!({"message": "one", "@metadata": {"beat": "filebeat"}})));
    frames.extend(data_frame(2, &[("message", "two"), ("source", "/var/log/app.log")]));
    frames.extend(compressed_frame(&json_frame(3, &json!({"message": "three"}))));
    client.write_all(&frames).await.unwrap();

    assert_eq!(read_ack(&mut client).await, 3);

    let events = capture.wait_for(3).await;
    let messages: Vec<&Value> = events.iter().map(|e| e.get("message").unwrap()).collect();
    assert_eq!(messages, vec![&json!("one"), &json!("two"), &json!("three")]);
    assert!(events[0].get("@metadata").is_none());
    assert_eq!(events[0].metadata.get("beat"), Some(&json!("filebeat")));
    assert_eq!(events[1].get("source"), Some(&json!("/var/log/app.log")));

    drop(client);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_beats_protocol_error_closes_only_that_connection() {
    let (service, capture, beats, _) = start().await;

    let mut bad = TcpStream::connect(beats).await.unwrap();
    bad.write_all(b"1W\x00\x00\x00\x01").await.unwrap();
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buf))
        .await
        .expect("server should close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));

    let mut good = TcpStream::connect(beats).await.unwrap();
    let mut frames = window_frame(1);
    frames.extend(json_frame(1, &json!({"message": "still here"})));
    good.write_all(&frames).await.unwrap();
    assert_eq!(read_ack(&mut good).await, 1);

    let events = capture.wait_for(1).await;
    assert_eq!(events[0].get("message"), Some(&json!("still here")));

    drop(good);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_port_conflict_is_rejected() {
    let yaml = r#"
name: "conflict"
inputs:
  - type: beats
    port: 5044
  - type: tcp
    host: "127.0.0.1"
    port: 5044
outputs:
  - type: stdout
"#;
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("same port"), "{}", err);
}
