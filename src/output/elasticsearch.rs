//! Elasticsearch sink using the `_bulk` API

use crate::core::{
    event::Event,
    pipeline_config::{ElasticsearchConfig, RetryConfig},
    template::Template,
};
use crate::output::{OutputError, Sink};
use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-item statuses worth sending again
const RETRYABLE_ITEM_STATUSES: [u16; 2] = [429, 503];

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Appends events to date-stamped indices
pub struct ElasticsearchSink {
    client: reqwest::Client,
    hosts: Vec<Url>,
    index: Template,
    /// Set when the index name does not depend on the event
    fixed_index: Option<String>,
    auth: Option<(String, String)>,
    retry: RetryConfig,
    next_host: AtomicUsize,
}

impl ElasticsearchSink {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, OutputError> {
        let index = Template::parse(&config.index)
            .map_err(|e| OutputError::Config(format!("index '{}': {}", config.index, e)))?;

        let hosts = config
            .hosts
            .iter()
            .map(|host| bulk_url(host))
            .collect::<Result<Vec<_>, _>>()?;
        if hosts.is_empty() {
            return Err(OutputError::Config("no Elasticsearch hosts".to_string()));
        }

        let auth = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (None, None) => None,
            _ => {
                return Err(OutputError::Config(
                    "user and password must be set together".to_string(),
                ))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("logship/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let fixed_index = index
            .is_static()
            .then(|| index.resolve(&Event::from_json_object(serde_json::Map::new())));
        info!(
            "Elasticsearch output to {} host(s), index '{}'",
            hosts.len(),
            index.as_str()
        );

        Ok(Self {
            client,
            hosts,
            index,
            fixed_index,
            auth,
            retry: config.retry.clone(),
            next_host: AtomicUsize::new(0),
        })
    }

    /// Destination index of an event
    pub fn index_for(&self, event: &Event) -> String {
        match &self.fixed_index {
            Some(index) => index.clone(),
            None => self.index.resolve(event),
        }
    }

    /// NDJSON request body: one action line and one document line per event
    pub fn bulk_body<'a>(&self, events: impl IntoIterator<Item = &'a Event>) -> Result<String, OutputError> {
        let mut body = String::new();
        for event in events {
            let action = json!({"index": {"_index": self.index_for(event)}});
            // Writing into a String cannot fail
            let _ = writeln!(body, "{}", serde_json::to_string(&action)?);
            let _ = writeln!(body, "{}", serde_json::to_string(&event.to_document())?);
        }
        Ok(body)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let secs = (self.retry.initial_interval_secs * 2f64.powi(exponent))
            .min(self.retry.max_interval_secs);
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn pick_host(&self) -> &Url {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed);
        &self.hosts[i % self.hosts.len()]
    }

    /// Send one bulk request; returns the positions of items to retry
    async fn send_bulk(&self, url: &Url, events: &[&Event]) -> Result<Vec<usize>, OutputError> {
        let body = self.bulk_body(events.iter().copied())?;

        let mut request = self
            .client
            .post(url.clone())
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutputError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bulk: BulkResponse = serde_json::from_slice(&response.bytes().await?)?;
        if !bulk.errors {
            return Ok(Vec::new());
        }

        let mut retry = Vec::new();
        for (position, item) in bulk.items.iter().enumerate() {
            let Some(result) = item.values().next() else {
                continue;
            };
            if result.status < StatusCode::MULTIPLE_CHOICES.as_u16() {
                continue;
            }
            if RETRYABLE_ITEM_STATUSES.contains(&result.status) {
                retry.push(position);
            } else {
                warn!(
                    "Dropping event rejected by Elasticsearch ({}): {}",
                    result.status,
                    result
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default()
                );
            }
        }
        Ok(retry)
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn write_batch(&self, events: &[Event]) -> Result<(), OutputError> {
        let mut pending: Vec<&Event> = events.iter().collect();
        let mut attempt = 0u32;

        while !pending.is_empty() {
            attempt += 1;
            let url = self.pick_host();
            debug!("Sending {} events to {} (attempt {})", pending.len(), url, attempt);

            let last = match self.send_bulk(url, &pending).await {
                Ok(retry) if retry.is_empty() => return Ok(()),
                Ok(retry) => {
                    info!("Retrying {} of {} events", retry.len(), pending.len());
                    pending = retry.into_iter().filter_map(|i| pending.get(i).copied()).collect();
                    format!("{} items rejected with a retryable status", pending.len())
                }
                Err(e) if e.is_retryable() => {
                    warn!("Bulk request to {} failed: {}", url, e);
                    e.to_string()
                }
                Err(e) => return Err(e),
            };

            if let Some(max) = self.retry.max_attempts {
                if attempt >= max {
                    return Err(OutputError::RetriesExhausted { attempts: attempt, last });
                }
            }
            tokio::time::sleep(self.backoff(attempt)).await;
        }

        Ok(())
    }
}

/// `<host>/_bulk`, keeping any path prefix of the host
fn bulk_url(host: &str) -> Result<Url, OutputError> {
    let mut url = Url::parse(host)
        .map_err(|e| OutputError::Config(format!("invalid host '{}': {}", host, e)))?;
    url.path_segments_mut()
        .map_err(|_| OutputError::Config(format!("invalid host '{}'", host)))?
        .pop_if_empty()
        .push("_bulk");
    Ok(url)
}
