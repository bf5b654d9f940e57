//! GitHub REST API client

use crate::core::{
    issue::{Issue, LockReason},
    step::CloseReason,
};
use crate::tracker::{IssueTracker, TrackerClientConfig, TrackerError};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2022-11-28";

/// Issue tracker backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl GitHubClient {
    /// Create a client for the configured repository
    pub fn new(config: TrackerClientConfig) -> Result<Self, TrackerError> {
        let repository = config.repository.ok_or_else(|| {
            TrackerError::Config("no repository configured (expected owner/name)".to_string())
        })?;
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                TrackerError::Config(format!(
                    "invalid repository '{}' (expected owner/name)",
                    repository
                ))
            })?;

        let api_url = Url::parse(&config.api_url).map_err(|e| {
            TrackerError::Config(format!("invalid API URL '{}': {}", config.api_url, e))
        })?;
        if api_url.cannot_be_a_base() {
            return Err(TrackerError::Config(format!(
                "invalid API URL '{}'",
                config.api_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("logship/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: config.token,
            timeout_secs: config.timeout_secs,
        })
    }

    /// `owner/name`
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// `<api>/repos/<owner>/<repo>/issues/<number>/<extra...>`, percent-encoded
    fn issue_url(&self, number: u64, extra: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TrackerError::Config("API URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.extend([
                "repos",
                self.owner.as_str(),
                self.repo.as_str(),
                "issues",
                &number.to_string(),
            ]);
            segments.extend(extra);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, number: u64) -> Result<Response, TrackerError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Timeout(self.timeout_secs)
            } else {
                TrackerError::Http(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound(number));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(body);
            warn!("GitHub API returned {} for issue #{}: {}", status, number, message);
            return Err(TrackerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        let url = self.issue_url(number, &[])?;
        debug!("GET {}", url);
        let response = self.send(self.request(Method::GET, url), number).await?;
        Ok(response.json::<Issue>().await?)
    }

    async fn close_issue(&self, number: u64, reason: CloseReason) -> Result<(), TrackerError> {
        let url = self.issue_url(number, &[])?;
        debug!("PATCH {} (close, {})", url, reason.as_str());
        let body = json!({"state": "closed", "state_reason": reason.as_str()});
        self.send(self.request(Method::PATCH, url).json(&body), number)
            .await?;
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        let url = self.issue_url(number, &["labels"])?;
        debug!("POST {} {:?}", url, labels);
        let body = json!({"labels": labels});
        self.send(self.request(Method::POST, url).json(&body), number)
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        let url = self.issue_url(number, &["labels", label])?;
        debug!("DELETE {}", url);
        match self.send(self.request(Method::DELETE, url), number).await {
            // Label was not on the issue
            Err(TrackerError::NotFound(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<(), TrackerError> {
        let url = self.issue_url(number, &["comments"])?;
        debug!("POST {}", url);
        self.send(
            self.request(Method::POST, url).json(&json!({"body": body})),
            number,
        )
        .await?;
        Ok(())
    }

    async fn lock_issue(&self, number: u64, reason: Option<LockReason>) -> Result<(), TrackerError> {
        let url = self.issue_url(number, &["lock"])?;
        debug!("PUT {} ({:?})", url, reason);
        let body = match reason {
            Some(reason) => json!({"lock_reason": reason.as_str()}),
            None => json!({}),
        };
        self.send(self.request(Method::PUT, url).json(&body), number)
            .await?;
        Ok(())
    }
}
