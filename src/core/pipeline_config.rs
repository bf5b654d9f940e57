//! Pipeline descriptor configuration from YAML

use crate::core::{filter::Filter, template::Template};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// The pipeline descriptor shipped with the repository
pub const DEFAULT_PIPELINE_YAML: &str = include_str!("../../config/pipeline.yml");

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Listeners
    #[serde(default)]
    pub inputs: Vec<InputConfig>,

    /// Filter stage, applied in order (usually empty)
    #[serde(default)]
    pub filters: Vec<FilterConfig>,

    /// Sinks, every event goes to all of them
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    /// Output stage batching
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Agent-protocol (Lumberjack v2) listener
    Beats {
        #[serde(default = "default_bind_host")]
        host: String,
        port: u16,
    },
    /// Raw TCP socket with a line codec
    Tcp {
        #[serde(default = "default_bind_host")]
        host: String,
        port: u16,
        #[serde(default)]
        codec: Codec,
    },
}

/// Line framing for the raw socket listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Each line becomes `{"message": line}`
    #[default]
    Line,
    /// Each line is an independent JSON object
    JsonLines,
}

/// Filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    AddField { fields: BTreeMap<String, String> },
    RemoveField { fields: Vec<String> },
    AddTag { tags: Vec<String> },
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    Elasticsearch(ElasticsearchConfig),
    Stdout,
}

/// Elasticsearch bulk sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URLs, tried in rotation
    #[serde(default = "default_es_hosts")]
    pub hosts: Vec<String>,

    /// Index name template
    pub index: String,

    /// Basic auth user (disabled when unset)
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_es_timeout")]
    pub timeout_secs: u64,

    /// Retry/backoff policy
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff policy for sink writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_interval")]
    pub initial_interval_secs: f64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: f64,

    /// Give up after this many attempts (unset = retry forever)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: default_initial_interval(),
            max_interval_secs: default_max_interval(),
            max_attempts: None,
        }
    }
}

/// Output stage batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum events per batch
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// How long to wait for a batch to fill, in milliseconds
    #[serde(default = "default_batch_delay")]
    pub delay_ms: u64,

    /// Capacity of the listener -> output channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long a write may keep retrying once shutdown was requested
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_ms: default_batch_delay(),
            channel_capacity: default_channel_capacity(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_es_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_es_timeout() -> u64 {
    60
}

fn default_initial_interval() -> f64 {
    2.0
}

fn default_max_interval() -> f64 {
    64.0
}

fn default_batch_size() -> usize {
    125
}

fn default_batch_delay() -> u64 {
    50
}

fn default_shutdown_grace() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    1024
}

impl InputConfig {
    pub fn host(&self) -> &str {
        match self {
            InputConfig::Beats { host, .. } | InputConfig::Tcp { host, .. } => host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            InputConfig::Beats { port, .. } | InputConfig::Tcp { port, .. } => *port,
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            InputConfig::Beats { .. } => "beats",
            InputConfig::Tcp { .. } => "tcp",
        }
    }

    /// `host:port` suitable for binding
    pub fn bind_addr(&self) -> String {
        if self.host().contains(':') {
            format!("[{}]:{}", self.host(), self.port())
        } else {
            format!("{}:{}", self.host(), self.port())
        }
    }
}

impl fmt::Display for InputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputConfig::Beats { .. } => write!(f, "beats {}", self.bind_addr()),
            InputConfig::Tcp { codec, .. } => {
                write!(f, "tcp {} ({:?})", self.bind_addr(), codec)
            }
        }
    }
}

fn is_wildcard(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]")
}

impl FilterConfig {
    /// Compile into a runtime filter
    pub fn compile(&self) -> Result<Filter> {
        Ok(match self {
            FilterConfig::AddField { fields } => {
                let mut compiled = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    let template = Template::parse(value)
                        .with_context(|| format!("Invalid add_field value for '{}'", name))?;
                    compiled.push((name.clone(), template));
                }
                Filter::AddField(compiled)
            }
            FilterConfig::RemoveField { fields } => Filter::RemoveField(fields.clone()),
            FilterConfig::AddTag { tags } => Filter::AddTag(tags.clone()),
        })
    }
}

impl ElasticsearchConfig {
    /// Parse the index template
    pub fn index_template(&self) -> Result<Template> {
        Template::parse(&self.index)
            .with_context(|| format!("Invalid index template '{}'", self.index))
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    ///
    /// `${VAR}` and `${VAR:default}` are replaced from the environment in
    /// the raw text, so a substituted value is typed by YAML like a literal.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_yaml_with_env(yaml, &|name| std::env::var(name).ok())
    }

    fn from_yaml_with_env(yaml: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let yaml = substitute_env(yaml, lookup)?;
        let config: PipelineConfig = serde_yaml::from_str(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The default descriptor
    pub fn default_stack() -> Result<Self> {
        Self::from_yaml(DEFAULT_PIPELINE_YAML)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no inputs", self.name);
        }
        if self.outputs.is_empty() {
            anyhow::bail!("Pipeline '{}' declares no outputs", self.name);
        }

        // Both listener kinds are TCP sockets, so a port may only be bound once
        // per address; a wildcard address overlaps every other address
        for (i, a) in self.inputs.iter().enumerate() {
            for b in &self.inputs[i + 1..] {
                if a.port() == 0 || a.port() != b.port() {
                    continue;
                }
                if a.host() == b.host() || is_wildcard(a.host()) || is_wildcard(b.host()) {
                    anyhow::bail!("Inputs '{}' and '{}' bind the same port", a, b);
                }
            }
        }

        for filter in &self.filters {
            filter.compile()?;
        }

        for output in &self.outputs {
            if let OutputConfig::Elasticsearch(es) = output {
                es.index_template()?;

                if es.hosts.is_empty() {
                    anyhow::bail!("Elasticsearch output has no hosts");
                }
                for host in &es.hosts {
                    let url = reqwest::Url::parse(host)
                        .with_context(|| format!("Invalid Elasticsearch host '{}'", host))?;
                    if !matches!(url.scheme(), "http" | "https") {
                        anyhow::bail!("Elasticsearch host '{}' must use http or https", host);
                    }
                }

                if es.user.is_some() != es.password.is_some() {
                    anyhow::bail!("Elasticsearch 'user' and 'password' must be set together");
                }

                let retry = &es.retry;
                if !(retry.initial_interval_secs.is_finite() && retry.initial_interval_secs >= 0.0)
                    || !(retry.max_interval_secs.is_finite()
                        && retry.max_interval_secs >= retry.initial_interval_secs)
                {
                    anyhow::bail!(
                        "Invalid retry intervals: initial {}s, max {}s",
                        retry.initial_interval_secs,
                        retry.max_interval_secs
                    );
                }
            }
        }

        if self.batch.size == 0 || self.batch.channel_capacity == 0 {
            anyhow::bail!("Batch size and channel capacity must be positive");
        }

        Ok(())
    }

    /// Compile the filter list
    pub fn compiled_filters(&self) -> Result<Vec<Filter>> {
        self.filters.iter().map(FilterConfig::compile).collect()
    }
}

fn env_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("valid env regex")
    })
}

/// Replace `${VAR}` / `${VAR:default}` on every line that is not a comment
fn substitute_env(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.contains("${") && !line.trim_start().starts_with('#') {
            out.push_str(&substitute_str(line, lookup)?);
        } else {
            out.push_str(line);
        }
    }
    Ok(out)
}

fn substitute_str(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in env_regex().captures_iter(input) {
        let whole = captures.get(0).expect("group 0 always matches");
        let name = &captures[1];
        out.push_str(&input[last..whole.start()]);
        match (lookup(name), captures.get(2)) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(default)) => out.push_str(default.as_str()),
            (None, None) => anyhow::bail!(
                "Environment variable '{}' is not set and has no default",
                name
            ),
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}
