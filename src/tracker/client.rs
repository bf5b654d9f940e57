//! Issue tracker client configuration

/// Default GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Configuration for the tracker client
#[derive(Debug, Clone)]
pub struct TrackerClientConfig {
    /// REST API base URL (GitHub Enterprise uses `https://host/api/v3`)
    pub api_url: String,

    /// Token with `issues: write`
    pub token: Option<String>,

    /// `owner/name` of the repository the issues live in
    pub repository: Option<String>,

    /// Timeout for requests in seconds
    pub timeout_secs: u64,
}

impl Default for TrackerClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            repository: None,
            timeout_secs: 30,
        }
    }
}

impl TrackerClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `GITHUB_API_URL`, `GITHUB_TOKEN` and `GITHUB_REPOSITORY`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            config.api_url = url;
        }
        config.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        config.repository = std::env::var("GITHUB_REPOSITORY")
            .ok()
            .filter(|r| !r.is_empty());
        config
    }

    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_repository(mut self, repository: String) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
