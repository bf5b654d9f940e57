//! Issue tracker error types

use thiserror::Error;

/// Error types for issue tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Issue #{0} not found")]
    NotFound(u64),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
