//! Error types for the feed engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {status}")]
    Http { status: u16 },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Preference store error: {0}")]
    Storage(String),
}

impl FeedError {
    /// True for failures caused by the transport itself rather than the
    /// remote API's payload. The feed controller uses this to pick a
    /// user-facing message.
    pub fn is_network(&self) -> bool {
        match self {
            FeedError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeedError::Timeout => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
