//! Configuration for the feed engine

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Fetching
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_thumb_size")]
    pub thumb_size: u32,
    #[serde(default = "default_language_id")]
    pub default_language: String,

    // Retry
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    // Feed retention
    #[serde(default = "default_max_retained")]
    pub max_retained_articles: usize,

    // Image preloading
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,
    #[serde(default = "default_preload_timeout")]
    pub preload_timeout_secs: u64,

    // HTTP client
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Preference store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    // Run mode
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,
}

fn default_batch_size() -> u32 {
    20
}

fn default_thumb_size() -> u32 {
    480
}

fn default_language_id() -> String {
    "en".to_string()
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_max_retained() -> usize {
    200
}

fn default_preload_concurrency() -> usize {
    3
}

fn default_preload_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("wikifeed/{}", env!("CARGO_PKG_VERSION"))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_fetch_interval_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            thumb_size: default_thumb_size(),
            default_language: default_language_id(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retained_articles: default_max_retained(),
            preload_concurrency: default_preload_concurrency(),
            preload_timeout_secs: default_preload_timeout(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
            data_dir: default_data_dir(),
            fetch_interval_ms: default_fetch_interval_ms(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        // Build config from environment (WIKIFEED__BATCH_SIZE etc.)
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("WIKIFEED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_secs(self.preload_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}
