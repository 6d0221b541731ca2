//! Wikipedia Action API client
//!
//! Issues a single `generator=random` query per fetch and normalizes the
//! `query.pages` map into `Article`s. Pages without an extract, thumbnail
//! or canonical URL are dropped here and never surface downstream.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::article::{Article, Thumbnail};
use crate::error::{FeedError, Result};
use crate::languages::Language;

/// Raw `query.pages` record as returned by the Action API
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawPage {
    pub pageid: Option<u64>,
    pub title: Option<String>,
    pub extract: Option<String>,
    #[serde(default)]
    pub varianttitles: HashMap<String, String>,
    pub thumbnail: Option<Thumbnail>,
    pub canonicalurl: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, serde::Deserialize)]
struct QueryBody {
    pages: Option<HashMap<String, RawPage>>,
}

/// Abstraction over the article fetcher so the feed controller can be
/// tested against a scripted source.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetches one batch of random articles for the given language
    async fn fetch_random(&self, language: &Language) -> Result<Vec<Article>>;

    /// Checks connectivity against the given language edition
    async fn health_check(&self, language: &Language) -> Result<bool>;
}

/// Configuration for the Wikipedia client
#[derive(Debug, Clone)]
pub struct WikipediaClientConfig {
    pub batch_size: u32,
    pub thumb_size: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for WikipediaClientConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            thumb_size: 480,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("wikifeed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for the Wikipedia Action API
pub struct WikipediaClient {
    client: reqwest::Client,
    config: WikipediaClientConfig,
}

impl WikipediaClient {
    pub fn new(config: WikipediaClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(FeedError::Network)?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(WikipediaClientConfig::default())
    }

    /// Gets the inner reqwest client, shared with the image preloader
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    fn random_query_params(&self, language: &Language) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("generator", "random".to_string()),
            ("grnnamespace", "0".to_string()),
            ("prop", "extracts|info|pageimages".to_string()),
            ("inprop", "url|varianttitles".to_string()),
            ("grnlimit", self.config.batch_size.to_string()),
            ("exintro", "1".to_string()),
            ("exlimit", "max".to_string()),
            ("exsentences", "5".to_string()),
            ("explaintext", "1".to_string()),
            ("piprop", "thumbnail".to_string()),
            ("pithumbsize", self.config.thumb_size.to_string()),
            ("origin", "*".to_string()),
            ("variant", language.id.clone()),
        ]
    }

    async fn fetch_internal(&self, language: &Language) -> Result<Vec<Article>> {
        let params = self.random_query_params(language);

        debug!(
            language = %language.id,
            batch = self.config.batch_size,
            "Fetching random articles"
        );

        let response = self
            .client
            .get(&language.api_origin)
            .query(&params)
            .send()
            .await
            .map_err(FeedError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(FeedError::Network)?;
        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| FeedError::MalformedResponse(e.to_string()))?;

        let pages = parsed
            .query
            .and_then(|q| q.pages)
            .ok_or_else(|| FeedError::MalformedResponse("missing query.pages".to_string()))?;

        let raw_count = pages.len();
        let articles = normalize_pages(pages.into_values(), &language.id);

        info!(
            language = %language.id,
            fetched = raw_count,
            retained = articles.len(),
            "Fetched random articles"
        );

        Ok(articles)
    }
}

/// Normalizes raw pages into articles, dropping any page without a
/// non-empty extract, a parsable URL, and a thumbnail with a source.
pub fn normalize_pages(
    pages: impl IntoIterator<Item = RawPage>,
    variant: &str,
) -> Vec<Article> {
    pages
        .into_iter()
        .filter_map(|page| normalize_page(page, variant))
        .collect()
}

fn normalize_page(page: RawPage, variant: &str) -> Option<Article> {
    let page_id = page.pageid?;
    let title = page.title.filter(|t| !t.is_empty())?;

    let extract = match page.extract {
        Some(e) if !e.trim().is_empty() => e,
        _ => return None,
    };

    let url = match page.canonicalurl {
        Some(u) if Url::parse(&u).is_ok() => u,
        _ => return None,
    };

    let thumbnail = match page.thumbnail {
        Some(t) if !t.source.is_empty() => t,
        _ => return None,
    };

    let display_title = page
        .varianttitles
        .get(variant)
        .cloned()
        .unwrap_or_else(|| title.clone());

    Some(Article {
        page_id,
        title,
        display_title,
        extract,
        url,
        thumbnail,
    })
}

#[async_trait]
impl ArticleSource for WikipediaClient {
    async fn fetch_random(&self, language: &Language) -> Result<Vec<Article>> {
        self.fetch_internal(language).await
    }

    async fn health_check(&self, language: &Language) -> Result<bool> {
        let params = vec![
            ("action", "query".to_string()),
            ("format", "json".to_string()),
            ("titles", language.sample_article.clone()),
            ("origin", "*".to_string()),
        ];

        match self
            .client
            .get(&language.api_origin)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!(language = %language.id, error = %e, "Health check failed");
                Ok(false)
            }
        }
    }
}
