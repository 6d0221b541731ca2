//! Feed state controller
//!
//! The only component that mutates feed state. One command — `fetch_more` —
//! guarded against re-entrancy, retried with exponential backoff, and tagged
//! with a generation token so a fetch that completes after a language switch
//! is discarded instead of written into the fresh feed.

use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::config::Config;
use crate::error::FeedError;
use crate::languages::{self, Language};
use crate::preload::{ImagePreloader, PreloadPriority};
use crate::prefs::{PreferenceStore, KEY_LANGUAGE};
use crate::retry::{retry, RetryPolicy};
use crate::wiki::ArticleSource;

/// User-facing error surfaced by the controller. Retrying means calling
/// `FeedController::retry`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorInfo {
    pub title: String,
    pub message: String,
}

impl ErrorInfo {
    fn from_error(error: &FeedError) -> Self {
        if error.is_network() {
            Self {
                title: "Couldn't load articles".to_string(),
                message: "Network error. Check your connection and retry.".to_string(),
            }
        } else {
            Self {
                title: "Couldn't load articles".to_string(),
                message: "Something went wrong. Please try again.".to_string(),
            }
        }
    }
}

/// Read-only view of the feed for callers
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub articles: Vec<Article>,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

/// Lifetime counters, useful for `status` output and run-mode logs
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedStats {
    pub fetched_total: u64,
    pub evicted_total: u64,
    pub duplicates_skipped: u64,
}

struct FeedState {
    articles: VecDeque<Article>,
    // Page ids currently retained, kept in step with `articles`
    retained_ids: HashSet<u64>,
    loading: bool,
    error: Option<ErrorInfo>,
}

impl FeedState {
    fn empty() -> Self {
        Self {
            articles: VecDeque::new(),
            retained_ids: HashSet::new(),
            loading: false,
            error: None,
        }
    }

    fn reset(&mut self) {
        self.articles.clear();
        self.retained_ids.clear();
        self.error = None;
    }
}

/// Tuning knobs for the controller
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub retry: RetryPolicy,
    pub max_retained: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_retained: 200,
        }
    }
}

impl FeedOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay()),
            max_retained: config.max_retained_articles,
        }
    }
}

/// Owns and mutates the article feed
pub struct FeedController {
    source: Arc<dyn ArticleSource>,
    preloader: Arc<ImagePreloader>,
    prefs: Arc<PreferenceStore>,
    options: FeedOptions,

    state: RwLock<FeedState>,
    language: RwLock<Language>,
    // Bumped on every language switch; fetches carry the value they started
    // with and stale completions are dropped
    generation: AtomicU64,
    in_flight: AtomicBool,

    fetched_total: AtomicU64,
    evicted_total: AtomicU64,
    duplicates_skipped: AtomicU64,
}

impl FeedController {
    /// Creates a controller, restoring the persisted language selection.
    /// An unknown or missing persisted id falls back through the configured
    /// default to the registry's first entry.
    pub async fn new(
        source: Arc<dyn ArticleSource>,
        preloader: Arc<ImagePreloader>,
        prefs: Arc<PreferenceStore>,
        options: FeedOptions,
        default_language: &str,
    ) -> Self {
        let saved = prefs.get(KEY_LANGUAGE).await;
        let language = match saved {
            Some(ref id) => {
                let lang = languages::lookup_or_default(id);
                if lang.id != *id {
                    warn!(saved = %id, fallback = %lang.id, "Persisted language unknown, falling back");
                }
                lang.clone()
            }
            None => languages::lookup_or_default(default_language).clone(),
        };

        info!(language = %language.id, "Feed controller initialized");

        Self {
            source,
            preloader,
            prefs,
            options,
            state: RwLock::new(FeedState::empty()),
            language: RwLock::new(language),
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            fetched_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
        }
    }

    /// Requests one more batch of articles. Returns false when a fetch was
    /// already in flight and this call was dropped.
    pub async fn fetch_more(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Fetch already in flight, request dropped");
            return false;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let language = self.language.read().clone();

        {
            let mut state = self.state.write();
            state.loading = true;
            state.error = None;
        }

        let result = retry(self.options.retry, || self.source.fetch_random(&language)).await;

        let stale = generation != self.generation.load(Ordering::SeqCst);
        match result {
            Ok(articles) if stale => {
                debug!(
                    language = %language.id,
                    discarded = articles.len(),
                    "Fetch outlived a language switch, discarding"
                );
            }
            Ok(articles) => {
                self.fetched_total
                    .fetch_add(articles.len() as u64, Ordering::Relaxed);
                self.warm_thumbnails(&articles);
                self.append(articles);
            }
            Err(e) if stale => {
                debug!(language = %language.id, error = %e, "Stale fetch failed, ignoring");
            }
            Err(e) => {
                warn!(language = %language.id, error = %e, "Fetch failed");
                self.state.write().error = Some(ErrorInfo::from_error(&e));
            }
        }

        // Cleared on every path so the next request is never wedged
        self.state.write().loading = false;
        self.in_flight.store(false, Ordering::SeqCst);
        true
    }

    /// Re-runs the failed command. Identical to `fetch_more`; exists so
    /// callers can wire an ErrorInfo's retry affordance directly to it.
    pub async fn retry(&self) -> bool {
        self.fetch_more().await
    }

    /// Selects a language by registry id, falling back to the default
    /// entry when unknown, and fully resets the feed.
    pub async fn set_language(&self, id: &str) {
        let language = languages::lookup_or_default(id).clone();
        if language.id != id {
            warn!(requested = %id, fallback = %language.id, "Unknown language id");
        }
        self.select_language(language).await;
    }

    /// Selects an explicit language descriptor and fully resets the feed
    pub async fn select_language(&self, language: Language) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        *self.language.write() = language.clone();
        self.state.write().reset();

        if let Err(e) = self.prefs.set(KEY_LANGUAGE, &language.id).await {
            warn!(error = %e, "Failed to persist language selection");
        }

        info!(language = %language.id, "Language selected, feed reset");
    }

    pub fn clear_error(&self) {
        self.state.write().error = None;
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.read();
        FeedSnapshot {
            articles: state.articles.iter().cloned().collect(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn articles(&self) -> Vec<Article> {
        self.state.read().articles.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().articles.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.state.read().error.clone()
    }

    pub fn language(&self) -> Language {
        self.language.read().clone()
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            fetched_total: self.fetched_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
        }
    }

    fn warm_thumbnails(&self, articles: &[Article]) {
        let urls: Vec<String> = articles
            .iter()
            .map(|a| a.thumbnail.source.clone())
            .collect();
        if !urls.is_empty() {
            // Detached: warm-up never blocks the controller
            let _ = self.preloader.spawn_warm(urls, PreloadPriority::Normal);
        }
    }

    /// Appends a batch, skipping page ids already retained and evicting
    /// the oldest entries past the cap (FIFO)
    fn append(&self, articles: Vec<Article>) {
        let mut state = self.state.write();
        let mut appended = 0usize;

        for article in articles {
            if !state.retained_ids.insert(article.page_id) {
                self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            state.articles.push_back(article);
            appended += 1;
        }

        while state.articles.len() > self.options.max_retained {
            if let Some(evicted) = state.articles.pop_front() {
                state.retained_ids.remove(&evicted.page_id);
                self.evicted_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.error = None;

        debug!(
            appended,
            retained = state.articles.len(),
            "Batch appended to feed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Thumbnail;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn article(page_id: u64) -> Article {
        Article {
            page_id,
            title: format!("Page {}", page_id),
            display_title: format!("Page {}", page_id),
            extract: "Some intro text.".to_string(),
            url: format!("https://en.wikipedia.org/wiki/Page_{}", page_id),
            thumbnail: Thumbnail {
                source: format!("https://thumbs.invalid/{}/240px-p.jpg", page_id),
                width: 240,
                height: 180,
            },
        }
    }

    fn batch(ids: std::ops::Range<u64>) -> Vec<Article> {
        ids.map(article).collect()
    }

    /// Scripted source: pops one result per call, optionally blocking on a
    /// gate first
    struct ScriptedSource {
        script: parking_lot::Mutex<VecDeque<Result<Vec<Article>>>>,
        calls: AtomicU32,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Article>>>) -> Arc<Self> {
            Arc::new(Self {
                script: parking_lot::Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                gate: None,
            })
        }

        fn gated(script: Vec<Result<Vec<Article>>>, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                script: parking_lot::Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                gate: Some(gate),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArticleSource for ScriptedSource {
        async fn fetch_random(&self, _language: &Language) -> Result<Vec<Article>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn health_check(&self, _language: &Language) -> Result<bool> {
            Ok(true)
        }
    }

    fn test_options(max_retained: usize) -> FeedOptions {
        FeedOptions {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            max_retained,
        }
    }

    async fn controller(
        source: Arc<ScriptedSource>,
        options: FeedOptions,
    ) -> FeedController {
        let preloader = Arc::new(ImagePreloader::new(
            reqwest::Client::new(),
            2,
            Duration::from_millis(50),
        ));
        let prefs = Arc::new(PreferenceStore::in_memory());
        FeedController::new(source, preloader, prefs, options, "en").await
    }

    #[tokio::test]
    async fn test_append_and_snapshot() {
        let source = ScriptedSource::new(vec![Ok(batch(0..5))]);
        let ctrl = controller(source, test_options(200)).await;

        assert!(ctrl.fetch_more().await);

        let snap = ctrl.snapshot();
        assert_eq!(snap.articles.len(), 5);
        assert!(!snap.loading);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_fifo_eviction_at_cap() {
        let source = ScriptedSource::new(vec![Ok(batch(0..4)), Ok(batch(4..8))]);
        let ctrl = controller(source, test_options(5)).await;

        ctrl.fetch_more().await;
        ctrl.fetch_more().await;

        let ids: Vec<u64> = ctrl.articles().iter().map(|a| a.page_id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6, 7]);
        assert_eq!(ctrl.stats().evicted_total, 3);
    }

    #[tokio::test]
    async fn test_duplicate_page_ids_skipped() {
        let source = ScriptedSource::new(vec![Ok(batch(0..3)), Ok(batch(1..4))]);
        let ctrl = controller(source, test_options(200)).await;

        ctrl.fetch_more().await;
        ctrl.fetch_more().await;

        let ids: Vec<u64> = ctrl.articles().iter().map(|a| a.page_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(ctrl.stats().duplicates_skipped, 2);
    }

    #[tokio::test]
    async fn test_reentrancy_guard_drops_second_call() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::gated(vec![Ok(batch(0..2))], gate.clone());
        let ctrl = Arc::new(controller(source.clone(), test_options(200)).await);

        let first = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.fetch_more().await })
        };

        // Wait until the in-flight fetch is parked on the gate
        while source.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(!ctrl.fetch_more().await);
        assert_eq!(source.calls(), 1);

        gate.notify_one();
        assert!(first.await.unwrap());
        assert_eq!(ctrl.len(), 2);
    }

    #[tokio::test]
    async fn test_error_surfaced_then_cleared_by_success() {
        let source = ScriptedSource::new(vec![
            Err(FeedError::Http { status: 500 }),
            Err(FeedError::Http { status: 500 }),
            Err(FeedError::Http { status: 500 }),
            Ok(batch(0..2)),
        ]);
        let ctrl = controller(source.clone(), test_options(200)).await;

        ctrl.fetch_more().await;
        // Three attempts consumed by retries before the error surfaced
        assert_eq!(source.calls(), 3);
        let error = ctrl.error().unwrap();
        assert_eq!(error.message, "Something went wrong. Please try again.");

        ctrl.retry().await;
        assert!(ctrl.error().is_none());
        assert_eq!(ctrl.len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_message() {
        let source = ScriptedSource::new(vec![
            Err(FeedError::Timeout),
            Err(FeedError::Timeout),
            Err(FeedError::Timeout),
        ]);
        let ctrl = controller(source, test_options(200)).await;

        ctrl.fetch_more().await;
        let error = ctrl.error().unwrap();
        assert!(error.message.contains("Network error"));
    }

    #[tokio::test]
    async fn test_transient_failures_recovered_by_retry() {
        let source = ScriptedSource::new(vec![
            Err(FeedError::Http { status: 503 }),
            Err(FeedError::Http { status: 503 }),
            Ok(batch(0..3)),
        ]);
        let ctrl = controller(source.clone(), test_options(200)).await;

        ctrl.fetch_more().await;

        assert_eq!(source.calls(), 3);
        assert!(ctrl.error().is_none());
        assert_eq!(ctrl.len(), 3);
    }

    #[tokio::test]
    async fn test_language_switch_resets_feed() {
        let source = ScriptedSource::new(vec![Ok(batch(0..5))]);
        let ctrl = controller(source, test_options(200)).await;

        ctrl.fetch_more().await;
        assert_eq!(ctrl.len(), 5);

        ctrl.set_language("de").await;

        assert!(ctrl.is_empty());
        assert!(ctrl.error().is_none());
        assert_eq!(ctrl.language().id, "de");
    }

    #[tokio::test]
    async fn test_unknown_language_falls_back_to_default() {
        let source = ScriptedSource::new(vec![]);
        let ctrl = controller(source, test_options(200)).await;

        ctrl.set_language("tlh").await;
        assert_eq!(ctrl.language().id, "en");
    }

    #[tokio::test]
    async fn test_persisted_unknown_language_falls_back_at_startup() {
        let prefs = Arc::new(PreferenceStore::in_memory());
        prefs.set(KEY_LANGUAGE, "tlh").await.unwrap();

        let preloader = Arc::new(ImagePreloader::new(
            reqwest::Client::new(),
            2,
            Duration::from_millis(50),
        ));
        let source = ScriptedSource::new(vec![]);
        let ctrl =
            FeedController::new(source, preloader, prefs, test_options(200), "en").await;

        assert_eq!(ctrl.language().id, "en");
    }

    #[tokio::test]
    async fn test_language_selection_is_persisted() {
        let prefs = Arc::new(PreferenceStore::in_memory());
        let preloader = Arc::new(ImagePreloader::new(
            reqwest::Client::new(),
            2,
            Duration::from_millis(50),
        ));
        let source = ScriptedSource::new(vec![]);
        let ctrl = FeedController::new(
            source,
            preloader,
            prefs.clone(),
            test_options(200),
            "en",
        )
        .await;

        ctrl.set_language("fr").await;
        assert_eq!(prefs.get(KEY_LANGUAGE).await, Some("fr".to_string()));
    }

    #[tokio::test]
    async fn test_stale_fetch_discarded_after_language_switch() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::gated(vec![Ok(batch(0..5))], gate.clone());
        let ctrl = Arc::new(controller(source.clone(), test_options(200)).await);

        let pending = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.fetch_more().await })
        };

        while source.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Switch languages while the fetch is parked; its result is stale
        ctrl.set_language("de").await;
        gate.notify_one();
        pending.await.unwrap();

        assert!(ctrl.is_empty());
        assert!(ctrl.error().is_none());
        assert!(!ctrl.is_loading());
    }

    #[tokio::test]
    async fn test_stale_failed_fetch_error_not_surfaced() {
        let gate = Arc::new(Notify::new());
        let source =
            ScriptedSource::gated(vec![Err(FeedError::Http { status: 500 })], gate.clone());
        // Single attempt so the gate parks the fetch exactly once
        let options = FeedOptions {
            retry: RetryPolicy::new(1, Duration::from_millis(1)),
            max_retained: 200,
        };
        let ctrl = Arc::new(controller(source.clone(), options).await);

        let pending = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.fetch_more().await })
        };

        while source.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Switch languages while the failing fetch is parked; its error is
        // stale and must not land in the fresh feed
        ctrl.set_language("de").await;
        gate.notify_one();
        pending.await.unwrap();

        assert!(ctrl.error().is_none());
        assert!(ctrl.is_empty());
        assert!(!ctrl.is_loading());
    }
}
