//! Image preloader
//!
//! Best-effort, concurrency-limited warm-up of thumbnail URLs through the
//! shared HTTP client. Failures never propagate to the caller; a per-image
//! timeout guards against hung loads. Smaller thumbnail variants (MediaWiki
//! `<n>px-` tokens) are warmed first.

use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

/// Scheduling priority for a warm-up batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadPriority {
    High,
    Normal,
    Low,
}

impl PreloadPriority {
    /// Deferred start so warm-up never contends with foreground work
    fn start_delay(&self) -> Duration {
        match self {
            PreloadPriority::High => Duration::ZERO,
            PreloadPriority::Normal => Duration::from_millis(100),
            PreloadPriority::Low => Duration::from_millis(200),
        }
    }

    /// High priority trades concurrency for per-image bandwidth
    fn concurrency(&self, max_concurrent: usize) -> usize {
        match self {
            PreloadPriority::High => max_concurrent.saturating_sub(1).max(1),
            _ => max_concurrent.max(1),
        }
    }
}

/// Outcome counters for one warm-up batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadStats {
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Concurrency-limited thumbnail warmer.
///
/// The loaded-URL set lives inside the instance so tests get a fresh one
/// per run instead of sharing ambient module state.
pub struct ImagePreloader {
    client: reqwest::Client,
    max_concurrent: usize,
    timeout: Duration,
    loaded: Arc<RwLock<HashSet<String>>>,
}

impl ImagePreloader {
    pub fn new(client: reqwest::Client, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
            timeout,
            loaded: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Whether a URL has already been warmed by this instance
    pub fn is_loaded(&self, url: &str) -> bool {
        self.loaded.read().contains(url)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.read().len()
    }

    /// Warms a batch of image URLs. Never fails; per-image errors are
    /// counted and logged at debug.
    pub async fn warm(&self, urls: Vec<String>, priority: PreloadPriority) -> PreloadStats {
        if urls.is_empty() {
            return PreloadStats::default();
        }

        tokio::time::sleep(priority.start_delay()).await;

        let (pending, skipped) = {
            let loaded = self.loaded.read();
            let mut pending = Vec::new();
            let mut skipped = 0usize;
            for url in urls {
                if loaded.contains(&url) {
                    skipped += 1;
                } else {
                    pending.push(url);
                }
            }
            (pending, skipped)
        };

        let pending = order_by_thumb_size(pending);
        let semaphore = Arc::new(Semaphore::new(priority.concurrency(self.max_concurrent)));

        let tasks = pending.into_iter().map(|url| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                Some((self.warm_one(&url).await, url))
            }
        });

        let mut stats = PreloadStats {
            skipped,
            ..Default::default()
        };

        for outcome in join_all(tasks).await.into_iter().flatten() {
            match outcome {
                (true, url) => {
                    self.loaded.write().insert(url);
                    stats.loaded += 1;
                }
                (false, _) => stats.failed += 1,
            }
        }

        debug!(
            loaded = stats.loaded,
            failed = stats.failed,
            skipped = stats.skipped,
            "Image warm-up batch finished"
        );

        stats
    }

    /// Detached warm-up; the caller never awaits completion
    pub fn spawn_warm(
        self: &Arc<Self>,
        urls: Vec<String>,
        priority: PreloadPriority,
    ) -> tokio::task::JoinHandle<PreloadStats> {
        let preloader = self.clone();
        tokio::spawn(async move { preloader.warm(urls, priority).await })
    }

    async fn warm_one(&self, url: &str) -> bool {
        let request = async {
            let response = self.client.get(url).send().await?;
            // Drain the body so the bytes actually travel the wire
            response.error_for_status()?.bytes().await?;
            Ok::<_, reqwest::Error>(())
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(())) => {
                trace!(url, "Image warmed");
                true
            }
            Ok(Err(e)) => {
                debug!(url, error = %e, "Image warm-up failed");
                false
            }
            Err(_) => {
                debug!(url, timeout_ms = self.timeout.as_millis() as u64, "Image warm-up timed out");
                false
            }
        }
    }
}

/// Extracts the MediaWiki thumbnail size token from a URL, e.g.
/// `.../240px-Foo.jpg` -> 240.
pub fn thumb_size_hint(url: &str) -> Option<u32> {
    let idx = url.find("px-")?;
    let digits: String = url[..idx]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Stable sort: sized thumbnails ascending, unsized URLs after them in
/// their original order.
fn order_by_thumb_size(mut urls: Vec<String>) -> Vec<String> {
    urls.sort_by_key(|url| thumb_size_hint(url).unwrap_or(u32::MAX));
    urls
}
