//! Liked articles
//!
//! Device-local likes, persisted through the preference store as a JSON
//! array. Loaded once at startup; every toggle rewrites the stored array.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::article::Article;
use crate::error::Result;
use crate::prefs::{PreferenceStore, KEY_LIKED};

/// A liked article with the time it was liked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikedArticle {
    pub article: Article,
    pub liked_at: DateTime<Utc>,
}

/// Collection of liked articles bound to a preference store
pub struct LikedArticles {
    store: Arc<PreferenceStore>,
    liked: RwLock<Vec<LikedArticle>>,
}

impl LikedArticles {
    /// Loads liked articles from the store. A corrupt entry starts the
    /// collection empty rather than failing startup.
    pub async fn load(store: Arc<PreferenceStore>) -> Self {
        let liked = match store.get_json::<Vec<LikedArticle>>(KEY_LIKED).await {
            Ok(Some(liked)) => liked,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Could not read liked articles, starting empty");
                Vec::new()
            }
        };

        info!(count = liked.len(), "Liked articles loaded");

        Self {
            store,
            liked: RwLock::new(liked),
        }
    }

    /// Toggles the like state of an article. Returns true when the article
    /// is liked after the call.
    pub async fn toggle(&self, article: Article) -> Result<bool> {
        let (snapshot, now_liked) = {
            let mut liked = self.liked.write();
            let page_id = article.page_id;
            let now_liked = if liked.iter().any(|l| l.article.page_id == page_id) {
                liked.retain(|l| l.article.page_id != page_id);
                false
            } else {
                liked.push(LikedArticle {
                    article,
                    liked_at: Utc::now(),
                });
                true
            };
            (liked.clone(), now_liked)
        };

        self.store.set_json(KEY_LIKED, &snapshot).await?;
        Ok(now_liked)
    }

    pub fn is_liked(&self, page_id: u64) -> bool {
        self.liked.read().iter().any(|l| l.article.page_id == page_id)
    }

    pub fn list(&self) -> Vec<LikedArticle> {
        self.liked.read().clone()
    }

    pub fn len(&self) -> usize {
        self.liked.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.liked.read().is_empty()
    }

    pub async fn clear(&self) -> Result<()> {
        self.liked.write().clear();
        self.store.set_json(KEY_LIKED, &Vec::<LikedArticle>::new()).await
    }
}
