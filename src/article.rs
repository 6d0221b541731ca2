//! Normalized article schema
//!
//! Produced by the fetcher from raw `query.pages` records. An `Article`
//! only exists once it has passed the retention filter, so the thumbnail
//! is not optional here.

use serde::{Deserialize, Serialize};

/// Thumbnail image for an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// A normalized Wikipedia article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Unique page identifier within a language edition
    pub page_id: u64,
    /// Canonical title
    pub title: String,
    /// Localized display title when the API provides a variant mapping,
    /// otherwise equal to `title`
    pub display_title: String,
    /// Plain-text intro extract
    pub extract: String,
    /// Canonical article URL
    pub url: String,
    pub thumbnail: Thumbnail,
}

impl Article {
    /// Short one-line preview of the extract
    pub fn snippet(&self, max_chars: usize) -> String {
        let mut out: String = self.extract.chars().take(max_chars).collect();
        if self.extract.chars().count() > max_chars {
            out.push('…');
        }
        out
    }
}
