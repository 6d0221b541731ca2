//! wikifeed — bounded random-article feed engine
//!
//! A client for the Wikipedia Action API's `generator=random` endpoint:
//! fetches batches of random articles for a selected language, normalizes
//! and filters them, warms their thumbnails in the background, and keeps a
//! capped FIFO feed with user-retriable errors.

pub mod article;
pub mod config;
pub mod error;
pub mod feed;
pub mod languages;
pub mod likes;
pub mod preload;
pub mod prefs;
pub mod retry;
pub mod wiki;

pub use article::{Article, Thumbnail};
pub use config::Config;
pub use error::{FeedError, Result};
pub use feed::{ErrorInfo, FeedController, FeedOptions, FeedSnapshot, FeedStats};
pub use languages::{Language, LANGUAGES};
pub use likes::{LikedArticle, LikedArticles};
pub use preload::{ImagePreloader, PreloadPriority, PreloadStats};
pub use prefs::{PreferenceStore, KEY_LANGUAGE, KEY_LIKED};
pub use retry::{retry, RetryPolicy};
pub use wiki::{ArticleSource, WikipediaClient, WikipediaClientConfig};
