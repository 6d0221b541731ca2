//! Persistent preference store
//!
//! Key-value adapter over two backing stores with mirrored writes: reads
//! consult the primary and fall back to the mirror, writes go to both.
//! Mirror failures are logged and never propagated, so preferences survive
//! one backend being unavailable.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{FeedError, Result};

/// Key for the selected language id
pub const KEY_LANGUAGE: &str = "lang";
/// Key for the liked-articles array
pub const KEY_LIKED: &str = "liked_articles";

/// A single backing store for preferences
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory backend, also used as the mirror of last resort
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// JSON-file backend. The whole map is rewritten on every set; preference
/// payloads are tiny.
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileBackend {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).await?;
        let path = data_dir.join("preferences.json");

        let entries = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt preference file, starting fresh");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), "Preference file opened");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.entries.read().clone();
        let json = serde_json::to_string_pretty(&snapshot)?;

        // Write-then-rename keeps the file whole under interruption
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        self.persist().await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        self.persist().await
    }
}

/// Mirrored-write preference store
pub struct PreferenceStore {
    primary: Arc<dyn PreferenceBackend>,
    mirror: Option<Arc<dyn PreferenceBackend>>,
}

impl PreferenceStore {
    pub fn new(
        primary: Arc<dyn PreferenceBackend>,
        mirror: Option<Arc<dyn PreferenceBackend>>,
    ) -> Self {
        Self { primary, mirror }
    }

    /// File-backed store mirrored into memory
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let primary = Arc::new(FileBackend::open(data_dir).await?);
        Ok(Self::new(primary, Some(Arc::new(MemoryBackend::new()))))
    }

    /// Memory-only store for tests and ephemeral sessions
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), None)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.primary.get(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    backend = self.primary.name(),
                    key,
                    error = %e,
                    "Primary preference read failed, trying mirror"
                );
            }
        }

        if let Some(ref mirror) = self.mirror {
            match mirror.get(key).await {
                Ok(value) => return value,
                Err(e) => {
                    warn!(backend = mirror.name(), key, error = %e, "Mirror preference read failed");
                }
            }
        }

        None
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.primary.set(key, value).await?;

        if let Some(ref mirror) = self.mirror {
            if let Err(e) = mirror.set(key, value).await {
                warn!(backend = mirror.name(), key, error = %e, "Failed to mirror preference write");
            }
        }

        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.primary.remove(key).await?;

        if let Some(ref mirror) = self.mirror {
            if let Err(e) = mirror.remove(key).await {
                warn!(backend = mirror.name(), key, error = %e, "Failed to mirror preference removal");
            }
        }

        Ok(())
    }

    /// Reads and deserializes a JSON-valued preference
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| FeedError::Storage(format!("invalid JSON under {}: {}", key, e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serializes and stores a JSON-valued preference
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = PreferenceStore::in_memory();

        assert_eq!(store.get(KEY_LANGUAGE).await, None);
        store.set(KEY_LANGUAGE, "de").await.unwrap();
        assert_eq!(store.get(KEY_LANGUAGE).await, Some("de".to_string()));

        store.remove(KEY_LANGUAGE).await.unwrap();
        assert_eq!(store.get(KEY_LANGUAGE).await, None);
    }

    #[tokio::test]
    async fn test_mirror_fallback_on_primary_miss() {
        let primary = Arc::new(MemoryBackend::new());
        let mirror = Arc::new(MemoryBackend::new());
        mirror.set(KEY_LANGUAGE, "ja").await.unwrap();

        let store = PreferenceStore::new(primary, Some(mirror));
        assert_eq!(store.get(KEY_LANGUAGE).await, Some("ja".to_string()));
    }

    #[tokio::test]
    async fn test_writes_reach_both_backends() {
        let primary = Arc::new(MemoryBackend::new());
        let mirror = Arc::new(MemoryBackend::new());
        let store = PreferenceStore::new(primary.clone(), Some(mirror.clone()));

        store.set(KEY_LANGUAGE, "fr").await.unwrap();

        assert_eq!(primary.get(KEY_LANGUAGE).await.unwrap(), Some("fr".to_string()));
        assert_eq!(mirror.get(KEY_LANGUAGE).await.unwrap(), Some("fr".to_string()));
    }

    #[tokio::test]
    async fn test_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            backend.set(KEY_LANGUAGE, "ru").await.unwrap();
        }

        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(backend.get(KEY_LANGUAGE).await.unwrap(), Some("ru".to_string()));
    }

    #[tokio::test]
    async fn test_file_backend_survives_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("preferences.json"), b"{not json")
            .await
            .unwrap();

        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(backend.get(KEY_LANGUAGE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = PreferenceStore::in_memory();

        store.set_json(KEY_LIKED, &vec![1u64, 2, 3]).await.unwrap();
        let liked: Option<Vec<u64>> = store.get_json(KEY_LIKED).await.unwrap();
        assert_eq!(liked, Some(vec![1, 2, 3]));

        store.set(KEY_LIKED, "not json").await.unwrap();
        assert!(store.get_json::<Vec<u64>>(KEY_LIKED).await.is_err());
    }
}
