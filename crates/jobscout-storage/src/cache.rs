//! TTL-bounded response cache keyed by a hash of the request URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub body: String,
    pub written_at: DateTime<Utc>,
}

/// Raw key/value persistence underneath [`ResponseCache`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<CacheEntry>>;
    async fn store(&self, key: &str, entry: &CacheEntry) -> anyhow::Result<()>;
}

pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache layer consulted by the fetch paths.
///
/// Backend failures degrade to a miss (on read) or a skipped write; the cache
/// never turns a good fetch into an error.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").field("ttl", &self.ttl).finish()
    }
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, url: &str) -> Option<String> {
        self.get_at(url, Utc::now()).await
    }

    pub async fn get_at(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let key = cache_key(url);
        let entry = match self.backend.load(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                warn!(url, error = %err, "cache read failed; treating as miss");
                return None;
            }
        };
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        if now.signed_duration_since(entry.written_at) < ttl {
            debug!(url, "cache hit");
            Some(entry.body)
        } else {
            debug!(url, written_at = %entry.written_at, "cache entry expired");
            None
        }
    }

    pub async fn put(&self, url: &str, body: &str) {
        let entry = CacheEntry {
            url: url.to_string(),
            body: body.to_string(),
            written_at: Utc::now(),
        };
        if let Err(err) = self.backend.store(&cache_key(url), &entry).await {
            warn!(url, error = %err, "cache write failed");
        }
    }
}

/// One JSON file per key under `root`, written via temp-file rename.
#[derive(Debug, Clone)]
pub struct FsCacheBackend {
    root: PathBuf,
}

impl FsCacheBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheBackend for FsCacheBackend {
    async fn load(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading cache entry {}", path.display()))
            }
        };
        let entry = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing cache entry {}", path.display()))?;
        Ok(Some(entry))
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating cache directory {}", self.root.display()))?;

        let path = self.entry_path(key);
        let bytes = serde_json::to_vec(entry).context("serializing cache entry")?;
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp cache file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp cache file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp cache file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp cache file {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }
        Ok(())
    }
}

/// In-process backend; also lets tests age entries.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry_for(&self, url: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(&cache_key(url)).cloned())
    }

    /// Move an entry's write timestamp back by `age`. Returns false if absent.
    pub fn backdate(&self, url: &str, age: chrono::Duration) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get_mut(&cache_key(url)) {
            Some(entry) => {
                entry.written_at -= age;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn load(&self, key: &str) -> anyhow::Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }
}
