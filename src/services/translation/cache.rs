use anyhow::{Context, Result};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::core::types::LanguagePair;
use crate::utils::Metrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    original_text: String,
    translated_text: String,
}

/// Fragment translation cache with LRU eviction and debounced persistence.
///
/// Entries are keyed by language pair and normalized source text, so a
/// fragment translated for one pair is never served for another.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    cache: RwLock<LruCache<String, CacheEntry>>,
    cache_file: PathBuf,

    dirty: RwLock<bool>,
    save_notify: Notify,

    metrics: Option<Metrics>,
}

impl TranslationCache {
    /// Open the cache stored under `cache_dir`, creating the directory if needed.
    ///
    /// A `save_interval` of `None` or zero disables background persistence;
    /// callers then rely on [`TranslationCache::save`].
    pub async fn new(
        cache_dir: &Path,
        max_entries: usize,
        save_interval: Option<Duration>,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        if !cache_dir.exists() {
            tokio::fs::create_dir_all(cache_dir)
                .await
                .context("Failed to create cache directory")?;
        }

        let cache_file = cache_dir.join("translations.json");

        let cache_data = if cache_file.exists() {
            let data = tokio::fs::read_to_string(&cache_file)
                .await
                .context("Failed to read cache file")?;
            serde_json::from_str::<HashMap<String, CacheEntry>>(&data).unwrap_or_else(|e| {
                warn!("Ignoring unreadable cache file {}: {}", cache_file.display(), e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let max = NonZeroUsize::new(max_entries).context("Cache size must be greater than zero")?;
        let mut lru = LruCache::new(max);
        for (k, v) in cache_data {
            lru.put(k, v);
        }

        debug!("Loaded {} cached translations", lru.len());
        if let Some(ref m) = metrics {
            m.update_cache_size(lru.len());
        }

        let cache = Self {
            inner: Arc::new(CacheInner {
                cache: RwLock::new(lru),
                cache_file,
                dirty: RwLock::new(false),
                save_notify: Notify::new(),
                metrics,
            }),
        };

        if let Some(interval) = save_interval {
            if !interval.is_zero() {
                cache.start_persistence_task(interval);
            }
        }

        Ok(cache)
    }

    /// xxHash3 over the pair and the fragment text, as hex
    pub fn generate_key(pair: LanguagePair, text: &str) -> String {
        let mut hash_input = Vec::with_capacity(text.len() + 16);
        hash_input.extend_from_slice(pair.source.code().as_bytes());
        hash_input.push(b'|');
        hash_input.extend_from_slice(pair.target.code().as_bytes());
        hash_input.push(b'|');
        hash_input.extend_from_slice(text.as_bytes());

        format!("{:016x}", xxh3_64(&hash_input))
    }

    /// Look up a translation. Records a hit or a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let hit = {
            let mut cache = self.inner.cache.write();
            cache.get(key).map(|entry| entry.translated_text.clone())
        };

        if let Some(ref m) = self.inner.metrics {
            if hit.is_some() {
                m.record_cache_hit();
            } else {
                m.record_cache_miss();
            }
        }

        hit
    }

    pub fn put(&self, key: String, original: &str, translated: &str) {
        let entry = CacheEntry {
            original_text: original.to_string(),
            translated_text: translated.to_string(),
        };

        {
            let mut cache = self.inner.cache.write();
            cache.put(key, entry);

            if let Some(ref m) = self.inner.metrics {
                m.update_cache_size(cache.len());
            }
        }

        *self.inner.dirty.write() = true;
        self.inner.save_notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache file now
    pub async fn save(&self) -> Result<()> {
        save_inner(&self.inner).await
    }

    fn start_persistence_task(&self, interval: Duration) {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut last_save = Instant::now();

            loop {
                inner.save_notify.notified().await;

                let since = last_save.elapsed();
                if since < interval {
                    tokio::time::sleep(interval - since).await;
                }

                if *inner.dirty.read() {
                    match save_inner(&inner).await {
                        Ok(()) => last_save = Instant::now(),
                        Err(e) => warn!("Cache persistence failed: {:#}", e),
                    }
                }
            }
        });
    }

    /// Entry count and on-disk size in MB
    pub async fn stats(&self) -> (usize, f64) {
        let entries = self.len();

        let size_bytes = tokio::fs::metadata(&self.inner.cache_file)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        (entries, size_bytes as f64 / (1024.0 * 1024.0))
    }
}

async fn save_inner(inner: &CacheInner) -> Result<()> {
    let cache_data: HashMap<String, CacheEntry> = {
        let cache = inner.cache.read();
        cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    };

    let json = serde_json::to_string_pretty(&cache_data).context("Failed to serialize cache")?;

    tokio::fs::write(&inner.cache_file, json)
        .await
        .context("Failed to write cache file")?;

    *inner.dirty.write() = false;
    debug!("Saved {} cached translations", cache_data.len());

    Ok(())
}
