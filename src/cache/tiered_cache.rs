// src/cache/tiered_cache.rs
//! Two-tier cache with TTL expiry and LRU eviction
//!
//! The in-memory tier is a bounded `DashMap`; overflow evicts the entry
//! with the oldest `last_accessed`. The optional file tier survives
//! restarts and feeds the memory tier on miss (hybrid mode promotes).
//! Expired entries are deleted from both tiers as soon as they are
//! observed, never returned.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::events::{CacheEvent, CacheEventKind};
use crate::cache::file_tier::FileTier;
use crate::utils::errors::{GovernorError, Result};

/// Which tiers the cache runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// In-memory tier only
    #[default]
    Memory,
    /// File tier only
    File,
    /// Memory tier in front of the file tier
    Hybrid,
}

/// Configuration for the tiered cache
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tier selection (default: memory only)
    pub mode: CacheMode,

    /// Entry time-to-live in milliseconds (default: 300_000)
    pub ttl_ms: u64,

    /// Memory-tier capacity; LRU eviction beyond this (default: 1024)
    pub max_entries: usize,

    /// Directory for the file tier; required for `file`/`hybrid` modes
    pub file_dir: Option<PathBuf>,

    /// File-name prefix for backing entries (default: `"governor-cache-"`)
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Memory,
            ttl_ms: 300_000,
            max_entries: 1024,
            file_dir: None,
            key_prefix: "governor-cache-".to_string(),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(GovernorError::InvalidConfig(
                "max_entries must be greater than 0".to_string(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(GovernorError::InvalidConfig(
                "ttl_ms must be greater than 0".to_string(),
            ));
        }
        if self.uses_file() && self.file_dir.is_none() {
            return Err(GovernorError::InvalidConfig(
                "file and hybrid cache modes require file_dir".to_string(),
            ));
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    fn uses_memory(&self) -> bool {
        !matches!(self.mode, CacheMode::File)
    }

    fn uses_file(&self) -> bool {
        !matches!(self.mode, CacheMode::Memory)
    }
}

/// Hit/miss counters
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate over all lookups so far (0.0 when none)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct MemoryEntry<V> {
    value: V,
    cached_at: Instant,
    last_accessed: Instant,
}

/// Generic tiered cache
///
/// Values only need to be serde-serializable and cloneable; the cache owns
/// storage in both tiers, callers own the values passed in and out.
pub struct TieredCache<V> {
    config: CacheConfig,
    memory: DashMap<String, MemoryEntry<V>>,
    file: Option<FileTier>,
    events: broadcast::Sender<CacheEvent>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> TieredCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a cache for the configured tiers
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let file = if config.uses_file() {
            let Some(dir) = config.file_dir.clone() else {
                return Err(GovernorError::InvalidConfig(
                    "file and hybrid cache modes require file_dir".to_string(),
                ));
            };
            Some(FileTier::new(dir, config.key_prefix.clone())?)
        } else {
            None
        };
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            config,
            memory: DashMap::new(),
            file,
            events,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Slow or absent subscribers never block cache operations; lagging
    /// receivers simply miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Look up a key, consulting the memory tier first
    pub async fn get(&self, key: &str) -> Option<V> {
        if self.config.uses_memory() {
            let mut expired = false;
            if let Some(mut entry) = self.memory.get_mut(key) {
                if entry.cached_at.elapsed() > self.config.ttl() {
                    expired = true;
                } else {
                    entry.last_accessed = Instant::now();
                    let value = entry.value.clone();
                    drop(entry);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.emit(CacheEventKind::Hit, key);
                    return Some(value);
                }
            }
            if expired {
                self.memory.remove(key);
                if let Some(file) = &self.file {
                    file.remove(key).await;
                }
                debug!(key, "cache entry expired");
                self.emit(CacheEventKind::Expired, key);
            }
        }

        if let Some(file) = &self.file {
            if let Some((value, cached_at)) = file.read::<V>(key).await {
                let age_ms = Utc::now()
                    .signed_duration_since(cached_at)
                    .num_milliseconds();
                if age_ms < 0 || age_ms as u64 > self.config.ttl_ms {
                    file.remove(key).await;
                    debug!(key, "backing entry expired");
                    self.emit(CacheEventKind::Expired, key);
                } else {
                    if self.config.uses_memory() {
                        self.insert_memory(key.to_string(), value.clone());
                        debug!(key, "promoted backing entry into memory tier");
                    }
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.emit(CacheEventKind::Hit, key);
                    return Some(value);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.emit(CacheEventKind::Miss, key);
        None
    }

    /// Store a value in every enabled tier
    pub async fn set(&self, key: &str, value: V) {
        if self.config.uses_memory() {
            self.insert_memory(key.to_string(), value.clone());
        }
        if let Some(file) = &self.file {
            file.write(key, &value, Utc::now()).await;
        }
        self.emit(CacheEventKind::Set, key);
    }

    /// Remove one key from every tier
    pub async fn del(&self, key: &str) {
        self.memory.remove(key);
        if let Some(file) = &self.file {
            file.remove(key).await;
        }
        self.emit(CacheEventKind::Delete, key);
    }

    /// Remove everything from every tier
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(file) = &self.file {
            file.clear().await;
        }
        self.emit(CacheEventKind::Clear, "*");
    }

    /// Occupancy and hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.memory.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn insert_memory(&self, key: String, value: V) {
        let now = Instant::now();
        self.memory.insert(
            key,
            MemoryEntry {
                value,
                cached_at: now,
                last_accessed: now,
            },
        );
        self.enforce_capacity();
    }

    fn enforce_capacity(&self) {
        while self.memory.len() > self.config.max_entries {
            let oldest = self
                .memory
                .iter()
                .min_by_key(|entry| entry.value().last_accessed)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.memory.remove(&key);
                    debug!(key, "memory tier full, evicted least recently used entry");
                }
                None => break,
            }
        }
    }

    fn emit(&self, kind: CacheEventKind, key: &str) {
        let _ = self.events.send(CacheEvent {
            kind,
            key: key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn memory_cache(max_entries: usize) -> TieredCache<String> {
        TieredCache::new(CacheConfig {
            max_entries,
            ..Default::default()
        })
        .unwrap()
    }

    fn hybrid_cache(dir: &std::path::Path, ttl_ms: u64) -> TieredCache<String> {
        TieredCache::new(CacheConfig {
            mode: CacheMode::Hybrid,
            ttl_ms,
            file_dir: Some(dir.to_path_buf()),
            ..Default::default()
        })
        .unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<CacheEvent>) -> Vec<CacheEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_memory_hit_miss_and_events() {
        let cache = memory_cache(16);
        let mut rx = cache.subscribe();

        cache.set("k", "v".to_string()).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.get("other").await, None);

        assert_eq!(
            drain(&mut rx),
            vec![CacheEventKind::Set, CacheEventKind::Hit, CacheEventKind::Miss]
        );

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_ttl_expiry_removes_backing_entry() {
        let dir = tempdir().unwrap();
        let cache = hybrid_cache(dir.path(), 50);
        let mut rx = cache.subscribe();

        cache.set("page", "body".to_string()).await;
        let backing = dir.path().join("governor-cache-page.json");
        assert!(backing.exists());

        sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("page").await, None);

        assert!(!backing.exists());
        let kinds = drain(&mut rx);
        assert!(kinds.contains(&CacheEventKind::Expired));
        assert!(kinds.contains(&CacheEventKind::Miss));
    }

    #[tokio::test]
    async fn test_lru_eviction_in_memory_tier() {
        let cache = memory_cache(2);

        cache.set("a", "1".to_string()).await;
        sleep(Duration::from_millis(5)).await;
        cache.set("b", "2".to_string()).await;
        sleep(Duration::from_millis(5)).await;

        // Touch "a" so "b" is the LRU entry
        assert!(cache.get("a").await.is_some());
        cache.set("c", "3".to_string()).await;

        assert_eq!(cache.stats().entries, 2);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_promotion_from_file_tier() {
        let dir = tempdir().unwrap();
        let cache = hybrid_cache(dir.path(), 300_000);

        cache.set("k", "v".to_string()).await;
        // Simulate a restart: memory tier is cold, file tier persists
        cache.memory.clear();

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.memory.len(), 1);
        // Second read is served from memory
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.stats().hits, 2);
    }

    #[tokio::test]
    async fn test_file_mode_skips_memory_tier() {
        let dir = tempdir().unwrap();
        let cache: TieredCache<String> = TieredCache::new(CacheConfig {
            mode: CacheMode::File,
            file_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        cache.set("k", "v".to_string()).await;
        assert_eq!(cache.memory.len(), 0);
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.memory.len(), 0);
    }

    #[tokio::test]
    async fn test_del_and_clear_touch_both_tiers() {
        let dir = tempdir().unwrap();
        let cache = hybrid_cache(dir.path(), 300_000);
        let mut rx = cache.subscribe();

        cache.set("a", "1".to_string()).await;
        cache.set("b", "2".to_string()).await;

        cache.del("a").await;
        assert!(!dir.path().join("governor-cache-a.json").exists());
        assert!(cache.get("a").await.is_none());

        cache.clear().await;
        assert_eq!(cache.memory.len(), 0);
        assert!(!dir.path().join("governor-cache-b.json").exists());

        let kinds = drain(&mut rx);
        assert!(kinds.contains(&CacheEventKind::Delete));
        assert!(kinds.contains(&CacheEventKind::Clear));
    }

    #[tokio::test]
    async fn test_file_mode_requires_dir() {
        let result: Result<TieredCache<String>> = TieredCache::new(CacheConfig {
            mode: CacheMode::File,
            file_dir: None,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
