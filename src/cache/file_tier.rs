// src/cache/file_tier.rs
//! File-backed cache tier
//!
//! One JSON file per key under a configured directory, named by the
//! configured prefix plus the sanitized cache key, each containing
//! `{"value": …, "cachedAt": …}`. Every I/O failure here is logged and
//! absorbed — a broken backing tier degrades the cache, never the caller.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::utils::errors::{GovernorError, Result};

/// Persisted entry shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// Borrowed counterpart of [`FileEntry`] for writes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileEntryRef<'a, V> {
    value: &'a V,
    cached_at: DateTime<Utc>,
}

/// File-per-key backing storage
pub(crate) struct FileTier {
    dir: PathBuf,
    prefix: String,
}

impl FileTier {
    /// Open the tier, creating its directory if needed
    pub fn new(dir: PathBuf, prefix: String) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            GovernorError::CacheStorageFailed(format!(
                "cannot create cache directory {}: {e}",
                dir.display()
            ))
        })?;
        debug!(dir = %dir.display(), prefix, "file cache tier ready");
        Ok(Self { dir, prefix })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", self.prefix, sanitize_key(key)))
    }

    /// Read a backing entry, returning its value and write timestamp
    pub async fn read<V: DeserializeOwned>(&self, key: &str) -> Option<(V, DateTime<Utc>)> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file");
                return None;
            }
        };
        match serde_json::from_slice::<FileEntry<V>>(&bytes) {
            Ok(entry) => Some((entry.value, entry.cached_at)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache file");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    /// Persist an entry; failures are logged, never surfaced
    pub async fn write<V: Serialize>(&self, key: &str, value: &V, cached_at: DateTime<Utc>) {
        let path = self.path_for(key);
        let entry = FileEntryRef { value, cached_at };
        let json = match serde_json::to_vec(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, json).await {
            warn!(path = %path.display(), error = %e, "failed to write cache file");
        }
    }

    /// Remove a backing entry; a missing file is not an error
    pub async fn remove(&self, key: &str) {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
        }
    }

    /// Remove every backing entry carrying this tier's prefix
    pub async fn clear(&self) {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to list cache directory");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&self.prefix) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(path = %entry.path().display(), error = %e, "failed to remove cache file");
                }
            }
        }
    }
}

/// Keep keys filesystem-safe: anything outside `[A-Za-z0-9._-]` becomes `_`
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tier(dir: &std::path::Path) -> FileTier {
        FileTier::new(dir.to_path_buf(), "test-cache-".to_string()).unwrap()
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("pages/home?v=2"), "pages_home_v_2");
        assert_eq!(sanitize_key("plain-key_1.0"), "plain-key_1.0");
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());

        let written_at = Utc::now();
        tier.write("k", &"hello".to_string(), written_at).await;

        let (value, cached_at) = tier.read::<String>("k").await.unwrap();
        assert_eq!(value, "hello");
        assert_eq!(cached_at.timestamp_millis(), written_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());
        assert!(tier.read::<String>("absent").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());

        std::fs::write(tier.path_for("bad"), b"not json").unwrap();
        assert!(tier.read::<String>("bad").await.is_none());
        assert!(!tier.path_for("bad").exists());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());

        tier.write("k", &1u32, Utc::now()).await;
        tier.remove("k").await;
        assert!(!tier.path_for("k").exists());
        // Second removal of a missing file is silent
        tier.remove("k").await;
    }

    #[tokio::test]
    async fn test_clear_only_touches_prefixed_files() {
        let dir = tempdir().unwrap();
        let tier = tier(dir.path());

        tier.write("a", &1u32, Utc::now()).await;
        tier.write("b", &2u32, Utc::now()).await;
        let unrelated = dir.path().join("unrelated.json");
        std::fs::write(&unrelated, b"{}").unwrap();

        tier.clear().await;

        assert!(!tier.path_for("a").exists());
        assert!(!tier.path_for("b").exists());
        assert!(unrelated.exists());
    }
}
