//! On-disk enrichment cache.
//!
//! One JSON file per key under the cache root, named after the SHA-256 of the
//! key. Entries are written to a temporary sibling and renamed into place, so
//! readers in this or any other process see either the old entry or the new
//! one, never a partial file. Expired entries are removed by the lookup that
//! finds them; there is no background sweep.

use crate::domain::model::{CacheEntry, EnrichmentResult, NormalizedRecord, Provider};
use crate::utils::error::{ConnectorError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const CACHE_TTL_DAYS: i64 = 90;
const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `~/.signalis/enrichment_cache`, shared by every project on the machine.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".signalis").join("enrichment_cache"))
}

pub fn cache_ttl() -> Duration {
    Duration::days(CACHE_TTL_DAYS)
}

/// `<hash>.<pid>.<n>.tmp` next to `path`; `clear` sweeps these up.
fn temp_sibling(path: &Path) -> PathBuf {
    path.with_extension(format!(
        "{}.{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        TEMP_EXTENSION
    ))
}

/// Lowercase, dashes for spaces, alphanumerics only, at most 50 chars.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
    }
    slug.trim_matches('-').chars().take(50).collect()
}

/// Cache key for a record that needs an email.
///
/// `d:<domain>` for company-level lookups, `p:<domain>|<name>` when a
/// person is named (two people at one company must not share an entry), and
/// `c:<company>` for records without a domain.
pub fn cache_key(record: &NormalizedRecord) -> String {
    let domain = record.domain.trim().to_lowercase();
    let name = slugify(&record.full_name);
    if !domain.is_empty() {
        if name.is_empty() {
            format!("d:{}", domain)
        } else {
            format!("p:{}|{}", domain, name)
        }
    } else if name.is_empty() {
        format!("c:{}", slugify(&record.company))
    } else {
        format!("c:{}|{}", slugify(&record.company), name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub fresh: usize,
    pub stale: usize,
    pub negative: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub location: PathBuf,
}

pub struct EnrichmentCache {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EnrichmentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_default() -> Result<Self> {
        default_cache_dir()
            .map(Self::new)
            .ok_or_else(|| ConnectorError::cache("cannot determine the home directory"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Async lock scoped to one key. Holders of different keys never wait on
    /// each other.
    pub fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Forgets the lock for `key` once nobody but the map holds it. Callers
    /// drop their own handle first.
    pub fn release_key_lock(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().map_or_else(|poisoned| poisoned.into_inner().len(), |locks| locks.len())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.root.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    pub async fn get(&self, key: &str) -> Option<EnrichmentResult> {
        self.get_at(key, Utc::now()).await
    }

    /// Lookup as of `now`. Unreadable entries are misses; expired entries are
    /// deleted and reported as misses.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<EnrichmentResult> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry for {}: {}", key, e);
                return None;
            }
        };
        if entry.key != key {
            return None;
        }

        if entry.is_expired_at(now) {
            tracing::debug!("Cache entry for {} expired at {}", key, entry.expires_at);
            let lock = self.key_lock(key);
            // A holder of the key lock is about to overwrite the entry.
            if let Ok(_guard) = lock.try_lock() {
                self.evict_expired(key, &path, now).await;
            }
            drop(lock);
            self.release_key_lock(key);
            return None;
        }

        let mut result = entry.result;
        result.from_cache = true;
        Some(result)
    }

    /// Moves the entry aside before deleting it, and puts it back if what was
    /// moved is no longer expired: another process may have renamed a fresh
    /// entry into place after our read.
    async fn evict_expired(&self, key: &str, path: &Path, now: DateTime<Utc>) {
        let tombstone = temp_sibling(path);
        match tokio::fs::rename(path, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!("Could not evict expired cache entry {}: {}", key, e);
                return;
            }
        }

        let still_expired = match tokio::fs::read(&tombstone).await {
            Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .map_or(true, |entry| entry.is_expired_at(now)),
            Err(_) => true,
        };
        let outcome = if still_expired {
            tokio::fs::remove_file(&tombstone).await
        } else {
            tracing::debug!("Cache entry for {} was refreshed during eviction", key);
            tokio::fs::rename(&tombstone, path).await
        };
        if let Err(e) = outcome {
            tracing::warn!("Could not finish evicting cache entry {}: {}", key, e);
        }
    }

    /// Stores `result` until `result.resolved_at` + 90 days, replacing any
    /// previous entry for `key`.
    pub async fn put(&self, key: &str, result: &EnrichmentResult) -> Result<()> {
        let mut stored = result.clone();
        stored.from_cache = false;
        let entry = CacheEntry {
            key: key.to_string(),
            expires_at: stored.resolved_at + cache_ttl(),
            result: stored,
        };
        let payload = serde_json::to_vec_pretty(&entry)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.entry_path(key);
        let temp = temp_sibling(&target);

        if let Err(e) = tokio::fs::write(&temp, &payload).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::debug!("Cached enrichment for {} ({})", key, entry.result.provider);
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every readable entry, expired ones included.
    pub async fn list(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_files().await? {
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => tracing::warn!("Skipping unreadable cache file {:?}: {}", path, e),
                },
                Err(e) => tracing::warn!("Skipping cache file {:?}: {}", path, e),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now();
        let entries = self.list().await?;
        let mut by_provider = BTreeMap::new();
        let mut stale = 0;
        let mut negative = 0;
        for entry in &entries {
            if entry.is_expired_at(now) {
                stale += 1;
            }
            if entry.result.provider == Provider::None {
                negative += 1;
            }
            *by_provider
                .entry(entry.result.provider.to_string())
                .or_insert(0) += 1;
        }

        Ok(CacheStats {
            total: entries.len(),
            fresh: entries.len() - stale,
            stale,
            negative,
            by_provider,
            location: self.root.clone(),
        })
    }

    /// Removes every entry, plus temporary files left by interrupted writes.
    /// Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(ENTRY_EXTENSION) => {
                    tokio::fs::remove_file(&path).await?;
                    removed += 1;
                }
                Some(TEMP_EXTENSION) => {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                _ => {}
            }
        }
        tracing::info!("Cleared {} cache entries from {:?}", removed, self.root);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Side;
    use tempfile::TempDir;

    fn resolved(email: &str, resolved_at: DateTime<Utc>) -> EnrichmentResult {
        EnrichmentResult {
            email: Some(email.to_string()),
            provider: Provider::Apollo,
            verified: Some(true),
            confidence: None,
            resolved_at,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            title: "CTO".to_string(),
            providers_attempted: vec![Provider::Apollo],
            from_cache: false,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Jane  Mary-Smith! "), "jane-mary-smith");
        assert_eq!(slugify("ACME, Inc."), "acme-inc");
        assert_eq!(slugify(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn test_cache_key_variants() {
        let mut record = NormalizedRecord::new(Side::Demand, 0);
        record.company = "Acme Health".to_string();
        assert_eq!(cache_key(&record), "c:acme-health");

        record.domain = "AcmeHealth.com".to_string();
        assert_eq!(cache_key(&record), "d:acmehealth.com");

        record.full_name = "Jane Doe".to_string();
        assert_eq!(cache_key(&record), "p:acmehealth.com|jane-doe");
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let result = resolved("ada@acme.io", Utc::now());

        cache.put("d:acme.io", &result).await.unwrap();
        let hit = cache.get("d:acme.io").await.unwrap();

        assert!(hit.from_cache);
        assert_eq!(EnrichmentResult { from_cache: false, ..hit }, result);
        assert!(cache.get("d:other.io").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_and_evicted() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let old = resolved("old@acme.io", Utc::now() - Duration::days(CACHE_TTL_DAYS + 1));

        cache.put("d:acme.io", &old).await.unwrap();
        assert_eq!(cache.list().await.unwrap().len(), 1);

        assert!(cache.get("d:acme.io").await.is_none());
        assert!(cache.list().await.unwrap().is_empty());

        let fresh = resolved("new@acme.io", Utc::now());
        cache.put("d:acme.io", &fresh).await.unwrap();
        let hit = cache.get("d:acme.io").await.unwrap();
        assert_eq!(hit.email.as_deref(), Some("new@acme.io"));
    }

    #[tokio::test]
    async fn test_expired_read_leaves_lock_holders_entry_alone() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let old = resolved("old@acme.io", Utc::now() - Duration::days(CACHE_TTL_DAYS + 1));
        cache.put("d:acme.io", &old).await.unwrap();

        let lock = cache.key_lock("d:acme.io");
        let guard = lock.lock().await;
        assert!(cache.get("d:acme.io").await.is_none());
        let fresh = resolved("new@acme.io", Utc::now());
        cache.put("d:acme.io", &fresh).await.unwrap();
        drop(guard);

        let hit = cache.get("d:acme.io").await.unwrap();
        assert_eq!(hit.email.as_deref(), Some("new@acme.io"));
    }

    #[tokio::test]
    async fn test_eviction_keeps_entry_refreshed_after_the_read() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let fresh = resolved("new@acme.io", Utc::now());
        cache.put("d:acme.io", &fresh).await.unwrap();

        // The expired bytes were read before this fresh entry replaced them.
        let path = cache.entry_path("d:acme.io");
        cache.evict_expired("d:acme.io", &path, Utc::now()).await;

        let hit = cache.get("d:acme.io").await.unwrap();
        assert_eq!(hit.email.as_deref(), Some("new@acme.io"));
        assert_eq!(cache.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_key_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let old = resolved("old@acme.io", Utc::now() - Duration::days(CACHE_TTL_DAYS + 1));
        cache.put("d:acme.io", &old).await.unwrap();
        assert!(cache.get("d:acme.io").await.is_none());
        assert_eq!(cache.tracked_locks(), 0);

        let held = cache.key_lock("d:b.io");
        cache.release_key_lock("d:b.io");
        assert_eq!(cache.tracked_locks(), 1);
        drop(held);
        cache.release_key_lock("d:b.io");
        assert_eq!(cache.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_entry_valid_until_ttl_boundary() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        let at = Utc::now();
        cache.put("d:acme.io", &resolved("a@acme.io", at)).await.unwrap();

        let just_before = at + cache_ttl() - Duration::seconds(1);
        assert!(cache.get_at("d:acme.io", just_before).await.is_some());
        assert!(cache.get_at("d:acme.io", at + cache_ttl()).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path());
        cache.put("d:acme.io", &resolved("a@acme.io", Utc::now())).await.unwrap();

        let path = cache.entry_path("d:acme.io");
        std::fs::write(&path, b"{\"key\": \"d:acme.io\", \"res").unwrap();

        assert!(cache.get("d:acme.io").await.is_none());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::new(dir.path().join("nested"));
        assert_eq!(cache.clear().await.unwrap(), 0);

        cache.put("d:a.io", &resolved("a@a.io", Utc::now())).await.unwrap();
        cache
            .put("d:b.io", &EnrichmentResult::not_found(vec![Provider::Apollo], Utc::now()))
            .await
            .unwrap();
        cache
            .put("d:c.io", &resolved("c@c.io", Utc::now() - Duration::days(200)))
            .await
            .unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.fresh, 2);
        assert_eq!(stats.negative, 1);
        assert_eq!(stats.by_provider.get("apollo"), Some(&2));

        assert_eq!(cache.clear().await.unwrap(), 3);
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_one_complete_entry() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(EnrichmentCache::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let result = resolved(&format!("user{}@acme.io", i), Utc::now());
                cache.put("d:acme.io", &result).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let hit = cache.get("d:acme.io").await.unwrap();
        assert!(hit.email.unwrap().ends_with("@acme.io"));
        assert_eq!(cache.list().await.unwrap().len(), 1);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(TEMP_EXTENSION))
            .count();
        assert_eq!(leftovers, 0);
    }
}
