//! Best-effort TTL cache for hot read paths.
//!
//! # Responsibility
//! - Hold JSON-serialized payloads with an absolute expiry.
//! - Let writers invalidate keys after mutations.
//!
//! # Invariants
//! - Expired entries are never returned.
//! - Payloads larger than the size guard are rejected, never truncated.
//! - The cache is advisory: a miss only forces recomputation.
//! - A value computed before an invalidation is never stored after it when
//!   written through `put_if_unchanged`.

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default upper bound for one serialized payload.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100 * 1024;
/// Default upper bound for one entry lifetime.
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(6 * 60 * 60);

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

/// Invalidation stamp of one key; see [`EphemeralCache::generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration {
    epoch: u64,
    key: u64,
}

#[derive(Default)]
struct Generations {
    /// Bumped by prefix invalidation.
    epoch: u64,
    per_key: HashMap<String, u64>,
}

/// Hit/miss counters since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub rejected: u64,
}

/// In-process TTL key/value cache.
pub struct EphemeralCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generations: Mutex<Generations>,
    max_payload_bytes: usize,
    max_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
}

impl Default for EphemeralCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_MAX_TTL)
    }
}

impl EphemeralCache {
    pub fn new(max_payload_bytes: usize, max_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generations: Mutex::new(Generations::default()),
            max_payload_bytes,
            max_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Returns the cached value, or `None` when absent, expired or no longer
    /// decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get_raw(key)?;
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("event=cache_get module=cache status=error key={key} error={err}");
                self.remove(key);
                None
            }
        }
    }

    /// Returns the raw serialized payload for `key`.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.payload.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: evict unless a concurrent put refreshed it meanwhile.
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value` for `ttl` (clamped to the configured maximum).
    ///
    /// Returns `false` without touching existing entries when the value
    /// cannot be serialized, exceeds the size guard, or `ttl` is zero.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let Some(entry) = self.encode(key, value, ttl) else {
            return false;
        };
        self.entries.write().insert(key.to_string(), entry);
        true
    }

    /// Current invalidation generation of `key`.
    ///
    /// Capture it before computing a value, then store with
    /// [`EphemeralCache::put_if_unchanged`].
    pub fn generation(&self, key: &str) -> CacheGeneration {
        let generations = self.generations.lock();
        CacheGeneration {
            epoch: generations.epoch,
            key: generations.per_key.get(key).copied().unwrap_or(0),
        }
    }

    /// `put` that is skipped when `key` was invalidated after `generation`
    /// was captured.
    pub fn put_if_unchanged<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        generation: CacheGeneration,
    ) -> bool {
        let Some(entry) = self.encode(key, value, ttl) else {
            return false;
        };
        let generations = self.generations.lock();
        let current = CacheGeneration {
            epoch: generations.epoch,
            key: generations.per_key.get(key).copied().unwrap_or(0),
        };
        if current != generation {
            debug!("event=cache_put module=cache status=skip key={key} reason=invalidated");
            return false;
        }
        self.entries.write().insert(key.to_string(), entry);
        true
    }

    /// Invalidates one key.
    pub fn remove(&self, key: &str) {
        let mut generations = self.generations.lock();
        *generations.per_key.entry(key.to_string()).or_insert(0) += 1;
        self.entries.write().remove(key);
    }

    /// Invalidates every key starting with `prefix`; returns how many.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut generations = self.generations.lock();
        generations.epoch += 1;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
    fn encode<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("event=cache_put module=cache status=error key={key} error={err}");
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if payload.len() > self.max_payload_bytes {
            debug!(
                "event=cache_put module=cache status=skip key={} reason=payload_too_large bytes={} max_bytes={}",
                key,
                payload.len(),
                self.max_payload_bytes
            );
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let ttl = ttl.min(self.max_ttl);
        if ttl.is_zero() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(CacheEntry {
            payload,
            expires_at: Instant::now() + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::EphemeralCache;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn put_then_get_returns_value() {
        let cache = EphemeralCache::default();
        assert!(cache.put("k", &vec![1, 2, 3], Duration::from_secs(60)));
        assert_eq!(cache.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = EphemeralCache::default();
        assert!(cache.put("k", "v", Duration::from_millis(30)));
        sleep(Duration::from_millis(80));
        assert_eq!(cache.get::<String>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_invalidates_regardless_of_ttl() {
        let cache = EphemeralCache::default();
        cache.put("k", "v", Duration::from_secs(3600));
        cache.remove("k");
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test]
    fn oversized_payload_is_rejected_and_keeps_previous_value() {
        let cache = EphemeralCache::new(16, Duration::from_secs(60));
        assert!(cache.put("k", "small", Duration::from_secs(60)));
        assert!(!cache.put("k", &"x".repeat(64), Duration::from_secs(60)));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("small"));
        assert_eq!(cache.stats().rejected, 1);
    }

    #[test]
    fn ttl_is_clamped_to_maximum() {
        let cache = EphemeralCache::new(1024, Duration::from_millis(30));
        assert!(cache.put("k", "v", Duration::from_secs(3600)));
        sleep(Duration::from_millis(80));
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test]
    fn put_if_unchanged_skips_values_computed_before_invalidation() {
        let cache = EphemeralCache::default();
        let before_write = cache.generation("rows:a");
        cache.remove("rows:a");
        assert!(!cache.put_if_unchanged("rows:a", "stale", Duration::from_secs(60), before_write));
        assert_eq!(cache.get::<String>("rows:a"), None);

        let fresh = cache.generation("rows:a");
        assert!(cache.put_if_unchanged("rows:a", "fresh", Duration::from_secs(60), fresh));
        assert_eq!(cache.get::<String>("rows:a").as_deref(), Some("fresh"));
    }

    #[test]
    fn prefix_invalidation_covers_keys_without_entries() {
        let cache = EphemeralCache::default();
        let before_rollover = cache.generation("rows:2025-26:students:Students");
        cache.remove_prefix("rows:2025-26:");
        assert!(!cache.put_if_unchanged(
            "rows:2025-26:students:Students",
            "stale",
            Duration::from_secs(60),
            before_rollover
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_prefix_and_purge_expired() {
        let cache = EphemeralCache::default();
        cache.put("rows:a", "1", Duration::from_secs(60));
        cache.put("rows:b", "2", Duration::from_secs(60));
        cache.put("other", "3", Duration::from_millis(10));
        assert_eq!(cache.remove_prefix("rows:"), 2);
        sleep(Duration::from_millis(40));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 0);
    }
}
