// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Response cache with explicit expiry and invalidation
//!
//! Entries expire after a fixed TTL measured by an injected [`Clock`], so
//! staleness is deterministic under test. Keys are plain strings grouped by
//! prefix (`rules:{pid}:list:...`), and invalidation works on prefixes.
//!
//! ## Optimistic updates
//!
//! [`TtlCache::update_matching`] rewrites every live entry under a prefix and
//! returns a [`CacheSnapshot`] of the prior values. Each entry carries a
//! generation number bumped on every write; [`TtlCache::rollback`] restores
//! only entries whose generation is unchanged, so a rollback never clobbers
//! data written after the optimistic update.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

/// Prior values captured by [`TtlCache::update_matching`].
#[derive(Debug, Clone)]
pub struct CacheSnapshot<V> {
    entries: Vec<(String, Entry<V>, u64)>,
}

impl<V> CacheSnapshot<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            next_generation: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Live value for `key`. Expired entries count as misses and are evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let (value, expired) = match entries.get(key) {
            Some(entry) if entry.expires_at > now => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            entries.remove(key);
        }
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Store `value` for `ttl`. Expired entries are swept first, so keys
    /// that are never read again do not accumulate.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = self.clock.now();
        let entry = Entry {
            value,
            expires_at: now + ttl,
            generation: self.generation(),
        };
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        entries.insert(key.into(), entry);
    }

    /// Evict every expired entry. Returns the count.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        Self::sweep(&mut self.entries.lock(), now)
    }

    fn sweep(entries: &mut HashMap<String, Entry<V>>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::trace!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drop every entry whose key starts with `prefix`. Returns the count.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(prefix, removed, "Invalidated cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Entries currently stored, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Apply `f` to every live entry under `prefix`, keeping its expiry.
    pub fn update_matching<F>(&self, prefix: &str, mut f: F) -> CacheSnapshot<V>
    where
        F: FnMut(&mut V),
    {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let mut snapshot = Vec::new();
        for (key, entry) in entries.iter_mut() {
            if !key.starts_with(prefix) || entry.expires_at <= now {
                continue;
            }
            let prior = entry.clone();
            f(&mut entry.value);
            entry.generation = self.generation();
            snapshot.push((key.clone(), prior, entry.generation));
        }
        CacheSnapshot { entries: snapshot }
    }

    /// Undo an optimistic update. Entries rewritten, invalidated or cleared
    /// since the snapshot are left alone. Returns the number restored.
    pub fn rollback(&self, snapshot: CacheSnapshot<V>) -> usize {
        let mut entries = self.entries.lock();
        let mut restored = 0;
        for (key, prior, written) in snapshot.entries {
            match entries.get_mut(&key) {
                Some(current) if current.generation == written => {
                    *current = prior;
                    restored += 1;
                }
                _ => tracing::debug!(key = %key, "Skipping stale rollback"),
            }
        }
        restored
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn cache() -> (TtlCache<Vec<&'static str>>, ManualClock) {
        let clock = ManualClock::new();
        (TtlCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_entries_expire_with_clock() {
        let (cache, clock) = cache();
        cache.insert("rules:p1:list", vec!["a"], TTL);

        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get("rules:p1:list"), Some(vec!["a"]));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("rules:p1:list"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_invalidate_prefix() {
        let (cache, _) = cache();
        cache.insert("rules:p1:list:a", vec![], TTL);
        cache.insert("rules:p1:list:b", vec![], TTL);
        cache.insert("rules:p1:detail:r1", vec![], TTL);
        cache.insert("traces:list", vec![], TTL);

        assert_eq!(cache.invalidate_prefix("rules:p1:list"), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.invalidate("traces:list"));
        assert!(!cache.invalidate("traces:list"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_update_then_rollback_restores() {
        let (cache, _) = cache();
        cache.insert("rules:list:1", vec!["a", "b"], TTL);
        cache.insert("rules:list:2", vec!["b"], TTL);
        cache.insert("other", vec!["b"], TTL);

        let snapshot = cache.update_matching("rules:list", |rows| rows.retain(|r| *r != "b"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(cache.get("rules:list:1"), Some(vec!["a"]));
        assert_eq!(cache.get("other"), Some(vec!["b"]));

        assert_eq!(cache.rollback(snapshot), 2);
        assert_eq!(cache.get("rules:list:1"), Some(vec!["a", "b"]));
        assert_eq!(cache.get("rules:list:2"), Some(vec!["b"]));
    }

    #[test]
    fn test_rollback_skips_newer_writes() {
        let (cache, _) = cache();
        cache.insert("rules:list:1", vec!["a"], TTL);
        cache.insert("rules:list:2", vec!["a"], TTL);

        let snapshot = cache.update_matching("rules:list", |rows| rows.clear());
        cache.insert("rules:list:1", vec!["fresh"], TTL);
        cache.invalidate("rules:list:2");

        assert_eq!(cache.rollback(snapshot), 0);
        assert_eq!(cache.get("rules:list:1"), Some(vec!["fresh"]));
        assert_eq!(cache.get("rules:list:2"), None);
    }

    #[test]
    fn test_insert_sweeps_expired_entries() {
        let (cache, clock) = cache();
        cache.insert("traces:list:page=1", vec!["a"], TTL);
        cache.insert("traces:list:page=2", vec!["b"], Duration::from_secs(90));
        clock.advance(Duration::from_secs(31));

        cache.insert("traces:list:page=3", vec!["c"], TTL);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().misses, 0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_update_ignores_expired_entries() {
        let (cache, clock) = cache();
        cache.insert("rules:list:1", vec!["a"], TTL);
        clock.advance(TTL);
        let snapshot = cache.update_matching("rules:list", |rows| rows.clear());
        assert!(snapshot.is_empty());
    }
}
