//! Shared LRU+TTL eviction machinery.
//!
//! Both the audit cache and the prompt cache are byte-budgeted LRU stores
//! with per-entry TTLs; they differ only in key derivation and limits. The
//! store itself is synchronous; owners wrap it in an async lock.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::time::Instant;

use crate::config::CacheLimits;

/// Fraction of each budget kept free after an eviction pass.
const EVICTION_HEADROOM: f64 = 0.8;

/// One cached value with bookkeeping.
#[derive(Debug, Clone)]
pub struct StoredEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    /// Approximate in-memory size in bytes.
    pub size: usize,
}

impl<V> StoredEntry<V> {
    fn new(value: V, size: usize) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            size,
        }
    }

    fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > max_age
    }
}

/// On-demand cache statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_usage: usize,
    pub evictions: u64,
    pub avg_access_time_us: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A byte-budgeted LRU store with per-entry TTL.
pub struct LruTtlStore<V> {
    entries: HashMap<String, StoredEntry<V>>,
    limits: CacheLimits,
    memory_usage: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    access_time_total_us: f64,
    access_samples: u64,
}

impl<V: Clone> LruTtlStore<V> {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            entries: HashMap::new(),
            limits,
            memory_usage: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            access_time_total_us: 0.0,
            access_samples: 0,
        }
    }

    fn max_age(&self) -> Duration {
        Duration::milliseconds(self.limits.max_age_ms as i64)
    }

    /// Look up a value. Expired entries count as misses and are removed.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let started = Instant::now();
        let now = Utc::now();
        let max_age = self.max_age();

        let result = match self.entries.get_mut(key) {
            Some(entry) if entry.is_expired(max_age, now) => {
                let size = entry.size;
                self.entries.remove(key);
                self.memory_usage = self.memory_usage.saturating_sub(size);
                self.misses += 1;
                None
            }
            Some(entry) => {
                entry.last_accessed_at = now;
                entry.access_count += 1;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        };

        if self.limits.enable_stats {
            self.access_time_total_us += started.elapsed().as_secs_f64() * 1e6;
            self.access_samples += 1;
        }

        result
    }

    /// Check for a live entry without touching recency or stats.
    pub fn has(&self, key: &str) -> bool {
        let now = Utc::now();
        self.entries
            .get(key)
            .map(|e| !e.is_expired(self.max_age(), now))
            .unwrap_or(false)
    }

    /// Insert a value, evicting as needed to stay within budget.
    pub fn set(&mut self, key: impl Into<String>, value: V, size: usize) {
        let key = key.into();
        if let Some(old) = self.entries.remove(&key) {
            self.memory_usage = self.memory_usage.saturating_sub(old.size);
        }

        self.entries.insert(key, StoredEntry::new(value, size));
        self.memory_usage += size;

        if self.entries.len() > self.limits.max_entries
            || self.memory_usage > self.limits.max_memory_bytes
        {
            self.evict_to_headroom();
        }
    }

    /// Drop expired entries, then enforce budgets with headroom.
    pub fn cleanup(&mut self) {
        let now = Utc::now();
        let max_age = self.max_age();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(max_age, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                self.memory_usage = self.memory_usage.saturating_sub(entry.size);
                self.evictions += 1;
            }
        }

        if self.entries.len() > self.limits.max_entries
            || self.memory_usage > self.limits.max_memory_bytes
        {
            self.evict_to_headroom();
        }
    }

    /// Evict least-recently-used entries until both budgets sit at 80%.
    fn evict_to_headroom(&mut self) {
        let target_entries = (self.limits.max_entries as f64 * EVICTION_HEADROOM) as usize;
        let target_memory = (self.limits.max_memory_bytes as f64 * EVICTION_HEADROOM) as usize;

        let mut by_recency: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed_at))
            .collect();
        by_recency.sort_by_key(|(_, accessed)| *accessed);

        for (key, _) in by_recency {
            if self.entries.len() <= target_entries && self.memory_usage <= target_memory {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.memory_usage = self.memory_usage.saturating_sub(entry.size);
                self.evictions += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.memory_usage = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            memory_usage: self.memory_usage,
            evictions: self.evictions,
            avg_access_time_us: if self.access_samples == 0 {
                0.0
            } else {
                self.access_time_total_us / self.access_samples as f64
            },
        }
    }
}
