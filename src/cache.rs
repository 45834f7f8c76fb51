//! In-memory cache of finished roasts, keyed by profile URL.
//!
//! Entries expire lazily: a stale entry is only dropped when its own key is
//! looked up again, or when [`ResultCache::sweep_expired`] runs. The cache is
//! bounded; inserting into a full cache evicts the least recently used entry.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::llm::ModelOutcome;
use crate::scraper::Profile;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One completed fan-out round for a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub profile: Profile,
    pub outcomes: Vec<ModelOutcome>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// `now - created_at > ttl`. An entry from the future is never expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

pub struct ResultCache {
    entries: Mutex<LruCache<String, Arc<CacheEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<CacheEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored entry for `key`, whatever its age.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.lock().get(key).cloned()
    }

    /// Whether an entry exists for `key` and is older than `ttl`.
    pub fn is_expired(&self, key: &str, ttl: Duration) -> bool {
        let now = self.clock.now();
        self.lock()
            .peek(key)
            .map(|entry| entry.is_expired_at(now, ttl))
            .unwrap_or(false)
    }

    /// Lookup with lazy expiry: a stale entry is deleted and reported absent.
    pub fn get_fresh(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.lookup_fresh(key, true)
    }

    /// Like [`get_fresh`](Self::get_fresh) but leaves hit/miss counters alone.
    pub fn peek_fresh(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.lookup_fresh(key, false)
    }

    fn lookup_fresh(&self, key: &str, count: bool) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let found = entries.get(key).cloned();
        let fresh = match found {
            Some(entry) if entry.is_expired_at(now, self.ttl) => {
                entries.pop(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache entry expired");
                None
            }
            other => other,
        };

        if count {
            let counter = if fresh.is_some() { &self.hits } else { &self.misses };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Installs a complete entry stamped with the current time, replacing any
    /// previous one for the same key.
    pub fn put(&self, key: &str, profile: Profile, outcomes: Vec<ModelOutcome>) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            key: key.to_string(),
            profile,
            outcomes,
            created_at: self.clock.now(),
        });

        // `push` hands back either the replaced value for this key or the
        // least recently used entry it pushed out.
        if let Some((evicted, _)) = self.lock().push(key.to_string(), Arc::clone(&entry)) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "evicted least recently used cache entry");
            }
        }
        entry
    }

    pub fn remove(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.lock().pop(key)
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        self.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
