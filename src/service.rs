use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, ResultCache};
use crate::error::Result;
use crate::fan_out::FanOut;
use crate::scraper::{PageSource, extract_profile};

/// The outcome of one roast request.
#[derive(Debug, Clone)]
pub struct RoastResult {
    pub entry: Arc<CacheEntry>,
    pub cached: bool,
}

/// Runs "cache → fetch → extract → fan-out → cache" for a profile URL.
///
/// Requests for the same URL are serialized through a per-key lock, so a
/// burst of identical requests performs one computation and the rest are
/// served from the cache once it lands.
pub struct RoastService {
    cache: Arc<ResultCache>,
    source: Arc<dyn PageSource>,
    fan_out: FanOut,
    models: Vec<String>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RoastService {
    pub fn new(
        cache: Arc<ResultCache>,
        source: Arc<dyn PageSource>,
        fan_out: FanOut,
        models: Vec<String>,
    ) -> Self {
        Self {
            cache,
            source,
            fan_out,
            models,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub async fn roast(&self, url: &str) -> Result<RoastResult> {
        let key = url.trim();

        if let Some(entry) = self.cache.get_fresh(key) {
            info!(url = key, "cache hit");
            return Ok(RoastResult { entry, cached: true });
        }

        let in_flight = self.acquire_in_flight(key);
        let _guard = in_flight.lock.lock().await;

        // Whoever held the lock before us may have filled the cache.
        match self.cache.peek_fresh(key) {
            Some(entry) => {
                info!(url = key, "served by concurrent computation");
                Ok(RoastResult { entry, cached: true })
            }
            None => self.compute(key).await,
        }
    }

    async fn compute(&self, key: &str) -> Result<RoastResult> {
        let started = Instant::now();
        info!(url = key, models = self.models.len(), "cache miss, computing roast");

        let html = self.source.fetch(key).await.inspect_err(|e| {
            warn!(url = key, error = %e, "fetch failed");
        })?;
        let profile = extract_profile(&html).inspect_err(|e| {
            warn!(url = key, error = %e, "extraction failed");
        })?;

        let outcomes = self.fan_out.run(&profile, &self.models).await;
        let entry = self.cache.put(key, profile, outcomes);

        info!(url = key, elapsed_ms = started.elapsed().as_millis() as u64, "roast computed and cached");
        Ok(RoastResult { entry, cached: false })
    }

    fn acquire_in_flight(&self, key: &str) -> InFlight<'_> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(in_flight.entry(key.to_string()).or_default());
        InFlight {
            service: self,
            key: key.to_string(),
            lock,
        }
    }

    pub fn in_flight_keys(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a per-key lock; the map entry goes away with the last holder, even
/// when the request future is dropped midway.
struct InFlight<'a> {
    service: &'a RoastService,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .service
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours means nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            in_flight.remove(&self.key);
        }
    }
}

/// Periodically drops expired cache entries.
pub fn spawn_cache_sweeper(cache: Arc<ResultCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = cache.sweep_expired();
            if removed > 0 {
                debug!(removed, "swept expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::scraper::Profile;
    use chrono::Utc;

    #[tokio::test]
    async fn sweeper_drops_expired_entries_in_the_background() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(ResultCache::with_clock(Duration::from_secs(60), 16, clock.clone()));
        let profile = Profile {
            nickname: "a".to_string(),
            intro: "b".to_string(),
            status: "c".to_string(),
            posts: Vec::new(),
        };
        cache.put("https://x/old", profile.clone(), Vec::new());
        clock.advance(chrono::Duration::seconds(61));
        cache.put("https://x/new", profile, Vec::new());

        let sweeper = spawn_cache_sweeper(Arc::clone(&cache), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.abort();

        assert!(cache.get("https://x/old").is_none());
        assert!(cache.get("https://x/new").is_some());
    }
}
