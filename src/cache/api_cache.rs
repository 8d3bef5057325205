use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::CacheError;

struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    ttl: Duration,
    /// Failed refreshes since the last successful fetch.
    consecutive_failures: u32,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at < self.ttl
    }
}

/// Per-key fetch slot. Callers queue on `outcome`; `generation` counts
/// completed fetches so a waiter can tell it slept through one.
struct InflightSlot<V> {
    generation: AtomicU64,
    outcome: Mutex<Option<Result<V, CacheError>>>,
}

impl<V> InflightSlot<V> {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            outcome: Mutex::new(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub stale_serves: u64,
    pub failures: u64,
}

/// TTL cache in front of expensive upstream reads (prices, tickers, candles,
/// market lists).
///
/// Expiry is lazy: entries are only inspected on access. Concurrent misses on
/// the same key are coalesced so only one caller hits upstream; the others wait
/// and receive its outcome, failures included. When a refresh fails and a stale value exists, the
/// stale value is returned for up to `max_stale_serves` consecutive failures,
/// after which the error surfaces.
pub struct ApiCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    inflight: DashMap<String, Arc<InflightSlot<V>>>,
    clock: Arc<dyn Clock>,
    max_stale_serves: u32,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    failures: AtomicU64,
}

impl<V: Clone> ApiCache<V> {
    pub fn new(clock: Arc<dyn Clock>, max_stale_serves: u32) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            clock,
            max_stale_serves,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key` if younger than its TTL, else call
    /// `fetch` and store the result for `ttl`.
    pub async fn get<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        self.load(key, ttl, || async move {
            fetch().await.map_err(|source| CacheError::Upstream {
                key: key.to_string(),
                source,
            })
        })
        .await
    }

    /// Same as [`get`](Self::get) but bounds the upstream call. A timeout is
    /// treated like any other fetch failure (stale fallback first).
    pub async fn get_with_timeout<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        timeout: std::time::Duration,
        fetch: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        self.load(key, ttl, || async move {
            match tokio::time::timeout(timeout, fetch()).await {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(source)) => Err(CacheError::Upstream {
                    key: key.to_string(),
                    source,
                }),
                Err(_) => Err(CacheError::Timeout {
                    key: key.to_string(),
                    timeout,
                }),
            }
        })
        .await
    }

    async fn load<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>>,
    {
        if let Some(v) = self.fresh(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(v);
        }

        let slot = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(InflightSlot::new()))
            .clone();
        let seen = slot.generation.load(Ordering::Acquire);

        let result = self.load_queued(key, ttl, fetch, &slot, seen).await;

        // Drop the slot once nobody else is queued on it
        self.inflight
            .remove_if(key, |_, s| Arc::ptr_eq(s, &slot) && Arc::strong_count(s) == 2);
        result
    }

    async fn load_queued<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
        slot: &InflightSlot<V>,
        seen: u64,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CacheError>>,
    {
        let mut outcome = slot.outcome.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(v) = self.fresh(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(v);
        }

        // Or failed: share that result instead of hitting upstream again
        if slot.generation.load(Ordering::Acquire) != seen {
            if let Some(last) = outcome.as_ref() {
                debug!("Sharing last fetch outcome for {key}");
                return match last {
                    Ok(v) => {
                        self.stale_serves.fetch_add(1, Ordering::Relaxed);
                        Ok(v.clone())
                    }
                    Err(err) => Err(err.share()),
                };
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss: {key}");
        let result = self.settle(key, ttl, fetch().await);
        *outcome = Some(match &result {
            Ok(v) => Ok(v.clone()),
            Err(err) => Err(err.share()),
        });
        slot.generation.fetch_add(1, Ordering::Release);
        result
    }

    fn fresh(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.value.clone())
    }

    fn settle(&self, key: &str, ttl: Duration, result: Result<V, CacheError>) -> Result<V, CacheError> {
        match result {
            Ok(value) => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        stored_at: self.clock.now(),
                        ttl,
                        consecutive_failures: 0,
                    },
                );
                Ok(value)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let now = self.clock.now();
                if let Some(mut entry) = self.entries.get_mut(key) {
                    entry.consecutive_failures += 1;
                    if entry.consecutive_failures <= self.max_stale_serves {
                        self.stale_serves.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Cache degraded: serving stale {key} (age {}s, failure {}/{}): {err}",
                            (now - entry.stored_at).num_seconds(),
                            entry.consecutive_failures,
                            self.max_stale_serves
                        );
                        return Ok(entry.value.clone());
                    }
                }
                warn!("Cache fetch failed for {key}: {err}");
                Err(err)
            }
        }
    }

    /// Store a value directly, e.g. from a push feed.
    pub fn put(&self, key: &str, value: V, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: self.clock.now(),
                ttl,
                consecutive_failures: 0,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        self.inflight.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.inflight.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    fn setup(max_stale: u32) -> (Arc<ManualClock>, ApiCache<f64>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
        ));
        let cache = ApiCache::new(clock.clone(), max_stale);
        (clock, cache)
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_fetch() {
        let (clock, cache) = setup(1);
        let calls = AtomicUsize::new(0);
        let ttl = Duration::seconds(30);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(101.5)
        };
        assert_eq!(cache.get("BTC-USD", ttl, fetch).await.unwrap(), 101.5);

        clock.advance_secs(10);
        let v = cache
            .get("BTC-USD", ttl, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(999.0)
            })
            .await
            .unwrap();
        assert_eq!(v, 101.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Past TTL → refetch
        clock.advance_secs(25);
        let v = cache
            .get("BTC-USD", ttl, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(102.0)
            })
            .await
            .unwrap();
        assert_eq!(v, 102.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.keys, vec!["BTC-USD".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_served_once_then_error_surfaces() {
        let (clock, cache) = setup(1);
        let ttl = Duration::seconds(5);
        cache.get("ETH-USD", ttl, || async { Ok(3000.0) }).await.unwrap();

        clock.advance_secs(6);
        let v = cache
            .get("ETH-USD", ttl, || async { Err(anyhow::anyhow!("502 from upstream")) })
            .await
            .unwrap();
        assert_eq!(v, 3000.0);

        let err = cache
            .get("ETH-USD", ttl, || async { Err(anyhow::anyhow!("502 from upstream")) })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Upstream { .. }));
        assert_eq!(err.key(), "ETH-USD");

        // A success resets the failure streak
        cache.get("ETH-USD", ttl, || async { Ok(3100.0) }).await.unwrap();
        clock.advance_secs(6);
        let v = cache
            .get("ETH-USD", ttl, || async { Err(anyhow::anyhow!("reset")) })
            .await
            .unwrap();
        assert_eq!(v, 3100.0);

        let stats = cache.stats();
        assert_eq!(stats.stale_serves, 2);
        assert_eq!(stats.failures, 3);
    }

    #[tokio::test]
    async fn test_miss_without_stale_propagates() {
        let (_clock, cache) = setup(1);
        let err = cache
            .get("SOL-USD", Duration::seconds(5), || async { Err(anyhow::anyhow!("down")) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SOL-USD"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_stale() {
        let (clock, cache) = setup(1);
        let ttl = Duration::seconds(5);
        cache.put("BTC-USD", 100.0, ttl);
        clock.advance_secs(10);

        let slow = || async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(1.0)
        };
        let v = cache
            .get_with_timeout("BTC-USD", ttl, std::time::Duration::from_millis(10), slow)
            .await
            .unwrap();
        assert_eq!(v, 100.0);

        let err = cache
            .get_with_timeout("LINK-USD", ttl, std::time::Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let (_clock, cache) = setup(1);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get("markets", Duration::seconds(30), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(42.0)
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_failing_misses_fetch_once() {
        let (_clock, cache) = setup(1);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let spawn_failing = |cache: Arc<ApiCache<f64>>, calls: Arc<AtomicUsize>| {
            tokio::spawn(async move {
                cache
                    .get("markets", Duration::seconds(30), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Err::<f64, _>(anyhow::anyhow!("503 from upstream"))
                    })
                    .await
            })
        };

        let handles: Vec<_> = (0..8)
            .map(|_| spawn_failing(cache.clone(), calls.clone()))
            .collect();
        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("503"));
            assert_eq!(err.key(), "markets");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().failures, 1);
        assert!(cache.inflight.is_empty());

        // A later miss is a new attempt
        spawn_failing(cache.clone(), calls.clone()).await.unwrap().unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_inflight_slots_released_after_fetch() {
        let (_clock, cache) = setup(1);
        let ttl = Duration::seconds(30);
        for key in ["BTC-USD", "ETH-USD", "SOL-USD"] {
            cache.get(key, ttl, || async { Ok(1.0) }).await.unwrap();
        }
        cache
            .get("LINK-USD", ttl, || async { Err(anyhow::anyhow!("down")) })
            .await
            .unwrap_err();
        assert!(cache.inflight.is_empty());
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (_clock, cache) = setup(1);
        let ttl = Duration::seconds(30);
        cache.get("k", ttl, || async { Ok(1.0) }).await.unwrap();
        cache.invalidate("k");
        let v = cache.get("k", ttl, || async { Ok(2.0) }).await.unwrap();
        assert_eq!(v, 2.0);
    }
}
