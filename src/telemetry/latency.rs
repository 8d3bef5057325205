use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::info;

/// Time spent queued for the trading lock.
pub const LOCK_WAIT: &str = "lock_wait";
/// Full `should_admit` evaluation, lock held.
pub const ADMISSION: &str = "admission";
/// Upstream market fetch through the cache (hits included).
pub const MARKET_FETCH: &str = "market_fetch";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
}

/// Rolling latency samples per operation.
pub struct LatencyTracker {
    histograms: dashmap::DashMap<String, VecDeque<Duration>>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            histograms: dashmap::DashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        let max = self.max_samples;
        let mut hist = self
            .histograms
            .entry(operation.to_string())
            .or_insert_with(|| VecDeque::with_capacity(max.min(1024)));
        if hist.len() >= max {
            hist.pop_front();
        }
        hist.push_back(duration);
    }

    /// Start a timer that records on drop.
    pub fn start_timer(&self, operation: &'static str) -> Timer<'_> {
        Timer {
            operation,
            start: Instant::now(),
            tracker: self,
        }
    }

    /// p50, p95, p99 for an operation.
    pub fn percentiles(&self, operation: &str) -> Option<(Duration, Duration, Duration)> {
        let hist = self.histograms.get(operation)?;
        percentiles_of(hist.value())
    }

    pub fn summary(&self) -> BTreeMap<String, LatencySummary> {
        self.histograms
            .iter()
            .filter_map(|entry| {
                let (p50, p95, p99) = percentiles_of(entry.value())?;
                Some((
                    entry.key().clone(),
                    LatencySummary {
                        p50_ms: p50.as_secs_f64() * 1000.0,
                        p95_ms: p95.as_secs_f64() * 1000.0,
                        p99_ms: p99.as_secs_f64() * 1000.0,
                        samples: entry.value().len(),
                    },
                ))
            })
            .collect()
    }

    pub fn log_summary(&self) {
        for (op, s) in self.summary() {
            info!(
                "Latency [{op}]: p50={:.2}ms p95={:.2}ms p99={:.2}ms samples={}",
                s.p50_ms, s.p95_ms, s.p99_ms, s.samples
            );
        }
    }
}

fn percentiles_of(hist: &VecDeque<Duration>) -> Option<(Duration, Duration, Duration)> {
    if hist.is_empty() {
        return None;
    }
    let mut sorted: Vec<Duration> = hist.iter().copied().collect();
    sorted.sort();

    let last = sorted.len() - 1;
    let at = |q: f64| sorted[((sorted.len() as f64 * q) as usize).min(last)];
    Some((at(0.50), at(0.95), at(0.99)))
}

pub struct Timer<'a> {
    operation: &'static str,
    start: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let t = LatencyTracker::new(1000);
        for ms in 1..=100 {
            t.record(ADMISSION, Duration::from_millis(ms));
        }
        let (p50, p95, p99) = t.percentiles(ADMISSION).unwrap();
        assert_eq!(p50, Duration::from_millis(51));
        assert_eq!(p95, Duration::from_millis(96));
        assert_eq!(p99, Duration::from_millis(100));
        assert!(t.percentiles(LOCK_WAIT).is_none());
    }

    #[test]
    fn test_rolling_window() {
        let t = LatencyTracker::new(3);
        for ms in [100, 1, 2, 3] {
            t.record(LOCK_WAIT, Duration::from_millis(ms));
        }
        let s = t.summary();
        assert_eq!(s[LOCK_WAIT].samples, 3);
        assert!((s[LOCK_WAIT].p99_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let t = LatencyTracker::new(10);
        {
            let _timer = t.start_timer(MARKET_FETCH);
        }
        assert_eq!(t.summary()[MARKET_FETCH].samples, 1);
    }
}
