//! Engine metrics
//!
//! Lock-free counters and a latency histogram, exported as a serializable
//! snapshot for the metrics endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// A thread-safe counter metric
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a new counter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A thread-safe gauge metric (can go up and down)
#[derive(Debug, Default, Clone)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Create a new gauge
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge value
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get the current value
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Arc<Vec<AtomicU64>>,
    /// Sum in microseconds
    sum_us: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

/// Upper bounds in milliseconds, spread around the fast-path budget
const LATENCY_BUCKETS_MS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0, 5000.0];

impl Histogram {
    /// Empty latency histogram
    #[must_use]
    pub fn new() -> Self {
        let bounds = LATENCY_BUCKETS_MS.to_vec();
        let counts = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts: Arc::new(counts),
            sum_us: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Observe a value in milliseconds
    pub fn observe(&self, value_ms: f64) {
        self.sum_us
            .fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bound, count) in self.bounds.iter().zip(self.counts.iter()) {
            if value_ms <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of observations
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations in milliseconds
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Cumulative bucket counts as `(upper bound, count)`
    #[must_use]
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.bounds
            .iter()
            .zip(self.counts.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by the engine and the reload supervisor
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    /// Requests processed
    pub requests: Counter,
    /// Requests answered on the fast path
    pub fast_path: Counter,
    /// Requests handed to the durable path
    pub durable_path: Counter,
    /// Failed requests
    pub errors: Counter,
    /// Fast-path latency
    pub fast_latency: Histogram,
    /// Reloads installed
    pub reloads: Counter,
    /// Definition changes rejected during reloads
    pub rejected_changes: Counter,
    /// Reload attempts that failed outright
    pub reload_failures: Counter,
    /// Live sessions
    pub sessions: Gauge,
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests processed
    pub requests: u64,
    /// Requests answered on the fast path
    pub fast_path: u64,
    /// Requests handed to the durable path
    pub durable_path: u64,
    /// Failed requests
    pub errors: u64,
    /// Mean fast-path latency
    pub fast_latency_mean_ms: f64,
    /// Reloads installed
    pub reloads: u64,
    /// Definition changes rejected
    pub rejected_changes: u64,
    /// Reload attempts that failed outright
    pub reload_failures: u64,
    /// Live sessions
    pub sessions: i64,
}

impl EngineMetrics {
    /// Create zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current values
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.fast_latency.count();
        MetricsSnapshot {
            requests: self.requests.get(),
            fast_path: self.fast_path.get(),
            durable_path: self.durable_path.get(),
            errors: self.errors.get(),
            fast_latency_mean_ms: if count == 0 {
                0.0
            } else {
                self.fast_latency.sum() / count as f64
            },
            reloads: self.reloads.get(),
            rejected_changes: self.rejected_changes.get(),
            reload_failures: self.reload_failures.get(),
            sessions: self.sessions.get(),
        }
    }
}
