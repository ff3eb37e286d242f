//! Orbit Metrics Module
//! ====================
//!
//! Explicit metrics collector for the simulation loop:
//! - **Tick latency**: wall time between consecutive tick broadcasts
//! - **Update duration**: time spent advancing a single truck
//! - **Dispatch counters**: ticks delivered to and dropped by truck tasks
//! - **Active tasks**: truck and broadcaster tasks currently alive
//!
//! A single [`SimMetrics`] is created at process start and shared (via `Arc`)
//! with whichever components record into it or export it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Upper bounds (seconds) of the latency histogram buckets.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

// =============================================================================
// HISTOGRAM
// =============================================================================

/// Lock-free duration histogram with fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Per-bucket counts; the final slot counts overflow past the last bound
    counts: [AtomicU64; DEFAULT_BUCKETS.len() + 1],

    /// Number of observations
    count: AtomicU64,

    /// Sum of all observations in nanoseconds
    sum_nanos: AtomicU64,

    /// Largest observation in nanoseconds
    max_nanos: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
            max_nanos: AtomicU64::new(0),
        }
    }
}

impl Histogram {
    /// Records one observation.
    pub fn observe(&self, value: Duration) {
        let secs = value.as_secs_f64();
        let slot = DEFAULT_BUCKETS
            .iter()
            .position(|bound| secs <= *bound)
            .unwrap_or(DEFAULT_BUCKETS.len());
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);

        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = DEFAULT_BUCKETS
            .iter()
            .zip(self.counts.iter())
            .map(|(bound, count)| {
                cumulative += count.load(Ordering::Relaxed);
                (*bound, cumulative)
            })
            .collect();

        HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum_secs: Duration::from_nanos(self.sum_nanos.load(Ordering::Relaxed)).as_secs_f64(),
            max_secs: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)).as_secs_f64(),
            buckets,
        }
    }
}

/// Serializable view of a [`Histogram`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_secs: f64,
    pub max_secs: f64,
    /// `(upper_bound_secs, cumulative_count)` pairs
    pub buckets: Vec<(f64, u64)>,
}

impl HistogramSnapshot {
    /// Mean observation in seconds, 0 when empty.
    pub fn mean_secs(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_secs / self.count as f64
        }
    }
}

// =============================================================================
// SIMULATION METRICS
// =============================================================================

/// Metrics collector owned by the simulation manager.
#[derive(Debug, Default)]
pub struct SimMetrics {
    /// Time between consecutive tick broadcasts
    pub tick_latency: Histogram,

    /// Time spent advancing one truck (lock wait included)
    pub update_duration: Histogram,

    ticks_broadcast: AtomicU64,
    ticks_delivered: AtomicU64,
    ticks_dropped: AtomicU64,
    active_tasks: AtomicUsize,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick_latency(&self, elapsed: Duration) {
        self.tick_latency.observe(elapsed);
    }

    pub fn record_update(&self, elapsed: Duration) {
        self.update_duration.observe(elapsed);
    }

    /// Records the outcome of one fan-out: how many truck queues accepted
    /// the tick and how many were still busy with the previous one.
    pub fn record_broadcast(&self, delivered: usize, dropped: usize) {
        self.ticks_broadcast.fetch_add(1, Ordering::Relaxed);
        self.ticks_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.ticks_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self) {
        // Saturating
        let _ = self
            .active_tasks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tick_latency: self.tick_latency.snapshot(),
            update_duration: self.update_duration.snapshot(),
            ticks_broadcast: self.ticks_broadcast.load(Ordering::Relaxed),
            ticks_delivered: self.ticks_delivered.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            active_tasks: self.active_tasks(),
        }
    }
}

/// Serializable view of [`SimMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tick_latency: HistogramSnapshot,
    pub update_duration: HistogramSnapshot,
    pub ticks_broadcast: u64,
    pub ticks_delivered: u64,
    pub ticks_dropped: u64,
    pub active_tasks: usize,
}

// =============================================================================
// TESTS
// =============================================================================
