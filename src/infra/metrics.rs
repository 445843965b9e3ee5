//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::TransitionKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Batches ingested (monotonic)
    batches_total: AtomicU64,
    /// Batches rejected outright (empty / oversized)
    batches_rejected: AtomicU64,
    /// Batches since last report (reset on report)
    batches_since_report: AtomicU64,
    /// Points seen in accepted batches (monotonic)
    points_total: AtomicU64,
    /// Points accepted as a device's latest position
    points_accepted: AtomicU64,
    /// Points not newer than the stored latest position
    points_stale: AtomicU64,
    /// Points failing coordinate/identity validation
    points_rejected: AtomicU64,
    transitions_entered: AtomicU64,
    transitions_exited: AtomicU64,
    /// Per-fence evaluation failures (invalid shape, lock conflicts)
    fence_errors: AtomicU64,
    /// Sum of ingest latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max ingest latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Ingest latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            batches_total: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            batches_since_report: AtomicU64::new(0),
            points_total: AtomicU64::new(0),
            points_accepted: AtomicU64::new(0),
            points_stale: AtomicU64::new(0),
            points_rejected: AtomicU64::new(0),
            transitions_entered: AtomicU64::new(0),
            transitions_exited: AtomicU64::new(0),
            fence_errors: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed batch with its ingest latency (lock-free)
    #[inline]
    pub fn record_batch(&self, points: usize, latency_us: u64) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.batches_since_report.fetch_add(1, Ordering::Relaxed);
        self.points_total.fetch_add(points as u64, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_batch_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the Position Tracker's verdict on a point
    #[inline]
    pub fn record_point(&self, accepted: bool) {
        if accepted {
            self.points_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.points_stale.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_point_rejected(&self) {
        self.points_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self, kind: TransitionKind) {
        match kind {
            TransitionKind::Entered => self.transitions_entered.fetch_add(1, Ordering::Relaxed),
            TransitionKind::Exited => self.transitions_exited.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_fence_error(&self) {
        self.fence_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn batches_total(&self) -> u64 {
        self.batches_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn points_stale(&self) -> u64 {
        self.points_stale.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fence_errors(&self) -> u64 {
        self.fence_errors.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, tracked_devices: usize, fences: usize) -> MetricsSummary {
        let batches_count = self.batches_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let batches_per_sec = if elapsed.as_secs_f64() > 0.0 {
            batches_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if batches_count > 0 { latency_sum / batches_count } else { 0 };

        MetricsSummary {
            batches_total: self.batches_total.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            batches_per_sec,
            points_total: self.points_total.load(Ordering::Relaxed),
            points_accepted: self.points_accepted.load(Ordering::Relaxed),
            points_stale: self.points_stale.load(Ordering::Relaxed),
            points_rejected: self.points_rejected.load(Ordering::Relaxed),
            transitions_entered: self.transitions_entered.load(Ordering::Relaxed),
            transitions_exited: self.transitions_exited.load(Ordering::Relaxed),
            fence_errors: self.fence_errors.load(Ordering::Relaxed),
            avg_ingest_latency_us: avg_latency,
            max_ingest_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            tracked_devices,
            fences,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub batches_total: u64,
    pub batches_rejected: u64,
    pub batches_per_sec: f64,
    pub points_total: u64,
    pub points_accepted: u64,
    pub points_stale: u64,
    pub points_rejected: u64,
    pub transitions_entered: u64,
    pub transitions_exited: u64,
    pub fence_errors: u64,
    pub avg_ingest_latency_us: u64,
    pub max_ingest_latency_us: u64,
    /// Ingest latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    /// Devices with a latest position (snapshot)
    pub tracked_devices: usize,
    /// Fences in the index (snapshot)
    pub fences: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            batches_total = %self.batches_total,
            batches_per_sec = format!("{:.1}", self.batches_per_sec),
            points_total = %self.points_total,
            points_stale = %self.points_stale,
            points_rejected = %self.points_rejected,
            entered = %self.transitions_entered,
            exited = %self.transitions_exited,
            fence_errors = %self.fence_errors,
            avg_latency_us = %self.avg_ingest_latency_us,
            p99_us = %self.lat_p99_us,
            tracked_devices = %self.tracked_devices,
            fences = %self.fences,
            "metrics"
        );
    }
}
