//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the metrics HTTP task can read while the polling loop
//! writes. All atomics use Relaxed ordering; these are statistical counters
//! only and must not drive engine logic.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

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

/// Counters shared between the polling loop and reporters
pub struct Metrics {
    batches_total: AtomicU64,
    empty_batches: AtomicU64,
    feed_errors: AtomicU64,
    rows_total: AtomicU64,
    rows_malformed: AtomicU64,
    laps_recorded: AtomicU64,
    laps_rejected: AtomicU64,
    laps_repeated: AtomicU64,
    pit_entries: AtomicU64,
    stints_scored: AtomicU64,
    stints_skipped: AtomicU64,
    karts_queued: AtomicU64,
    karts_released: AtomicU64,
    queue_duplicates: AtomicU64,
    queue_evictions: AtomicU64,
    box_now_verdicts: AtomicU64,
    queue_depth: AtomicU64,
    // Batch latency, reset on each report
    batch_latency_sum_us: AtomicU64,
    batch_latency_count: AtomicU64,
    batch_latency_max_us: AtomicU64,
    /// Start of the current reporting interval
    last_report: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            batches_total: AtomicU64::new(0),
            empty_batches: AtomicU64::new(0),
            feed_errors: AtomicU64::new(0),
            rows_total: AtomicU64::new(0),
            rows_malformed: AtomicU64::new(0),
            laps_recorded: AtomicU64::new(0),
            laps_rejected: AtomicU64::new(0),
            laps_repeated: AtomicU64::new(0),
            pit_entries: AtomicU64::new(0),
            stints_scored: AtomicU64::new(0),
            stints_skipped: AtomicU64::new(0),
            karts_queued: AtomicU64::new(0),
            karts_released: AtomicU64::new(0),
            queue_duplicates: AtomicU64::new(0),
            queue_evictions: AtomicU64::new(0),
            box_now_verdicts: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            batch_latency_sum_us: AtomicU64::new(0),
            batch_latency_count: AtomicU64::new(0),
            batch_latency_max_us: AtomicU64::new(0),
            last_report: Mutex::new(Instant::now()),
        }
    }

    /// Record a processed batch and how long the pipeline took for it
    #[inline]
    pub fn record_batch(&self, rows: usize, started: Instant) {
        let latency_us = started.elapsed().as_micros() as u64;
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.rows_total.fetch_add(rows as u64, Ordering::Relaxed);
        if rows == 0 {
            self.empty_batches.fetch_add(1, Ordering::Relaxed);
        }
        self.batch_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.batch_latency_count.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.batch_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_feed_error(&self) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_row_malformed(&self) {
        self.rows_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lap(&self, accepted: bool) {
        if accepted {
            self.laps_recorded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.laps_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_lap_repeated(&self) {
        self.laps_repeated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pit_entry(&self, scored: bool) {
        self.pit_entries.fetch_add(1, Ordering::Relaxed);
        if scored {
            self.stints_scored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stints_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_queued(&self, evicted: bool) {
        self.karts_queued.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.queue_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_queue_duplicate(&self) {
        self.queue_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_kart_released(&self) {
        self.karts_released.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_box_now(&self) {
        self.box_now_verdicts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }

    pub fn batches_total(&self) -> u64 {
        self.batches_total.load(Ordering::Relaxed)
    }

    pub fn rows_malformed(&self) -> u64 {
        self.rows_malformed.load(Ordering::Relaxed)
    }

    pub fn stints_scored(&self) -> u64 {
        self.stints_scored.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Build a summary; latency figures reset, totals do not
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let now = Instant::now();
            let mut last = self.last_report.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };
        let latency_sum = self.batch_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_count = self.batch_latency_count.swap(0, Ordering::Relaxed);
        let latency_max = self.batch_latency_max_us.swap(0, Ordering::Relaxed);
        self.summarize(latency_sum, latency_count, latency_max, elapsed_secs)
    }

    /// Build a summary without resetting the reporting interval
    pub fn peek(&self) -> MetricsSummary {
        let elapsed_secs = self.last_report.lock().elapsed().as_secs_f64();
        self.summarize(
            self.batch_latency_sum_us.load(Ordering::Relaxed),
            self.batch_latency_count.load(Ordering::Relaxed),
            self.batch_latency_max_us.load(Ordering::Relaxed),
            elapsed_secs,
        )
    }

    fn summarize(
        &self,
        latency_sum: u64,
        latency_count: u64,
        latency_max: u64,
        elapsed_secs: f64,
    ) -> MetricsSummary {
        MetricsSummary {
            batches_total: self.batches_total.load(Ordering::Relaxed),
            batches_per_min: if elapsed_secs > 0.0 {
                latency_count as f64 * 60.0 / elapsed_secs
            } else {
                0.0
            },
            empty_batches: self.empty_batches.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            rows_total: self.rows_total.load(Ordering::Relaxed),
            rows_malformed: self.rows_malformed.load(Ordering::Relaxed),
            laps_recorded: self.laps_recorded.load(Ordering::Relaxed),
            laps_rejected: self.laps_rejected.load(Ordering::Relaxed),
            laps_repeated: self.laps_repeated.load(Ordering::Relaxed),
            pit_entries: self.pit_entries.load(Ordering::Relaxed),
            stints_scored: self.stints_scored.load(Ordering::Relaxed),
            stints_skipped: self.stints_skipped.load(Ordering::Relaxed),
            karts_queued: self.karts_queued.load(Ordering::Relaxed),
            karts_released: self.karts_released.load(Ordering::Relaxed),
            queue_duplicates: self.queue_duplicates.load(Ordering::Relaxed),
            queue_evictions: self.queue_evictions.load(Ordering::Relaxed),
            box_now_verdicts: self.box_now_verdicts.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            avg_batch_latency_us: if latency_count > 0 { latency_sum / latency_count } else { 0 },
            max_batch_latency_us: latency_max,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub batches_total: u64,
    pub batches_per_min: f64,
    pub empty_batches: u64,
    pub feed_errors: u64,
    pub rows_total: u64,
    pub rows_malformed: u64,
    pub laps_recorded: u64,
    pub laps_rejected: u64,
    pub laps_repeated: u64,
    pub pit_entries: u64,
    pub stints_scored: u64,
    pub stints_skipped: u64,
    pub karts_queued: u64,
    pub karts_released: u64,
    pub queue_duplicates: u64,
    pub queue_evictions: u64,
    pub box_now_verdicts: u64,
    pub queue_depth: u64,
    pub avg_batch_latency_us: u64,
    pub max_batch_latency_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            batches_total = %self.batches_total,
            batches_per_min = format!("{:.1}", self.batches_per_min),
            feed_errors = %self.feed_errors,
            rows_malformed = %self.rows_malformed,
            laps_recorded = %self.laps_recorded,
            laps_rejected = %self.laps_rejected,
            stints_scored = %self.stints_scored,
            stints_skipped = %self.stints_skipped,
            queue_depth = %self.queue_depth,
            queue_evictions = %self.queue_evictions,
            avg_batch_us = %self.avg_batch_latency_us,
            max_batch_us = %self.max_batch_latency_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_batch(5, Instant::now());
        metrics.record_batch(0, Instant::now());
        metrics.record_row_malformed();
        metrics.record_lap(true);
        metrics.record_lap(true);
        metrics.record_lap(false);
        metrics.record_pit_entry(true);
        metrics.record_pit_entry(false);
        metrics.record_queued(true);
        metrics.set_queue_depth(3);

        let summary = metrics.report();
        assert_eq!(summary.batches_total, 2);
        assert_eq!(summary.empty_batches, 1);
        assert_eq!(summary.rows_total, 5);
        assert_eq!(summary.rows_malformed, 1);
        assert_eq!(summary.laps_recorded, 2);
        assert_eq!(summary.laps_rejected, 1);
        assert_eq!(summary.pit_entries, 2);
        assert_eq!(summary.stints_scored, 1);
        assert_eq!(summary.stints_skipped, 1);
        assert_eq!(summary.karts_queued, 1);
        assert_eq!(summary.queue_evictions, 1);
        assert_eq!(summary.queue_depth, 3);
    }

    #[test]
    fn test_latency_resets_on_report() {
        let metrics = Metrics::new();
        metrics.record_batch(1, Instant::now());
        let _ = metrics.report();

        let summary = metrics.report();
        assert_eq!(summary.avg_batch_latency_us, 0);
        assert_eq!(summary.max_batch_latency_us, 0);
        assert_eq!(summary.batches_total, 1);
    }

    #[test]
    fn test_peek_keeps_latency_window() {
        let metrics = Metrics::new();
        metrics.record_batch(2, Instant::now() - std::time::Duration::from_millis(5));

        assert!(metrics.peek().max_batch_latency_us >= 5_000);
        let summary = metrics.report();
        assert!(summary.max_batch_latency_us >= 5_000);
        assert_eq!(summary.rows_total, 2);
    }

    #[test]
    fn test_atomic_max() {
        let max = AtomicU64::new(10);
        update_atomic_max(&max, 5);
        assert_eq!(max.load(Ordering::Relaxed), 10);
        update_atomic_max(&max, 42);
        assert_eq!(max.load(Ordering::Relaxed), 42);
    }
}
