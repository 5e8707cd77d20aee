//! Lock-free dashboard counters and periodic reporting
//!
//! Counters are statistical only. All atomics use Relaxed ordering; nothing
//! in the dashboard makes decisions from them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Fetch latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, >10000
pub const FETCH_BUCKET_BOUNDS_MS: [u64; 8] = [50, 100, 250, 500, 1000, 2500, 5000, 10000];
pub const FETCH_NUM_BUCKETS: usize = 9;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    FETCH_BUCKET_BOUNDS_MS.partition_point(|&bound| bound < latency_ms)
}

#[derive(Debug)]
pub struct Metrics {
    polls_issued: AtomicU64,
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    stale_discarded: AtomicU64,
    backfills_applied: AtomicU64,
    submissions_ok: AtomicU64,
    submissions_failed: AtomicU64,
    portal_ok: AtomicU64,
    portal_failed: AtomicU64,
    buzzer_ok: AtomicU64,
    buzzer_failed: AtomicU64,
    captures_ok: AtomicU64,
    captures_failed: AtomicU64,
    fetch_buckets: [AtomicU64; FETCH_NUM_BUCKETS],
    fetch_latency_sum_ms: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot taken by `report()`; interval counters reset on every report
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub polls_issued: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub stale_discarded: u64,
    pub backfills_applied: u64,
    pub submissions_ok: u64,
    pub submissions_failed: u64,
    pub portal_ok: u64,
    pub portal_failed: u64,
    pub buzzer_ok: u64,
    pub buzzer_failed: u64,
    pub captures_ok: u64,
    pub captures_failed: u64,
    pub fetch_buckets: [u64; FETCH_NUM_BUCKETS],
    pub avg_fetch_ms: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            polls_issued: AtomicU64::new(0),
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            stale_discarded: AtomicU64::new(0),
            backfills_applied: AtomicU64::new(0),
            submissions_ok: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            portal_ok: AtomicU64::new(0),
            portal_failed: AtomicU64::new(0),
            buzzer_ok: AtomicU64::new(0),
            buzzer_failed: AtomicU64::new(0),
            captures_ok: AtomicU64::new(0),
            captures_failed: AtomicU64::new(0),
            fetch_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            fetch_latency_sum_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_poll_issued(&self) {
        self.polls_issued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_poll_ok(&self, latency_ms: u64) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.fetch_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.fetch_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_poll_failed(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backfill(&self) {
        self.backfills_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_submission(&self, ok: bool) {
        let counter = if ok { &self.submissions_ok } else { &self.submissions_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_portal(&self, ok: bool) {
        let counter = if ok { &self.portal_ok } else { &self.portal_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_buzzer(&self, ok: bool) {
        let counter = if ok { &self.buzzer_ok } else { &self.buzzer_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capture(&self, ok: bool) {
        let counter = if ok { &self.captures_ok } else { &self.captures_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn polls_issued(&self) -> u64 {
        self.polls_issued.load(Ordering::Relaxed)
    }

    /// Swap interval counters to zero and return a summary
    pub fn report(&self) -> MetricsSummary {
        let take = |counter: &AtomicU64| counter.swap(0, Ordering::Relaxed);

        let mut fetch_buckets = [0u64; FETCH_NUM_BUCKETS];
        for (i, bucket) in self.fetch_buckets.iter().enumerate() {
            fetch_buckets[i] = take(bucket);
        }
        let polls_ok = take(&self.polls_ok);
        let latency_sum = take(&self.fetch_latency_sum_ms);

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            polls_issued: take(&self.polls_issued),
            polls_ok,
            polls_failed: take(&self.polls_failed),
            stale_discarded: take(&self.stale_discarded),
            backfills_applied: take(&self.backfills_applied),
            submissions_ok: take(&self.submissions_ok),
            submissions_failed: take(&self.submissions_failed),
            portal_ok: take(&self.portal_ok),
            portal_failed: take(&self.portal_failed),
            buzzer_ok: take(&self.buzzer_ok),
            buzzer_failed: take(&self.buzzer_failed),
            captures_ok: take(&self.captures_ok),
            captures_failed: take(&self.captures_failed),
            fetch_buckets,
            avg_fetch_ms: if polls_ok > 0 { latency_sum / polls_ok } else { 0 },
        }
    }
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            polls_issued = %self.polls_issued,
            polls_ok = %self.polls_ok,
            polls_failed = %self.polls_failed,
            stale_discarded = %self.stale_discarded,
            backfills = %self.backfills_applied,
            avg_fetch_ms = %self.avg_fetch_ms,
            submissions_ok = %self.submissions_ok,
            submissions_failed = %self.submissions_failed,
            portal_ok = %self.portal_ok,
            portal_failed = %self.portal_failed,
            buzzer_ok = %self.buzzer_ok,
            buzzer_failed = %self.buzzer_failed,
            captures_failed = %self.captures_failed,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(10_000), 7);
        assert_eq!(bucket_index(60_000), 8);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();
        metrics.record_poll_issued();
        metrics.record_poll_issued();
        metrics.record_poll_ok(120);
        metrics.record_poll_ok(80);
        metrics.record_poll_failed();
        metrics.record_portal(false);

        let summary = metrics.report();
        assert_eq!(summary.polls_issued, 2);
        assert_eq!(summary.polls_ok, 2);
        assert_eq!(summary.polls_failed, 1);
        assert_eq!(summary.portal_failed, 1);
        assert_eq!(summary.avg_fetch_ms, 100);
        assert_eq!(summary.fetch_buckets[1], 1);
        assert_eq!(summary.fetch_buckets[2], 1);

        let next = metrics.report();
        assert_eq!(next.polls_issued, 0);
        assert_eq!(next.avg_fetch_ms, 0);
    }
}
