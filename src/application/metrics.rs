//! Counters describing what the capture pipeline did.
//!
//! The pipeline never raises past its boundary, so these counters are the
//! only trace of swallowed delivery and storage failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline metrics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    processed: AtomicU64,
    suppressed: AtomicU64,
    duplicates: AtomicU64,
    logged: AtomicU64,
    notifications_sent: AtomicU64,
    delivery_failures: AtomicU64,
    store_failures: AtomicU64,
    signatures_evicted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_processed(&self) {
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.inner.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_logged(&self) {
        self.inner.logged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.inner.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self) {
        self.inner.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.inner
                .signatures_evicted
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Records that entered `process`.
    pub fn processed(&self) -> u64 {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// Records that were suppressed (ambient flag, filter or observer).
    pub fn suppressed(&self) -> u64 {
        self.inner.suppressed.load(Ordering::Relaxed)
    }

    /// Records dropped because their signature was already reported.
    pub fn duplicates(&self) -> u64 {
        self.inner.duplicates.load(Ordering::Relaxed)
    }

    /// Entries written to the log artifact.
    pub fn logged(&self) -> u64 {
        self.inner.logged.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.inner.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.inner.delivery_failures.load(Ordering::Relaxed)
    }

    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    pub fn signatures_evicted(&self) -> u64 {
        self.inner.signatures_evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed(),
            suppressed: self.suppressed(),
            duplicates: self.duplicates(),
            logged: self.logged(),
            notifications_sent: self.notifications_sent(),
            delivery_failures: self.delivery_failures(),
            store_failures: self.store_failures(),
            signatures_evicted: self.signatures_evicted(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.processed,
            &inner.suppressed,
            &inner.duplicates,
            &inner.logged,
            &inner.notifications_sent,
            &inner.delivery_failures,
            &inner.store_failures,
            &inner.signatures_evicted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub suppressed: u64,
    pub duplicates: u64,
    pub logged: u64,
    pub notifications_sent: u64,
    pub delivery_failures: u64,
    pub store_failures: u64,
    pub signatures_evicted: u64,
}

impl MetricsSnapshot {
    /// Share of processed records that were suppressed (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been processed.
    pub fn suppression_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.suppressed as f64 / self.processed as f64
        }
    }

    /// Whether any failure was swallowed.
    pub fn has_failures(&self) -> bool {
        self.delivery_failures > 0 || self.store_failures > 0
    }
}
