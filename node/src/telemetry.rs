use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

/// Shared pipeline counters; cheap to clone, updated lock-free.
#[derive(Clone, Debug)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

#[derive(Debug)]
struct TelemetryInner {
    start: Instant,
    orders_submitted: AtomicU64,
    orders_rejected: AtomicU64,
    matches_emitted: AtomicU64,
    proofs_generated: AtomicU64,
    proofs_failed: AtomicU64,
    settlements_confirmed: AtomicU64,
    settlements_failed: AtomicU64,
    subscribers: AtomicU64,
    book_depth: AtomicU64,
    pending_matches: AtomicU64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                start: Instant::now(),
                orders_submitted: AtomicU64::new(0),
                orders_rejected: AtomicU64::new(0),
                matches_emitted: AtomicU64::new(0),
                proofs_generated: AtomicU64::new(0),
                proofs_failed: AtomicU64::new(0),
                settlements_confirmed: AtomicU64::new(0),
                settlements_failed: AtomicU64::new(0),
                subscribers: AtomicU64::new(0),
                book_depth: AtomicU64::new(0),
                pending_matches: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_order(&self, accepted: bool) {
        if accepted {
            self.inner.orders_submitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.orders_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_match(&self) {
        self.inner.matches_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proof(&self, generated: bool) {
        if generated {
            self.inner.proofs_generated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.proofs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_settlement(&self, confirmed: bool) {
        if confirmed {
            self.inner
                .settlements_confirmed
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner
                .settlements_failed
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn subscriber_connected(&self) {
        self.inner.subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_disconnected(&self) {
        let _ = self
            .inner
            .subscribers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            });
    }

    pub fn set_book_depth(&self, depth: usize) {
        self.inner.book_depth.store(depth as u64, Ordering::Relaxed);
    }

    pub fn set_pending_matches(&self, pending: usize) {
        self.inner
            .pending_matches
            .store(pending as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = &self.inner;
        TelemetrySnapshot {
            uptime_secs: inner.start.elapsed().as_secs(),
            orders_submitted: inner.orders_submitted.load(Ordering::Relaxed),
            orders_rejected: inner.orders_rejected.load(Ordering::Relaxed),
            matches_emitted: inner.matches_emitted.load(Ordering::Relaxed),
            proofs_generated: inner.proofs_generated.load(Ordering::Relaxed),
            proofs_failed: inner.proofs_failed.load(Ordering::Relaxed),
            settlements_confirmed: inner.settlements_confirmed.load(Ordering::Relaxed),
            settlements_failed: inner.settlements_failed.load(Ordering::Relaxed),
            subscribers: inner.subscribers.load(Ordering::Relaxed),
            book_depth: inner.book_depth.load(Ordering::Relaxed),
            pending_matches: inner.pending_matches.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub uptime_secs: u64,
    pub orders_submitted: u64,
    pub orders_rejected: u64,
    pub matches_emitted: u64,
    pub proofs_generated: u64,
    pub proofs_failed: u64,
    pub settlements_confirmed: u64,
    pub settlements_failed: u64,
    pub subscribers: u64,
    pub book_depth: u64,
    pub pending_matches: u64,
}
