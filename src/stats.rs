//! Process-wide atomic counters and latency accounting. Every field is
//! updated without a guard from any thread; min/max use CAS loops and the
//! running average is derived from a monotonic sum/count pair rather than
//! recomputed in place, so no reader ever observes a torn value.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy)]
pub struct StatsSnapshot {
    pub packets_processed: u64,
    pub packets_bypassed: u64,
    pub responses_sent: u64,
    pub errors: u64,
    pub connections_active: u64,
    pub connections_dropped: u64,
    pub last_latency_ns: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub avg_latency_ns: u64,
}

pub struct Stats {
    packets_processed: AtomicU64,
    packets_bypassed: AtomicU64,
    responses_sent: AtomicU64,
    errors: AtomicU64,
    connections_active: AtomicU64,
    connections_dropped: AtomicU64,
    last_latency_ns: AtomicU64,
    min_latency_ns: AtomicU64,
    max_latency_ns: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_count: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            packets_processed: AtomicU64::new(0),
            packets_bypassed: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_dropped: AtomicU64::new(0),
            last_latency_ns: AtomicU64::new(0),
            min_latency_ns: AtomicU64::new(u64::MAX),
            max_latency_ns: AtomicU64::new(0),
            latency_sum_ns: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

/// Races a compare-and-swap against `update` until it wins or `update`
/// itself stops changing the stored value.
fn cas_loop(cell: &AtomicU64, update: impl Fn(u64) -> u64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let proposed = update(current);
        if proposed == current {
            return;
        }
        match cell.compare_exchange_weak(
            current,
            proposed,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

impl Stats {
    pub fn record_processed(&self) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypassed(&self) {
        self.packets_bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
        self.connections_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one sample of end-to-end processing latency.
    pub fn record_latency(&self, ns: u64) {
        self.last_latency_ns.store(ns, Ordering::Relaxed);
        cas_loop(&self.min_latency_ns, |cur| ns.min(cur));
        cas_loop(&self.max_latency_ns, |cur| ns.max(cur));
        self.latency_sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_ns.load(Ordering::Relaxed);
        let min = self.min_latency_ns.load(Ordering::Relaxed);
        StatsSnapshot {
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            packets_bypassed: self.packets_bypassed.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_dropped: self.connections_dropped.load(Ordering::Relaxed),
            last_latency_ns: self.last_latency_ns.load(Ordering::Relaxed),
            min_latency_ns: if min == u64::MAX { 0 } else { min },
            max_latency_ns: self.max_latency_ns.load(Ordering::Relaxed),
            avg_latency_ns: if count == 0 { 0 } else { sum / count },
        }
    }

    pub fn reset(&self) {
        self.packets_processed.store(0, Ordering::Relaxed);
        self.packets_bypassed.store(0, Ordering::Relaxed);
        self.responses_sent.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.connections_active.store(0, Ordering::Relaxed);
        self.connections_dropped.store(0, Ordering::Relaxed);
        self.last_latency_ns.store(0, Ordering::Relaxed);
        self.min_latency_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_latency_ns.store(0, Ordering::Relaxed);
        self.latency_sum_ns.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_tracks_min_max_and_average() {
        let stats = Stats::default();
        stats.record_latency(100);
        stats.record_latency(50);
        stats.record_latency(150);
        let snap = stats.snapshot();
        assert_eq!(snap.last_latency_ns, 150);
        assert_eq!(snap.min_latency_ns, 50);
        assert_eq!(snap.max_latency_ns, 150);
        assert_eq!(snap.avg_latency_ns, 100);
    }

    #[test]
    fn reset_restores_defaults() {
        let stats = Stats::default();
        stats.record_processed();
        stats.record_latency(42);
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.packets_processed, 0);
        assert_eq!(snap.min_latency_ns, 0);
    }

    #[test]
    fn connection_accounting_matches_active_and_dropped() {
        let stats = Stats::default();
        stats.record_connection_opened();
        stats.record_connection_opened();
        stats.record_connection_closed();
        let snap = stats.snapshot();
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.connections_dropped, 1);
    }
}
