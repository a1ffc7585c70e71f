//! Cumulative debug counters and a rate-limited last-error string — the
//! userspace counterpart to the original's debugfs surface.

use crate::validator::RateLimiter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct DebugCounters {
    pub total_interrupts: u64,
    pub cache_misses: u64,
    pub memory_allocations: u64,
    pub queue_full_events: u64,
    pub checksum_errors: u64,
}

pub struct DebugSurface {
    total_interrupts: AtomicU64,
    cache_misses: AtomicU64,
    memory_allocations: AtomicU64,
    queue_full_events: AtomicU64,
    checksum_errors: AtomicU64,
    error_rate_limiter: RateLimiter,
    last_error: Mutex<Option<String>>,
}

impl DebugSurface {
    pub fn new() -> Self {
        Self {
            total_interrupts: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            memory_allocations: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            checksum_errors: AtomicU64::new(0),
            error_rate_limiter: RateLimiter::new(20, Duration::from_secs(5)),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_interrupt(&self) {
        self.total_interrupts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation(&self) {
        self.memory_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_full(&self) {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checksum_error(&self) {
        self.checksum_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an error message, subject to its own rate limit independent
    /// of the fast-path admission bucket.
    pub fn record_error(&self, message: impl Into<String>) {
        if !self.error_rate_limiter.allow() {
            return;
        }
        let ts_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        *self.last_error.lock() = Some(format!("[{ts_ns}] {}", message.into()));
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn counters(&self) -> DebugCounters {
        DebugCounters {
            total_interrupts: self.total_interrupts.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            memory_allocations: self.memory_allocations.load(Ordering::Relaxed),
            queue_full_events: self.queue_full_events.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for DebugSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Pretty-printed debug text, matching the original's debugfs layout.
pub fn render(counters: &DebugCounters, last_error: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("ull-fastpath debug counters\n");
    out.push_str("----------------------------\n");
    out.push_str(&format!("total_interrupts:   {}\n", counters.total_interrupts));
    out.push_str(&format!("cache_misses:       {}\n", counters.cache_misses));
    out.push_str(&format!("memory_allocations: {}\n", counters.memory_allocations));
    out.push_str(&format!("queue_full_events:  {}\n", counters.queue_full_events));
    out.push_str(&format!("checksum_errors:    {}\n", counters.checksum_errors));
    out.push_str(&format!("last_error:         {}\n", last_error.unwrap_or("none")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let surface = DebugSurface::new();
        surface.record_interrupt();
        surface.record_checksum_error();
        surface.record_checksum_error();
        let counters = surface.counters();
        assert_eq!(counters.total_interrupts, 1);
        assert_eq!(counters.checksum_errors, 2);
        assert_eq!(counters.cache_misses, 0);
    }

    #[test]
    fn last_error_is_stamped_and_rate_limited() {
        let surface = DebugSurface::new();
        for _ in 0..25 {
            surface.record_error("boom");
        }
        let message = surface.last_error().unwrap();
        assert!(message.contains("boom"));
    }

    #[test]
    fn render_includes_all_fields() {
        let counters = DebugCounters { total_interrupts: 5, ..Default::default() };
        let text = render(&counters, Some("oops"));
        assert!(text.contains("total_interrupts:   5"));
        assert!(text.contains("oops"));
    }
}
