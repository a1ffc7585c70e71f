//! Bounded ring of recent per-packet trace events, for programmatic debug
//! consumers. The `tracing` events emitted alongside this are for operators
//! tailing logs; this ring is what the debug surface drains on demand.

use parking_lot::Mutex;
use std::collections::VecDeque;

pub const MAX_EVENTS: usize = 4096;

#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub timestamp_ns: u64,
    pub src_port: u16,
    pub dst_port: u16,
    pub latency_ns: u64,
    pub outcome: &'static str,
}

#[derive(Default)]
struct Inner {
    events: VecDeque<TraceEvent>,
    dropped: u64,
}

#[derive(Default)]
pub struct Telemetry {
    inner: Mutex<Inner>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { events: VecDeque::with_capacity(MAX_EVENTS), dropped: 0 }) }
    }

    pub fn record(&self, event: TraceEvent) {
        let mut inner = self.inner.lock();
        if inner.events.len() >= MAX_EVENTS {
            inner.events.pop_front();
            inner.dropped += 1;
        }
        inner.events.push_back(event);
    }

    /// Drains up to `max` events (oldest first) plus the cumulative dropped
    /// count since the last drain.
    pub fn drain(&self, max: usize) -> (Vec<TraceEvent>, u64) {
        let mut inner = self.inner.lock();
        let n = max.min(inner.events.len());
        let events = inner.events.drain(..n).collect();
        let dropped = inner.dropped;
        inner.dropped = 0;
        (events, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> TraceEvent {
        TraceEvent { timestamp_ns: n, src_port: 1, dst_port: 2, latency_ns: n, outcome: "processed" }
    }

    #[test]
    fn drain_returns_events_in_order() {
        let telemetry = Telemetry::new();
        telemetry.record(event(1));
        telemetry.record(event(2));
        let (events, dropped) = telemetry.drain(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp_ns, 1);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let telemetry = Telemetry::new();
        for i in 0..(MAX_EVENTS as u64 + 5) {
            telemetry.record(event(i));
        }
        let (events, dropped) = telemetry.drain(MAX_EVENTS);
        assert_eq!(dropped, 5);
        assert_eq!(events[0].timestamp_ns, 5);
    }
}
