//! Fixed-size TCP connection table. 1,024 buckets behind a single coarse
//! guard; each bucket is the idiomatic Rust equivalent of the original's
//! intrusive hlist chain. Hot path cost is one `jhash_3words` call plus a
//! short, bounded bucket walk.

use crate::error::EngineError;
use crate::jhash::jhash_3words;
use crate::stats::Stats;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

pub const BUCKET_COUNT: usize = 1024;
const MAX_CHAIN_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    SynSent,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Clone)]
pub struct Conn {
    pub key: FlowKey,
    pub state: ConnState,
    pub seq: u32,
    pub ack: u32,
    pub last_seen: Instant,
}

fn bucket_index(key: &FlowKey) -> usize {
    let src = u32::from(key.src_ip);
    let dst = u32::from(key.dst_ip);
    let ports = ((key.src_port as u32) << 16) | key.dst_port as u32;
    (jhash_3words(src, dst, ports, 0) as usize) % BUCKET_COUNT
}

pub struct ConnTracker {
    buckets: Vec<Mutex<Vec<Conn>>>,
}

impl ConnTracker {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for _ in 0..BUCKET_COUNT {
            buckets.push(Mutex::new(Vec::new()));
        }
        Self { buckets }
    }

    /// Observes one TCP segment. Creates a new record on a pure SYN,
    /// refreshes an existing match, and transitions to `Established` on a
    /// SYN+ACK. Returns `UntrackedSegment` for anything else that doesn't
    /// match a tracked flow. On success, returns the bucket's chain length
    /// at the time of the walk, so callers can account a cache-miss proxy
    /// for chains longer than a single entry.
    pub fn observe(
        &self,
        key: FlowKey,
        syn: bool,
        ack: bool,
        seq: u32,
        ack_num: u32,
        stats: &Stats,
    ) -> Result<usize, EngineError> {
        let idx = bucket_index(&key);
        let mut bucket = self.buckets[idx].lock();
        let chain_len = bucket.len();
        if let Some(conn) = bucket.iter_mut().find(|c| c.key == key) {
            conn.last_seen = Instant::now();
            if syn && !ack {
                conn.state = ConnState::SynSent;
            } else if syn && ack {
                conn.state = ConnState::Established;
                conn.seq = seq;
                conn.ack = ack_num;
            }
            return Ok(chain_len);
        }

        if syn && !ack {
            if bucket.len() >= MAX_CHAIN_LEN {
                return Err(EngineError::OutOfMemory);
            }
            bucket.push(Conn {
                key,
                state: ConnState::SynSent,
                seq,
                ack: ack_num,
                last_seen: Instant::now(),
            });
            stats.record_connection_opened();
            return Ok(chain_len);
        }

        Err(EngineError::UntrackedSegment)
    }

    /// Drains every bucket unconditionally.
    pub fn flush_all(&self, stats: &Stats) {
        for bucket in &self.buckets {
            let mut guard = bucket.lock();
            let drained = guard.len();
            guard.clear();
            for _ in 0..drained {
                stats.record_connection_closed();
            }
        }
    }

    /// Evicts only the records whose `last_seen` is older than `threshold`.
    /// Never invoked from the fast path.
    pub fn reap_idle(&self, threshold: Duration, stats: &Stats) {
        let now = Instant::now();
        for bucket in &self.buckets {
            let mut guard = bucket.lock();
            let before = guard.len();
            guard.retain(|c| now.duration_since(c.last_seen) < threshold);
            let evicted = before - guard.len();
            for _ in 0..evicted {
                stats.record_connection_closed();
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }
}

impl Default for ConnTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: u8, b: u8, sp: u16, dp: u16) -> FlowKey {
        FlowKey {
            src_ip: Ipv4Addr::new(10, 0, 0, a),
            dst_ip: Ipv4Addr::new(10, 0, 0, b),
            src_port: sp,
            dst_port: dp,
        }
    }

    #[test]
    fn pure_syn_creates_a_record() {
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        tracker.observe(key(1, 2, 1000, 80), true, false, 5, 0, &stats).unwrap();
        assert_eq!(tracker.active_count(), 1);
        assert_eq!(stats.snapshot().connections_active, 1);
    }

    #[test]
    fn chain_length_reflects_bucket_occupancy_before_the_walk() {
        // Two flows that happen to land in the same bucket report a chain
        // length > 0 on the second observation, which the pipeline uses as a
        // cache-miss proxy. We can't force a collision deterministically
        // without reaching into the hash, so instead we check the simpler
        // invariant: the very first SYN into an empty bucket always reports
        // chain length 0.
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        let chain_len = tracker.observe(key(1, 2, 1000, 80), true, false, 5, 0, &stats).unwrap();
        assert_eq!(chain_len, 0);
    }

    #[test]
    fn syn_ack_transitions_existing_record() {
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        let k = key(1, 2, 1000, 80);
        tracker.observe(k, true, false, 5, 0, &stats).unwrap();
        tracker.observe(k, true, true, 100, 6, &stats).unwrap();
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn untracked_segment_without_syn_is_rejected() {
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        let result = tracker.observe(key(9, 9, 1, 2), false, true, 0, 0, &stats);
        assert_eq!(result, Err(EngineError::UntrackedSegment));
    }

    #[test]
    fn flush_all_clears_every_bucket_and_updates_stats() {
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        tracker.observe(key(1, 2, 1, 2), true, false, 0, 0, &stats).unwrap();
        tracker.observe(key(3, 4, 5, 6), true, false, 0, 0, &stats).unwrap();
        tracker.flush_all(&stats);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(stats.snapshot().connections_dropped, 2);
    }

    #[test]
    fn reap_idle_only_evicts_old_records() {
        let tracker = ConnTracker::new();
        let stats = Stats::default();
        tracker.observe(key(1, 2, 1, 2), true, false, 0, 0, &stats).unwrap();
        tracker.reap_idle(Duration::from_secs(3600), &stats);
        assert_eq!(tracker.active_count(), 1);
        tracker.reap_idle(Duration::from_nanos(0), &stats);
        assert_eq!(tracker.active_count(), 0);
    }
}
