//! Ingress admission control: a leaky-bucket rate limiter plus a handful of
//! cheap structural checks that don't belong in the parser because they are
//! policy, not wire-format validity.

use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// A single global leaky bucket. Refills continuously at `capacity / window`
/// and is drained by one token per admitted event.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        let refill_per_sec = capacity as f64 / window.as_secs_f64();
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            capacity: capacity as f64,
            refill_per_sec,
        }
    }

    /// Default admission bucket: ~20 events per 5 seconds.
    pub fn default_ingress() -> Self {
        Self::new(20, Duration::from_secs(5))
    }

    /// Attempts to consume one token. Returns `true` if admitted.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Structural admission checks beyond what the parser already enforces:
/// rejects a zero source address and frames with less than a full IPv4
/// header worth of declared length.
pub fn structurally_valid(src_ip: Ipv4Addr, ip_total_len: u16) -> bool {
    !src_ip.is_unspecified() && ip_total_len as usize >= 20
}

/// Decides whether the caller of a mutating control-plane command holds
/// network-administration privilege. The default implementation treats the
/// running process's effective uid 0 as sufficient, mirroring the original
/// `capable(CAP_NET_ADMIN)` check as closely as a portable userspace
/// predicate can; it is injectable so tests can force either answer.
pub trait PrivilegeCheck: Send + Sync {
    fn has_admin_privilege(&self) -> bool;
}

#[cfg(unix)]
pub struct UidPrivilegeCheck;

#[cfg(unix)]
impl PrivilegeCheck for UidPrivilegeCheck {
    fn has_admin_privilege(&self) -> bool {
        // Safety: geteuid takes no arguments and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
}

#[cfg(not(unix))]
pub struct UidPrivilegeCheck;

#[cfg(not(unix))]
impl PrivilegeCheck for UidPrivilegeCheck {
    fn has_admin_privilege(&self) -> bool {
        false
    }
}

#[cfg(test)]
struct FixedPrivilege(bool);

#[cfg(test)]
impl PrivilegeCheck for FixedPrivilege {
    fn has_admin_privilege(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_check_is_injectable_for_tests() {
        assert!(FixedPrivilege(true).has_admin_privilege());
        assert!(!FixedPrivilege(false).has_admin_privilege());
    }

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3600));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow());
    }

    #[test]
    fn rejects_zero_source() {
        assert!(!structurally_valid(Ipv4Addr::UNSPECIFIED, 40));
    }

    #[test]
    fn rejects_undersized_total_len() {
        assert!(!structurally_valid(Ipv4Addr::new(1, 2, 3, 4), 10));
    }
}
