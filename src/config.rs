//! Process-wide mutable record. The fast path only ever observes an
//! immutable snapshot obtained from [`SharedConfig::load`]; the control
//! plane is the only writer, and it publishes a whole new snapshot with
//! [`SharedConfig::store`] rather than mutating fields in place.

use crate::error::EngineError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Protocol {
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub enabled: bool,
    pub target_ip: Ipv4Addr,
    pub target_port: u16,
    pub protocol: Protocol,
    pub response_ip: Ipv4Addr,
    pub response_port: u16,
    pub app_logic_type: u8,
    pub multicast: bool,
    pub multicast_group: Ipv4Addr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            target_ip: Ipv4Addr::UNSPECIFIED,
            target_port: 0,
            protocol: Protocol::Udp,
            response_ip: Ipv4Addr::UNSPECIFIED,
            response_port: 0,
            app_logic_type: 0,
            multicast: false,
            multicast_group: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl Config {
    /// Validates the invariants an enabled configuration must hold. A
    /// disabled configuration is always valid (it bypasses every frame).
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.enabled {
            return Ok(());
        }
        if self.target_ip.is_unspecified() {
            return Err(EngineError::Config("target_ip must not be 0.0.0.0".into()));
        }
        if self.target_port == 0 {
            return Err(EngineError::Config("target_port must not be 0".into()));
        }
        if self.response_ip.is_unspecified() {
            return Err(EngineError::Config("response_ip must not be 0.0.0.0".into()));
        }
        if self.response_port == 0 {
            return Err(EngineError::Config("response_port must not be 0".into()));
        }
        if self.multicast && !self.multicast_group.is_multicast() {
            return Err(EngineError::Config(
                "multicast_group must be a valid IPv4 multicast address".into(),
            ));
        }
        Ok(())
    }
}

/// The atomically-published `Config` snapshot plus the one piece of
/// fast-path-mutated state that would be wasteful to republish a whole
/// snapshot for: the outgoing TCP sequence number.
pub struct SharedConfig {
    current: ArcSwap<Config>,
    seq_num: AtomicU32,
}

impl SharedConfig {
    pub fn new(initial: Config) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            seq_num: AtomicU32::new(0),
        }
    }

    pub fn load(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Validates and publishes a new configuration. Rejects (without
    /// mutating anything) if the candidate fails [`Config::validate`].
    pub fn store(&self, next: Config) -> Result<(), EngineError> {
        next.validate()?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    pub fn seq_num(&self) -> u32 {
        self.seq_num.load(Ordering::Relaxed)
    }

    /// Advances the sequence counter by `delta`, returning the value to use
    /// for the segment just transmitted (the pre-advance value).
    pub fn advance_seq(&self, delta: u32) -> u32 {
        self.seq_num.fetch_add(delta, Ordering::Relaxed)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_is_always_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn enabled_config_rejects_zero_target() {
        let cfg = Config { enabled: true, ..Config::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn enabled_config_rejects_non_multicast_group_when_multicast_set() {
        let cfg = Config {
            enabled: true,
            target_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_port: 9000,
            response_ip: Ipv4Addr::new(10, 0, 0, 2),
            response_port: 9001,
            multicast: true,
            multicast_group: Ipv4Addr::new(10, 0, 0, 3),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn store_rejects_invalid_and_keeps_previous() {
        let shared = SharedConfig::default();
        let bad = Config { enabled: true, ..Config::default() };
        assert!(shared.store(bad).is_err());
        assert!(!shared.load().enabled);
    }

    #[test]
    fn advance_seq_is_monotonic() {
        let shared = SharedConfig::default();
        let first = shared.advance_seq(10);
        let second = shared.advance_seq(5);
        assert_eq!(first, 0);
        assert_eq!(second, 10);
        assert_eq!(shared.seq_num(), 15);
    }
}
