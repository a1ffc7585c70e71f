//! Transmit-side device abstraction. The always-available implementation is
//! an in-memory outbound ring an embedder drains; the optional `raw-socket`
//! feature adds a real `AF_PACKET` transmit device on Linux.

use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub const RING_CAPACITY: usize = 1024;

/// A device the pipeline can hand a finished frame to. Enqueue never blocks.
pub trait TransmitDevice: Send + Sync {
    fn enqueue(&self, frame: Vec<u8>) -> Result<(), EngineError>;
}

/// Default transmit device: a bounded in-memory ring. What the test suite
/// and non-Linux hosts use, and what a Linux deployment drains into a real
/// socket via a small adapter if `raw-socket` isn't enabled.
pub struct RingTransmitDevice {
    outbound: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl RingTransmitDevice {
    pub fn new(capacity: usize) -> Self {
        Self { outbound: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn drain(&self, max: usize) -> Vec<Vec<u8>> {
        let mut guard = self.outbound.lock();
        let n = max.min(guard.len());
        guard.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.outbound.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RingTransmitDevice {
    fn default() -> Self {
        Self::new(RING_CAPACITY)
    }
}

impl TransmitDevice for RingTransmitDevice {
    fn enqueue(&self, frame: Vec<u8>) -> Result<(), EngineError> {
        let mut guard = self.outbound.lock();
        if guard.len() >= self.capacity {
            return Err(EngineError::TransmitFailed);
        }
        guard.push_back(frame);
        Ok(())
    }
}

#[cfg(feature = "raw-socket")]
pub mod af_packet {
    use super::*;
    use std::os::unix::io::RawFd;

    /// A real `AF_PACKET` transmit socket bound to an interface index. Not
    /// exercised by the test suite (it requires `CAP_NET_RAW` and a live
    /// interface); the in-memory ring is what tests and non-Linux hosts use.
    pub struct AfPacketDevice {
        fd: RawFd,
        ifindex: libc::c_int,
    }

    impl AfPacketDevice {
        /// Opens a raw packet socket and binds it to `ifindex`. Requires
        /// `CAP_NET_RAW`.
        pub fn bind(ifindex: libc::c_int) -> Result<Self, EngineError> {
            // Safety: AF_PACKET/SOCK_RAW/ETH_P_ALL is a standard raw-socket
            // open; the returned fd is checked for failure before use.
            let fd = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_RAW,
                    (libc::ETH_P_ALL as u16).to_be() as libc::c_int,
                )
            };
            if fd < 0 {
                return Err(EngineError::NoDevice);
            }

            let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
            addr.sll_ifindex = ifindex;

            // Safety: `addr` is a validly initialized sockaddr_ll of the
            // correct size for `bind`.
            let rc = unsafe {
                libc::bind(
                    fd,
                    &addr as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_ll>() as u32,
                )
            };
            if rc < 0 {
                // Safety: fd was just opened by us and is still valid.
                unsafe { libc::close(fd) };
                return Err(EngineError::NoDevice);
            }

            Ok(Self { fd, ifindex })
        }
    }

    impl Drop for AfPacketDevice {
        fn drop(&mut self) {
            // Safety: fd is owned exclusively by this struct.
            unsafe {
                libc::close(self.fd);
            }
        }
    }

    impl TransmitDevice for AfPacketDevice {
        fn enqueue(&self, frame: Vec<u8>) -> Result<(), EngineError> {
            // Safety: `frame` is a valid, live byte buffer for the duration
            // of the call; `send` does not retain the pointer afterward.
            let rc = unsafe {
                libc::send(
                    self.fd,
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    0,
                )
            };
            if rc < 0 || rc as usize != frame.len() {
                return Err(EngineError::TransmitFailed);
            }
            Ok(())
        }
    }

    // Silences "field never read" in configurations that only construct and
    // immediately transmit through an AfPacketDevice.
    impl AfPacketDevice {
        pub fn ifindex(&self) -> libc::c_int {
            self.ifindex
        }
    }
}
