//! The orchestrator invoked for every ingress frame. Drives parsing,
//! validation, endpoint demultiplexing, connection tracking, application
//! logic, response synthesis, and transmission, and records stats/latency
//! and a structured trace event for each decision.

use crate::app_logic::{AppLogicRegistry, AppOutcome};
use crate::buffer_pool::BufferPool;
use crate::config::{Protocol, SharedConfig};
use crate::conn_tracker::{ConnTracker, FlowKey};
use crate::debug_surface::DebugSurface;
use crate::error::EngineError;
use crate::parser::{self, Transport};
use crate::raw_send::TransmitDevice;
use crate::response_builder;
use crate::stats::Stats;
use crate::telemetry::{TraceEvent, Telemetry};
use crate::validator::{self, RateLimiter};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// What the caller should do with the original frame once `ingest` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the frame back to the normal stack.
    Bypass,
    /// The pipeline took a processing decision; the frame's ownership is
    /// retained and no further action on it is required.
    Stolen,
}

pub struct Pipeline {
    config: SharedConfig,
    stats: Stats,
    conn_tracker: ConnTracker,
    buffer_pool: BufferPool,
    app_logic: AppLogicRegistry,
    device: Arc<dyn TransmitDevice>,
    rate_limiter: RateLimiter,
    debug: DebugSurface,
    telemetry: Telemetry,
}

impl Pipeline {
    pub fn new(device: Arc<dyn TransmitDevice>) -> Self {
        Self {
            config: SharedConfig::default(),
            stats: Stats::default(),
            conn_tracker: ConnTracker::new(),
            buffer_pool: BufferPool::new(),
            app_logic: AppLogicRegistry::new(),
            device,
            rate_limiter: RateLimiter::default_ingress(),
            debug: DebugSurface::new(),
            telemetry: Telemetry::new(),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn conn_tracker(&self) -> &ConnTracker {
        &self.conn_tracker
    }

    pub fn debug(&self) -> &DebugSurface {
        &self.debug
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    fn bypass(&self, counted: bool) -> Decision {
        if counted {
            self.stats.record_bypassed();
        }
        Decision::Bypass
    }

    /// Processes one ingress frame.
    pub fn ingest(&self, frame: &[u8]) -> Decision {
        self.debug.record_interrupt();
        let cfg = self.config.load();
        if !cfg.enabled {
            return self.bypass(true);
        }

        let t0 = Instant::now();

        let parsed = match parser::parse(frame) {
            Ok(p) => p,
            Err(e) => {
                self.stats.record_error();
                if matches!(
                    e,
                    parser::ParseError::BadIpChecksum | parser::ParseError::BadUdpChecksum
                ) {
                    self.debug.record_checksum_error();
                }
                self.debug.record_error(format!("parse error: {e}"));
                return self.bypass(false);
            }
        };

        if !self.rate_limiter.allow() {
            self.stats.record_error();
            self.debug.record_error(EngineError::RateLimited.to_string());
            return self.bypass(false);
        }

        if !validator::structurally_valid(parsed.ip.src(), parsed.ip.total_len()) {
            self.stats.record_error();
            return self.bypass(false);
        }

        let matches_target = parsed.ip.dst() == cfg.target_ip;
        let matches_multicast = cfg.multicast && parsed.ip.dst() == cfg.multicast_group;
        if !matches_target && !matches_multicast {
            return self.bypass(true);
        }

        let outcome = match (cfg.protocol, &parsed.transport) {
            (Protocol::Tcp, Transport::Tcp(tcp)) => {
                if tcp.dst_port() != cfg.target_port {
                    return self.bypass(true);
                }
                let key = FlowKey {
                    src_ip: parsed.ip.src(),
                    dst_ip: parsed.ip.dst(),
                    src_port: tcp.src_port(),
                    dst_port: tcp.dst_port(),
                };
                let flags = tcp.flags();
                match self.conn_tracker.observe(key, flags.syn, flags.ack, tcp.seq(), tcp.ack(), &self.stats) {
                    Ok(chain_len) => {
                        if chain_len > 1 {
                            self.debug.record_cache_miss();
                        }
                    }
                    Err(e) => {
                        self.stats.record_error();
                        self.debug.record_error(format!("conn tracker: {e}"));
                        return self.bypass(false);
                    }
                }
                self.app_logic.dispatch(cfg.app_logic_type, parsed.payload)
            }
            (Protocol::Udp, Transport::Udp(udp)) => {
                if udp.dst_port() != cfg.target_port {
                    return self.bypass(true);
                }
                self.app_logic.dispatch(cfg.app_logic_type, parsed.payload)
            }
            _ => return self.bypass(true),
        };

        let result_label: &'static str = match outcome {
            Ok(AppOutcome::Respond(body)) => match self.transmit_response(&parsed, &cfg, &body) {
                Ok(()) => {
                    self.stats.record_response_sent();
                    "responded"
                }
                Err(e) => {
                    self.stats.record_error();
                    self.debug.record_error(format!("response: {e}"));
                    "response_failed"
                }
            },
            Ok(AppOutcome::Nothing) => "no_response",
            Err(e) => {
                self.stats.record_error();
                self.debug.record_error(format!("app logic: {e}"));
                "app_logic_error"
            }
        };

        self.stats.record_processed();
        let dt = t0.elapsed().as_nanos() as u64;
        self.stats.record_latency(dt);

        let (src_port, dst_port) = match parsed.transport {
            Transport::Tcp(tcp) => (tcp.src_port(), tcp.dst_port()),
            Transport::Udp(udp) => (udp.src_port(), udp.dst_port()),
        };
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.telemetry.record(TraceEvent {
            timestamp_ns: now_ns,
            src_port,
            dst_port,
            latency_ns: dt,
            outcome: result_label,
        });
        tracing::trace!(src_port, dst_port, latency_ns = dt, outcome = result_label, "ingress frame processed");

        Decision::Stolen
    }

    fn transmit_response(
        &self,
        parsed: &parser::ParsedFrame<'_>,
        cfg: &crate::config::Config,
        body: &[u8],
    ) -> Result<(), EngineError> {
        let needed = match cfg.protocol {
            Protocol::Tcp => response_builder::tcp_response_len(body.len()),
            Protocol::Udp => response_builder::udp_response_len(body.len()),
        };
        if needed > crate::buffer_pool::BUFFER_SIZE {
            return Err(EngineError::NoBuffer);
        }

        // The sequence number for this segment is the current snapshot, not
        // an advanced one: §4.6 only requires the counter to move forward
        // after a transmit actually succeeds, so we must not mutate it here.
        let seq = self.config.seq_num();

        let mut write_into = |dest: &mut [u8]| match cfg.protocol {
            Protocol::Tcp => response_builder::write_tcp_response(dest, Some(parsed), cfg, seq, body),
            Protocol::Udp => response_builder::write_udp_response(dest, Some(parsed), cfg, body),
        };

        let frame_bytes = match self.buffer_pool.acquire() {
            Some(mut pooled) => {
                let len = write_into(&mut pooled)?;
                let mut owned = pooled.into_inner();
                owned.truncate(len);
                owned
            }
            None => {
                self.debug.record_allocation();
                let mut fallback = vec![0u8; needed];
                let len = write_into(&mut fallback)?;
                fallback.truncate(len);
                fallback
            }
        };

        self.device.enqueue(frame_bytes).map_err(|e| {
            self.debug.record_queue_full();
            e
        })?;

        if matches!(cfg.protocol, Protocol::Tcp) {
            self.config.advance_seq(body.len() as u32);
        }
        Ok(())
    }
}
