//! Synthesises a complete Ethernet+IPv4+TCP/UDP response frame from an
//! optional original frame, a response body, and the active `Config`
//! snapshot. Byte-offset construction in the style of a raw frame builder:
//! every field is written at an explicit slice range rather than cast
//! through a packed struct, which keeps this sound in safe Rust.

use crate::checksum;
use crate::config::Config;
use crate::error::EngineError;
use crate::parser::{ParsedFrame, Transport};
use std::net::Ipv4Addr;

const ETH_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// Total wire length of a TCP response frame for a body of `body_len` bytes.
pub fn tcp_response_len(body_len: usize) -> usize {
    ETH_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN + body_len
}

/// Total wire length of a UDP response frame for a body of `body_len` bytes.
pub fn udp_response_len(body_len: usize) -> usize {
    ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN + body_len
}

/// Writes a TCP response directly into `dest`, which must be at least
/// [`tcp_response_len`] bytes. `seq` is the sequence number to emit (the
/// pre-advance snapshot); the caller advances the shared counter by
/// `body.len()` after a successful transmit. Returns the number of bytes
/// written.
pub fn write_tcp_response(
    dest: &mut [u8],
    original: Option<&ParsedFrame<'_>>,
    cfg: &Config,
    seq: u32,
    body: &[u8],
) -> Result<usize, EngineError> {
    if cfg.response_ip.is_unspecified() || cfg.response_port == 0 {
        return Err(EngineError::Config("response_ip/response_port must be set".into()));
    }
    let total_len = IPV4_HEADER_LEN + TCP_HEADER_LEN + body.len();
    let needed = ETH_HEADER_LEN + total_len;
    if dest.len() < needed {
        return Err(EngineError::NoBuffer);
    }
    let frame = &mut dest[..needed];

    let (dst_mac, src_mac) = match original {
        Some(f) => (*f.ethernet.src_mac, *f.ethernet.dst_mac),
        None => ([0u8; 6], [0u8; 6]),
    };

    let (dst_ip, dst_port, ack_seq) = match original {
        Some(f) => {
            let (orig_seq, orig_port, syn, payload_len) = match f.transport {
                Transport::Tcp(tcp) => {
                    (tcp.seq(), tcp.src_port(), tcp.flags().syn, f.payload.len() as u32)
                }
                Transport::Udp(_) => (0, cfg.target_port, false, 0),
            };
            // Redesign: ack must account for the original segment's payload,
            // not unconditionally assume a bare SYN (+1).
            let ack = if syn {
                orig_seq.wrapping_add(payload_len).wrapping_add(1)
            } else {
                orig_seq.wrapping_add(payload_len)
            };
            (f.ip.src(), orig_port, ack)
        }
        None => (cfg.target_ip, cfg.target_port, 0),
    };

    frame[0..6].copy_from_slice(&dst_mac);
    frame[6..12].copy_from_slice(&src_mac);
    frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());

    let ip = &mut frame[ETH_HEADER_LEN..];
    ip[0] = 0x45;
    ip[1] = 0;
    ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    ip[4..6].copy_from_slice(&0u16.to_be_bytes());
    ip[6..8].copy_from_slice(&0x4000u16.to_be_bytes()); // DF
    ip[8] = 64;
    ip[9] = 6;
    ip[10..12].copy_from_slice(&[0, 0]);
    ip[12..16].copy_from_slice(&cfg.response_ip.octets());
    ip[16..20].copy_from_slice(&dst_ip.octets());
    let ip_checksum = checksum::ipv4_header(&ip[..IPV4_HEADER_LEN]);
    ip[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

    let tcp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
    {
        let tcp = &mut frame[tcp_start..];
        tcp[0..2].copy_from_slice(&cfg.response_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&ack_seq.to_be_bytes());
        tcp[12] = 5u8 << 4;
        let ack_flag = if original.is_some() { 0x10 } else { 0 };
        tcp[13] = 0x08 | ack_flag; // PSH, optionally ACK
        tcp[14..16].copy_from_slice(&65535u16.to_be_bytes());
        tcp[16..18].copy_from_slice(&[0, 0]);
        tcp[18..20].copy_from_slice(&[0, 0]);
        tcp[20..20 + body.len()].copy_from_slice(body);
    }

    let tcp_checksum = {
        let segment = &frame[tcp_start..];
        checksum::tcp_ipv4(cfg.response_ip, dst_ip, segment)
    };
    frame[tcp_start + 16..tcp_start + 18].copy_from_slice(&tcp_checksum.to_be_bytes());

    Ok(needed)
}

/// Convenience wrapper over [`write_tcp_response`] that allocates its own
/// buffer. Used by unit tests; the pipeline writes directly into a pooled
/// buffer instead.
pub fn build_tcp_response(
    original: Option<&ParsedFrame<'_>>,
    cfg: &Config,
    seq: u32,
    body: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let mut buf = vec![0u8; tcp_response_len(body.len())];
    let len = write_tcp_response(&mut buf, original, cfg, seq, body)?;
    buf.truncate(len);
    Ok(buf)
}

/// Writes a UDP response directly into `dest`, which must be at least
/// [`udp_response_len`] bytes. Returns the number of bytes written.
pub fn write_udp_response(
    dest: &mut [u8],
    original: Option<&ParsedFrame<'_>>,
    cfg: &Config,
    body: &[u8],
) -> Result<usize, EngineError> {
    if cfg.response_ip.is_unspecified() || cfg.response_port == 0 {
        return Err(EngineError::Config("response_ip/response_port must be set".into()));
    }
    let total_len = IPV4_HEADER_LEN + UDP_HEADER_LEN + body.len();
    let needed = ETH_HEADER_LEN + total_len;
    if dest.len() < needed {
        return Err(EngineError::NoBuffer);
    }
    let frame = &mut dest[..needed];

    let (dst_mac, src_mac) = match original {
        Some(f) => (*f.ethernet.src_mac, *f.ethernet.dst_mac),
        None => ([0u8; 6], [0u8; 6]),
    };

    let (dst_ip, dst_port): (Ipv4Addr, u16) = match original {
        Some(f) => {
            let port = match f.transport {
                Transport::Udp(udp) => udp.src_port(),
                Transport::Tcp(_) => cfg.target_port,
            };
            (f.ip.src(), port)
        }
        None => (cfg.target_ip, cfg.target_port),
    };

    frame[0..6].copy_from_slice(&dst_mac);
    frame[6..12].copy_from_slice(&src_mac);
    frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());

    let ip = &mut frame[ETH_HEADER_LEN..];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    ip[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
    ip[8] = 64;
    ip[9] = 17;
    ip[12..16].copy_from_slice(&cfg.response_ip.octets());
    ip[16..20].copy_from_slice(&dst_ip.octets());
    let ip_checksum = checksum::ipv4_header(&ip[..IPV4_HEADER_LEN]);
    ip[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

    let udp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
    let udp_len = UDP_HEADER_LEN + body.len();
    {
        let udp = &mut frame[udp_start..];
        udp[0..2].copy_from_slice(&cfg.response_port.to_be_bytes());
        udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        udp[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
        // Per §4.6, UDP responses carry checksum=0, matching the original's
        // behavior; unlike the TCP checksum and ack-seq fixes, this is not a
        // flagged redesign.
        udp[6..8].copy_from_slice(&[0, 0]);
        udp[8..8 + body.len()].copy_from_slice(body);
    }

    Ok(needed)
}

/// Convenience wrapper over [`write_udp_response`] that allocates its own
/// buffer. Used by unit tests; the pipeline writes directly into a pooled
/// buffer instead.
pub fn build_udp_response(
    original: Option<&ParsedFrame<'_>>,
    cfg: &Config,
    body: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let mut buf = vec![0u8; udp_response_len(body.len())];
    let len = write_udp_response(&mut buf, original, cfg, body)?;
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn base_config() -> Config {
        Config {
            enabled: true,
            target_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_port: 9000,
            protocol: Protocol::Tcp,
            response_ip: Ipv4Addr::new(10, 0, 0, 2),
            response_port: 9001,
            ..Config::default()
        }
    }

    #[test]
    fn tcp_response_without_original_uses_config_target() {
        let cfg = base_config();
        let frame = build_tcp_response(None, &cfg, 0, b"hi").unwrap();
        assert_eq!(frame.len(), ETH_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN + 2);
        let ip_src = &frame[ETH_HEADER_LEN + 12..ETH_HEADER_LEN + 16];
        assert_eq!(ip_src, &cfg.response_ip.octets());
    }

    #[test]
    fn tcp_checksum_is_nonzero_and_verifies() {
        let cfg = base_config();
        let frame = build_tcp_response(None, &cfg, 0, b"payload").unwrap();
        let tcp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        let checksum_bytes = &frame[tcp_start + 16..tcp_start + 18];
        assert_ne!(checksum_bytes, &[0, 0]);
        let verify = checksum::tcp_ipv4(cfg.response_ip, cfg.target_ip, &frame[tcp_start..]);
        assert_eq!(verify, 0);
    }

    #[test]
    fn ack_seq_accounts_for_payload_length_not_just_plus_one() {
        // Build a fake "original" 20-byte IPv4 + 20-byte TCP (pure data, no
        // SYN) frame with a 10-byte payload and seq=1000, confirm the
        // computed ack is seq + payload_len, not seq + 1.
        let mut eth_ip_tcp = vec![0u8; ETH_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN + 10];
        eth_ip_tcp[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
        let ip = &mut eth_ip_tcp[ETH_HEADER_LEN..];
        ip[0] = 0x45;
        let total = (IPV4_HEADER_LEN + TCP_HEADER_LEN + 10) as u16;
        ip[2..4].copy_from_slice(&total.to_be_bytes());
        ip[9] = 6;
        ip[12..16].copy_from_slice(&[192, 168, 0, 1]);
        ip[16..20].copy_from_slice(&[192, 168, 0, 2]);
        let csum = checksum::ipv4_header(&ip[..IPV4_HEADER_LEN]);
        ip[10..12].copy_from_slice(&csum.to_be_bytes());
        let tcp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        eth_ip_tcp[tcp_start + 4..tcp_start + 8].copy_from_slice(&1000u32.to_be_bytes());
        eth_ip_tcp[tcp_start + 12] = 5 << 4;
        eth_ip_tcp[tcp_start + 13] = 0x18; // PSH+ACK, no SYN

        let parsed = crate::parser::parse(&eth_ip_tcp).expect("valid frame");
        let cfg = base_config();
        let response = build_tcp_response(Some(&parsed), &cfg, 0, b"reply").unwrap();
        let rtcp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        let ack = u32::from_be_bytes(response[rtcp_start + 8..rtcp_start + 12].try_into().unwrap());
        assert_eq!(ack, 1000 + 10);
    }

    #[test]
    fn udp_response_checksum_is_left_zero_per_spec() {
        let mut cfg = base_config();
        cfg.protocol = Protocol::Udp;
        let frame = build_udp_response(None, &cfg, b"abcd").unwrap();
        let udp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        let checksum_bytes = &frame[udp_start + 6..udp_start + 8];
        assert_eq!(checksum_bytes, &[0, 0]);
    }

    #[test]
    fn rejects_unset_response_endpoint() {
        let mut cfg = base_config();
        cfg.response_ip = Ipv4Addr::UNSPECIFIED;
        assert!(build_tcp_response(None, &cfg, 0, b"x").is_err());
    }
}
