//! Filtered reply capture over pcap.
//!
//! One capture per scan, pinned to the target host and the scan's magic
//! source port, so nothing but our own replies ever reaches userspace. Reads
//! are nonblocking and polled against a per-call deadline, which is how the
//! driver interleaves bounded sniff passes between sends.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use pcap::{Active, Capture, Device};
use tracing::{debug, warn};

use crate::error::PacketError;
use crate::traits::FrameSource;

/// BPF filter for one scan: TCP from the target to our magic port.
pub fn reply_filter(dst: IpAddr, magic_port: u16) -> String {
    format!("tcp and src host {dst} and dst port {magic_port}")
}

pub struct ReplyCapture {
    cap: Capture<Active>,
    datalink_len: usize,
    source: IpAddr,
}

impl ReplyCapture {
    /// Open a capture for replies from `dst`. The routing lookup that picks
    /// the capture device also yields the local source address, which the
    /// caller needs for packet construction.
    pub fn open(dst: IpAddr, magic_port: u16) -> Result<Self, PacketError> {
        let source = routed_source(dst)?;
        let device = device_for(source)?;
        debug!(device = %device.name, source = %source, "opening reply capture");

        let mut cap = Capture::from_device(device)
            .map_err(|e| PacketError::CaptureSetup(e.to_string()))?
            .promisc(false)
            .snaplen(256)
            .timeout(10)
            .immediate_mode(true)
            .open()
            .map_err(|e| PacketError::CaptureSetup(e.to_string()))?;

        let filter = reply_filter(dst, magic_port);
        cap.filter(&filter, true)
            .map_err(|e| PacketError::CaptureSetup(format!("BPF filter error: {e}")))?;

        let datalink_len = datalink_header_len(cap.get_datalink().0);
        let cap = cap
            .setnonblock()
            .map_err(|e| PacketError::CaptureSetup(e.to_string()))?;

        Ok(Self {
            cap,
            datalink_len,
            source,
        })
    }

    /// Local address routing chose for the target.
    pub fn source_addr(&self) -> IpAddr {
        self.source
    }
}

impl FrameSource for ReplyCapture {
    fn next_frame(&mut self, deadline: Duration) -> Option<Vec<u8>> {
        let deadline_at = Instant::now() + deadline;
        loop {
            match self.cap.next_packet() {
                Ok(packet) => return Some(packet.data.to_vec()),
                Err(pcap::Error::TimeoutExpired) => {
                    if Instant::now() >= deadline_at {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    warn!(error = %e, "capture read failed");
                    return None;
                }
            }
        }
    }

    fn datalink_len(&self) -> usize {
        self.datalink_len
    }
}

/// Link-layer header length by DLT number.
fn datalink_header_len(dlt: i32) -> usize {
    match dlt {
        0 | 108 => 4,  // DLT_NULL, DLT_LOOP
        1 => 14,       // DLT_EN10MB
        12 | 101 => 0, // DLT_RAW (platform-dependent numbering)
        113 => 16,     // DLT_LINUX_SLL
        _ => {
            warn!(dlt, "unknown datalink type, assuming Ethernet framing");
            14
        }
    }
}

/// Ask the routing table which local address reaches `target`. Connecting a
/// UDP socket transmits nothing; the kernel just resolves the route.
fn routed_source(target: IpAddr) -> Result<IpAddr, PacketError> {
    let bind_addr = match target {
        IpAddr::V4(_) => "0.0.0.0:0",
        IpAddr::V6(_) => "[::]:0",
    };
    let socket = UdpSocket::bind(bind_addr).map_err(|_| PacketError::NoInterface)?;
    socket
        .connect(SocketAddr::new(target, 80))
        .map_err(|_| PacketError::NoInterface)?;
    let local = socket.local_addr().map_err(|_| PacketError::NoInterface)?;
    Ok(local.ip())
}

/// Capture device owning the given local address, with a pcap default as
/// the fallback for point-to-point setups that hide addresses.
fn device_for(source: IpAddr) -> Result<Device, PacketError> {
    let devices = Device::list().map_err(|e| PacketError::CaptureSetup(e.to_string()))?;
    if let Some(device) = devices
        .into_iter()
        .find(|d| d.addresses.iter().any(|a| a.addr == source))
    {
        return Ok(device);
    }
    warn!(source = %source, "no capture device owns the routed source address");
    Device::lookup()
        .map_err(|e| PacketError::CaptureSetup(e.to_string()))?
        .ok_or(PacketError::NoInterface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_pins_host_and_port() {
        let filter = reply_filter("192.0.2.7".parse().unwrap(), 4441);
        assert_eq!(filter, "tcp and src host 192.0.2.7 and dst port 4441");
    }

    #[test]
    fn filter_formats_v6_hosts() {
        let filter = reply_filter("fd00::1".parse().unwrap(), 5000);
        assert_eq!(filter, "tcp and src host fd00::1 and dst port 5000");
    }

    #[test]
    fn datalink_lengths_match_dlt_table() {
        assert_eq!(datalink_header_len(1), 14);
        assert_eq!(datalink_header_len(0), 4);
        assert_eq!(datalink_header_len(108), 4);
        assert_eq!(datalink_header_len(113), 16);
        assert_eq!(datalink_header_len(101), 0);
        assert_eq!(datalink_header_len(999), 14);
    }
}
