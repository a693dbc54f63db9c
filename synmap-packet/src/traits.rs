use std::time::Duration;

use crate::error::PacketError;

/// Transmit side of the scan: a raw socket bound to one destination.
pub trait RawLink {
    /// Send one pre-built packet. For IPv4 the buffer is the complete
    /// IP+TCP packet (IP_HDRINCL); for IPv6 it is the bare TCP header.
    fn send(&mut self, packet: &[u8]) -> Result<(), PacketError>;
}

/// Receive side of the scan: a filtered packet capture.
pub trait FrameSource {
    /// Next captured frame, waiting at most `deadline`. A zero deadline
    /// polls once and returns whatever is immediately available.
    fn next_frame(&mut self, deadline: Duration) -> Option<Vec<u8>>;

    /// Link-layer header length to strip before the IP header.
    fn datalink_len(&self) -> usize;
}
