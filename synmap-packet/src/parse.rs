//! Reply decoding by fixed offsets, without trusting the captured length.
//!
//! The caller strips the datalink header first, so every frame here starts
//! at the IP header. IPv6 frames are assumed to carry no extension headers
//! between the base header and TCP; a frame with Hop-by-Hop, Routing, or
//! Fragment headers will be misparsed and dropped by the length guard or the
//! flag check.

use synmap_types::Family;

use crate::build::{FLAG_ACK, FLAG_SYN, TCP_HEADER_LEN};

const IPV6_HEADER_LEN: usize = 40;
const SYNACK: u8 = FLAG_SYN | FLAG_ACK;

/// Offset of the TCP header inside the frame, or `None` when the frame is
/// too short (or claims an impossible IHL) to hold one.
fn tcp_offset(frame: &[u8], family: Family) -> Option<usize> {
    let offset = match family {
        Family::V4 => {
            let ihl = usize::from(*frame.first()? & 0x0F);
            if ihl < 5 {
                return None;
            }
            ihl * 4
        }
        Family::V6 => IPV6_HEADER_LEN,
    };
    if offset + TCP_HEADER_LEN > frame.len() {
        return None;
    }
    Some(offset)
}

/// TCP source port of the reply, i.e. the target port we probed.
pub fn source_port(frame: &[u8], family: Family) -> Option<u16> {
    let off = tcp_offset(frame, family)?;
    Some(u16::from_be_bytes([frame[off], frame[off + 1]]))
}

/// The reply's acknowledgment number minus one: the packed send time we
/// embedded in the probe's sequence field, assuming the peer echoed `seq + 1`.
pub fn ack(frame: &[u8], family: Family) -> Option<u32> {
    let off = tcp_offset(frame, family)?;
    let raw = u32::from_be_bytes([
        frame[off + 8],
        frame[off + 9],
        frame[off + 10],
        frame[off + 11],
    ]);
    Some(raw.wrapping_sub(1))
}

/// True only when the flag byte is exactly SYN|ACK. Frames with extra bits
/// (ECE, CWR) are deliberately not classified as open.
pub fn is_synack(frame: &[u8], family: Family) -> bool {
    match tcp_offset(frame, family) {
        Some(off) => frame[off + 13] == SYNACK,
        None => false,
    }
}
