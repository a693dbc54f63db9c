//! Raw TCP segment construction for SYN probes and RST teardowns.
//!
//! The IPv4 builder emits the complete IP+TCP packet for a raw socket opened
//! with IP_HDRINCL. The IPv6 builder emits only the 20-byte TCP header; the
//! kernel prepends the IPv6 header and fills the checksum through the
//! IPV6_CHECKSUM socket option.

use std::net::Ipv4Addr;

use rand::Rng;

use crate::checksum;

pub const FLAG_SYN: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;
pub const FLAG_ACK: u8 = 0x10;

pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const IPV4_PACKET_LEN: usize = IPV4_HEADER_LEN + TCP_HEADER_LEN;

pub const DEFAULT_TTL: u8 = 64;
pub const WINDOW_V4: u16 = 4096;
pub const WINDOW_V6: u16 = 5760;

const IPPROTO_TCP: u8 = 6;

/// Ephemeral source port used for every probe of one scan; the reply filter
/// is pinned to it so only our own traffic reaches userspace.
pub fn magic_port<R: Rng>(rng: &mut R) -> u16 {
    4441 + rng.gen_range(0..1200)
}

/// Build a complete IPv4+TCP probe packet.
///
/// `seq` carries the caller's packed send time verbatim; a compliant peer
/// echoes `seq + 1` in its SYN/ACK, which is how the round-trip is measured.
pub fn ipv4_segment<R: Rng>(
    src: Ipv4Addr,
    sport: u16,
    dst: Ipv4Addr,
    dport: u16,
    seq: u32,
    flags: u8,
    rng: &mut R,
) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(IPV4_PACKET_LEN);

    pkt.push(0x45); // version 4, IHL 5
    pkt.push(0x00); // TOS
    pkt.extend_from_slice(&(IPV4_PACKET_LEN as u16).to_be_bytes());
    let id: u16 = rng.r#gen();
    pkt.extend_from_slice(&id.to_be_bytes());
    pkt.extend_from_slice(&[0x00, 0x00]); // flags, fragment offset
    pkt.push(DEFAULT_TTL);
    pkt.push(IPPROTO_TCP);
    pkt.extend_from_slice(&[0x00, 0x00]); // header checksum, patched below
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    let ip_sum = checksum::ipv4_header(&pkt[..IPV4_HEADER_LEN]);
    pkt[10..12].copy_from_slice(&ip_sum.to_be_bytes());

    push_tcp_header(&mut pkt, sport, dport, seq, 0, flags, WINDOW_V4);
    let tcp_sum = checksum::tcp_ipv4(src, dst, &pkt[IPV4_HEADER_LEN..]);
    pkt[IPV4_HEADER_LEN + 16..IPV4_HEADER_LEN + 18].copy_from_slice(&tcp_sum.to_be_bytes());

    pkt
}

/// Build the TCP header of an IPv6 probe. The acknowledgment field is
/// randomized; the checksum is left to the kernel.
pub fn ipv6_segment<R: Rng>(sport: u16, dport: u16, seq: u32, flags: u8, rng: &mut R) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(TCP_HEADER_LEN);
    push_tcp_header(&mut pkt, sport, dport, seq, rng.r#gen(), flags, WINDOW_V6);
    pkt
}

fn push_tcp_header(
    pkt: &mut Vec<u8>,
    sport: u16,
    dport: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
) {
    pkt.extend_from_slice(&sport.to_be_bytes());
    pkt.extend_from_slice(&dport.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&ack.to_be_bytes());
    pkt.push(5 << 4); // data offset 5, no options
    pkt.push(flags);
    pkt.extend_from_slice(&window.to_be_bytes());
    pkt.extend_from_slice(&[0x00, 0x00]); // checksum
    pkt.extend_from_slice(&[0x00, 0x00]); // urgent pointer
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn ipv4_syn_parses_as_valid_tcp() {
        let pkt = ipv4_segment(
            Ipv4Addr::new(192, 168, 1, 100),
            4441,
            Ipv4Addr::new(192, 168, 1, 1),
            80,
            0x12345678,
            FLAG_SYN,
            &mut rng(),
        );
        assert_eq!(pkt.len(), IPV4_PACKET_LEN);

        let parsed = etherparse::SlicedPacket::from_ip(&pkt).unwrap();
        match parsed.transport.unwrap() {
            etherparse::TransportSlice::Tcp(tcp) => {
                assert_eq!(tcp.source_port(), 4441);
                assert_eq!(tcp.destination_port(), 80);
                assert_eq!(tcp.sequence_number(), 0x12345678);
                assert_eq!(tcp.acknowledgment_number(), 0);
                assert_eq!(tcp.window_size(), WINDOW_V4);
                assert!(tcp.syn());
                assert!(!tcp.ack());
                assert!(!tcp.rst());
            }
            _ => panic!("expected TCP transport"),
        }
    }

    #[test]
    fn ipv4_header_fields_match_layout() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let pkt = ipv4_segment(src, 5000, dst, 443, 1, FLAG_SYN, &mut rng());

        assert_eq!(pkt[0], 0x45);
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), 40);
        assert_eq!(pkt[8], DEFAULT_TTL);
        assert_eq!(pkt[9], 6);
        assert_eq!(&pkt[12..16], &src.octets());
        assert_eq!(&pkt[16..20], &dst.octets());
    }

    #[test]
    fn ipv4_checksums_verify() {
        let src = Ipv4Addr::new(172, 16, 0, 1);
        let dst = Ipv4Addr::new(172, 16, 0, 2);
        let pkt = ipv4_segment(src, 5555, dst, 8080, 0xDEADBEEF, FLAG_SYN, &mut rng());

        // Folding a header or pseudo-header+segment with its checksum in
        // place yields zero.
        assert_eq!(checksum::fold(&pkt[..IPV4_HEADER_LEN]), 0);
        assert_eq!(checksum::tcp_ipv4(src, dst, &pkt[IPV4_HEADER_LEN..]), 0);
    }

    #[test]
    fn ipv4_rst_sets_only_rst() {
        let pkt = ipv4_segment(
            Ipv4Addr::new(10, 0, 0, 1),
            4441,
            Ipv4Addr::new(10, 0, 0, 2),
            22,
            99,
            FLAG_RST,
            &mut rng(),
        );
        assert_eq!(pkt[IPV4_HEADER_LEN + 13], FLAG_RST);

        let parsed = etherparse::SlicedPacket::from_ip(&pkt).unwrap();
        match parsed.transport.unwrap() {
            etherparse::TransportSlice::Tcp(tcp) => {
                assert!(tcp.rst());
                assert!(!tcp.syn());
                assert!(!tcp.ack());
            }
            _ => panic!("expected TCP transport"),
        }
    }

    #[test]
    fn ipv6_segment_is_bare_tcp_header() {
        let pkt = ipv6_segment(4441, 443, 0xCAFE, FLAG_SYN, &mut rng());
        assert_eq!(pkt.len(), TCP_HEADER_LEN);
        assert_eq!(u16::from_be_bytes([pkt[0], pkt[1]]), 4441);
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), 443);
        assert_eq!(u32::from_be_bytes([pkt[4], pkt[5], pkt[6], pkt[7]]), 0xCAFE);
        assert_eq!(pkt[12], 5 << 4);
        assert_eq!(pkt[13], FLAG_SYN);
        assert_eq!(u16::from_be_bytes([pkt[14], pkt[15]]), WINDOW_V6);
        // Checksum is the kernel's job.
        assert_eq!(&pkt[16..18], &[0, 0]);
    }

    #[test]
    fn seeded_rng_reproduces_packets() {
        let a = ipv4_segment(
            Ipv4Addr::new(10, 0, 0, 1),
            4441,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            42,
            FLAG_SYN,
            &mut rng(),
        );
        let b = ipv4_segment(
            Ipv4Addr::new(10, 0, 0, 1),
            4441,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            42,
            FLAG_SYN,
            &mut rng(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn magic_port_stays_in_range() {
        let mut r = rng();
        for _ in 0..1000 {
            let port = magic_port(&mut r);
            assert!((4441..4441 + 1200).contains(&port));
        }
    }
}
