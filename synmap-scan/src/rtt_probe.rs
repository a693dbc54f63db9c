//! Optional warm-up that derives the initial round-trip budget from live
//! replies before the real scan starts.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::debug;

use synmap_packet::{FrameSource, RawLink, build, parse};
use synmap_timing::{PeakPair, RTT_MAX, stamp};
use synmap_types::Family;

use crate::error::ScanError;

/// Well-known ports walked to find something that answers.
pub const PROBE_PORTS: [u16; 20] = [
    21, 22, 34, 25, 53, 79, 80, 110, 113, 135, 139, 143, 264, 389, 443, 993, 1454, 1723, 3389,
    8080,
];

const CANDIDATE_LIMIT: usize = 3;
const SAMPLE_ROUNDS: usize = 10;
const MAX_MISSES: u32 = 10;

/// Measure an RTT budget against `dst`.
///
/// Walks [`PROBE_PORTS`] collecting up to three ports that reply within a
/// second each, then takes ten round-robin samples across them and keeps the
/// second-largest observed interval. Every silent outcome degrades to the
/// conservative one-second default; only transmit failures are errors.
pub fn measure_rtt<L, F>(
    link: &mut L,
    frames: &mut F,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    magic_port: u16,
    rng: &mut StdRng,
) -> Result<u32, ScanError>
where
    L: RawLink,
    F: FrameSource,
{
    let wait = Duration::from_secs(1);

    let mut responders: Vec<u16> = Vec::new();
    for &port in &PROBE_PORTS {
        let sent_at = stamp::now();
        let syn = build::ipv4_segment(src, magic_port, dst, port, sent_at, build::FLAG_SYN, rng);
        link.send(&syn)?;
        if frames.next_frame(wait).is_some() {
            responders.push(port);
            if responders.len() >= CANDIDATE_LIMIT {
                break;
            }
        }
    }

    if responders.is_empty() {
        debug!(target = %dst, "no warm-up replies, using the one-second default");
        return Ok(RTT_MAX);
    }

    let mut peak = PeakPair::new();
    let mut samples = 0usize;
    let mut misses = 0u32;
    let mut attempt = 0usize;
    while samples < SAMPLE_ROUNDS {
        let port = responders[attempt % responders.len()];
        attempt += 1;

        let sent_at = stamp::now();
        let syn = build::ipv4_segment(src, magic_port, dst, port, sent_at, build::FLAG_SYN, rng);
        link.send(&syn)?;

        match frames.next_frame(wait) {
            Some(frame) => {
                let skip = frames.datalink_len().min(frame.len());
                if let Some(echoed) = parse::ack(&frame[skip..], Family::V4) {
                    peak.update(stamp::elapsed(echoed));
                }
                samples += 1;
            }
            None => {
                misses += 1;
                if misses > MAX_MISSES {
                    debug!(target = %dst, misses, "too many silent samples, giving up");
                    return Ok(RTT_MAX);
                }
            }
        }
    }

    let estimate = peak.estimate();
    debug!(target = %dst, estimate, "warm-up sampling finished");
    Ok(if estimate == 0 { RTT_MAX } else { estimate })
}
