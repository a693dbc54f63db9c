//! The SYN scan state machine.
//!
//! Sends are interleaved pairwise with bounded sniff passes: every second
//! port also spends a fraction of the round-trip budget draining replies, so
//! the send cadence stays ahead of the reply cadence. Ports whose replies
//! never arrive are retransmitted from the probe table until their retry
//! budget runs out.

use std::net::IpAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, warn};

use synmap_packet::{FrameSource, RawLink, build, parse};
use synmap_timing::{RTT_MAX, stamp};
use synmap_types::{Family, Protocol, ScanFlag, ScanSink};

use crate::error::ScanError;
use crate::table::ProbeTable;

/// Addressing fixed for the duration of one scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget {
    pub src: IpAddr,
    pub dst: IpAddr,
    /// Ephemeral source port shared by every probe; the reply capture is
    /// filtered down to it.
    pub magic_port: u16,
}

impl ScanTarget {
    pub fn family(&self) -> Family {
        Family::of(self.dst)
    }
}

/// Scan `dst` across `ports`, reporting open ports and progress to `sink`.
///
/// The complete host-facing routine: skips loopback targets before opening
/// any socket, unwraps IPv4-mapped destinations, resolves the initial
/// round-trip budget per `opts.rtt_mode`, opens the raw socket and the
/// filtered reply capture, and runs the scan. The end-of-scan flags are
/// raised whether or not the scan started; only a loopback skip (or a
/// failed warm-up) leaves them unset.
#[cfg(unix)]
pub fn scan_host(
    dst: IpAddr,
    ports: &[u16],
    opts: &synmap_types::ScanOptions,
    sink: &mut dyn ScanSink,
) -> Result<synmap_types::ScanSummary, ScanError> {
    use rand::SeedableRng;
    use std::time::Instant;
    use synmap_types::{RttMode, ScanSummary, canonical_addr};

    let started = Instant::now();
    let dst = canonical_addr(dst);
    if dst.is_loopback() {
        debug!(target = %dst, "loopback target, skipping scan");
        return Ok(ScanSummary::skipped(dst));
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let rtt = match (opts.rtt_mode, dst) {
        (RttMode::Fixed, _) => RTT_MAX,
        (RttMode::Measure, IpAddr::V4(v4)) => warm_up(v4, &mut rng)?,
        // The warm-up probes over IPv4 only; v6 targets start from the default.
        (RttMode::Measure, IpAddr::V6(_)) => RTT_MAX,
    };

    let scanned = open_and_scan(dst, ports, rtt, &mut rng, sink);

    // The scanned markers are raised even when the scan failed to start;
    // only a loopback skip leaves them unset.
    sink.set_flag(ScanFlag::HostScanned);
    sink.set_flag(ScanFlag::SynScanDone);

    let open_ports = scanned?;
    Ok(ScanSummary {
        target: dst,
        skipped: false,
        ports_scanned: ports.len(),
        open_ports,
        duration: started.elapsed(),
    })
}

/// Socket setup plus the scan proper, split out so the end-of-scan markers
/// can be raised no matter how this returns.
#[cfg(unix)]
fn open_and_scan(
    dst: IpAddr,
    ports: &[u16],
    rtt: u32,
    rng: &mut StdRng,
    sink: &mut dyn ScanSink,
) -> Result<Vec<u16>, ScanError> {
    use std::time::Instant;
    use synmap_packet::{RawSocket, ReplyCapture};
    use tracing::info;

    let started = Instant::now();
    let magic_port = build::magic_port(rng);
    let mut capture = ReplyCapture::open(dst, magic_port)?;
    let mut link = RawSocket::open(dst)?;
    let target = ScanTarget {
        src: capture.source_addr(),
        dst,
        magic_port,
    };

    info!(target = %dst, ports = ports.len(), magic_port, "starting SYN scan");
    let open_ports = scan_with(&mut link, &mut capture, target, ports, rtt, rng, sink)?;
    info!(
        target = %dst,
        open = open_ports.len(),
        duration_ms = started.elapsed().as_millis(),
        "SYN scan complete"
    );
    Ok(open_ports)
}

/// Warm up the RTT budget with a dedicated socket and capture, torn down
/// before the scan proper opens its own.
#[cfg(unix)]
fn warm_up(dst: std::net::Ipv4Addr, rng: &mut StdRng) -> Result<u32, ScanError> {
    use synmap_packet::{RawSocket, ReplyCapture};

    let magic_port = build::magic_port(rng);
    let mut capture = ReplyCapture::open(IpAddr::V4(dst), magic_port)?;
    let src = match capture.source_addr() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return Err(ScanError::MixedAddressFamilies),
    };
    let mut link = RawSocket::open(IpAddr::V4(dst))?;

    let rtt = crate::rtt_probe::measure_rtt(&mut link, &mut capture, src, dst, magic_port, rng)?;
    debug!(target = %dst, rtt, "warm-up complete");
    Ok(rtt)
}

/// Run the scan over caller-supplied transmit and capture endpoints.
///
/// This is the whole state machine minus socket setup; tests drive it with
/// in-memory links. Returns the open ports in discovery order.
pub fn scan_with<L, F>(
    link: &mut L,
    frames: &mut F,
    target: ScanTarget,
    ports: &[u16],
    initial_rtt: u32,
    rng: &mut StdRng,
    sink: &mut dyn ScanSink,
) -> Result<Vec<u16>, ScanError>
where
    L: RawLink,
    F: FrameSource,
{
    if Family::of(target.src) != Family::of(target.dst) {
        return Err(ScanError::MixedAddressFamilies);
    }

    let mut driver = Driver {
        link,
        frames,
        sink,
        target,
        family: target.family(),
        table: ProbeTable::new(),
        rtt: initial_rtt.clamp(1, RTT_MAX),
        rng,
        open_ports: Vec::new(),
    };
    driver.run(ports)?;
    Ok(driver.open_ports)
}

struct Driver<'a, L: RawLink, F: FrameSource> {
    link: &'a mut L,
    frames: &'a mut F,
    sink: &'a mut dyn ScanSink,
    target: ScanTarget,
    family: Family,
    table: ProbeTable,
    /// Current round-trip budget, packed. Non-zero, at most [`RTT_MAX`].
    rtt: u32,
    rng: &'a mut StdRng,
    open_ports: Vec<u16>,
}

impl<L: RawLink, F: FrameSource> Driver<'_, L, F> {
    fn run(&mut self, ports: &[u16]) -> Result<(), ScanError> {
        let total = ports.len();

        let mut i = 0;
        while i < total {
            if i % 100 == 0 {
                self.sink.send_status(i, total);
            }
            self.step(Some(ports[i]), false)?;
            if i + 1 < total {
                self.step(Some(ports[i + 1]), true)?;
            }
            i += 2;
        }

        // Drain phase: late replies are recovered by retransmission.
        // Runs for IPv4 only; a v6 scan ends with the port list, so silent
        // v6 ports are never retried.
        if self.family == Family::V4 {
            while !self.table.is_empty() {
                let mut retry = self.table.expire(self.rtt);
                for _ in 0..2 {
                    let Some(port) = retry else { break };
                    self.step(Some(port), false)?;
                    retry = self.table.expire(self.rtt);
                }
                // One sniff step closes every round, whether or not a retry
                // candidate is left; with none, nothing is sent.
                self.step(retry, true)?;
            }
        }

        self.sink.send_status(total, total);
        if total >= 65535 {
            self.sink.set_flag(ScanFlag::FullScan);
        }
        Ok(())
    }

    /// One send and/or sniff step. A transmit failure aborts the scan.
    fn step(&mut self, dport: Option<u16>, sniff: bool) -> Result<(), ScanError> {
        let mut deadline = sniff_deadline(self.rtt);

        if let Some(dport) = dport {
            let sent_at = stamp::now();
            self.table.insert_or_bump(dport, sent_at);
            let syn = self.segment(dport, sent_at, build::FLAG_SYN);
            self.link.send(&syn)?;
        }

        if sniff {
            while let Some(frame) = self.frames.next_frame(deadline) {
                self.handle_frame(&frame);
                // Re-poll without waiting to drain whatever already arrived.
                deadline = Duration::ZERO;
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let skip = self.frames.datalink_len();
        if frame.len() < skip {
            return;
        }
        let frame = &frame[skip..];
        let Some(sport) = parse::source_port(frame, self.family) else {
            return;
        };

        if parse::is_synack(frame, self.family)
            && let Some(echoed) = parse::ack(frame, self.family)
        {
            debug!(port = sport, "SYN/ACK received, port open");
            self.sink.add_port(sport, Protocol::Tcp);
            self.open_ports.push(sport);

            // Tear the half-open connection down on the peer side.
            let rst = self.segment(sport, echoed.wrapping_add(1), build::FLAG_RST);
            if let Err(e) = self.link.send(&rst) {
                warn!(port = sport, error = %e, "failed to send RST");
            }

            self.rtt = stamp::elapsed(echoed).max(1);
        }

        // Any TCP reply concludes the probe: closed ports answer with RST.
        self.table.remove(sport);
    }

    fn segment(&mut self, dport: u16, seq: u32, flags: u8) -> Vec<u8> {
        match (self.target.src, self.target.dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                build::ipv4_segment(src, self.target.magic_port, dst, dport, seq, flags, self.rng)
            }
            _ => build::ipv6_segment(self.target.magic_port, dport, seq, flags, self.rng),
        }
    }
}

/// Per-sniff reply budget: an eighth of the round trip, at most one second.
fn sniff_deadline(rtt: u32) -> Duration {
    (stamp::decode(rtt) / 8).min(Duration::from_secs(1))
}
