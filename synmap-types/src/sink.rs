use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::port::Protocol;

/// Per-host knowledge-base flags raised when a scan concludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFlag {
    /// The host has been port-scanned.
    HostScanned,
    /// The SYN scanner specifically has run against the host.
    SynScanDone,
    /// Every TCP port was covered (port list spanned 1-65535).
    FullScan,
}

impl ScanFlag {
    /// Knowledge-base key the host stores the flag under.
    pub fn key(self) -> &'static str {
        match self {
            ScanFlag::HostScanned => "Host/scanned",
            ScanFlag::SynScanDone => "Host/scanners/synscan",
            ScanFlag::FullScan => "Host/full_scan",
        }
    }
}

/// Where scan findings go. Implemented by the host runner; the scanner
/// itself never renders or persists results.
pub trait ScanSink {
    /// An open port was confirmed via SYN/ACK.
    fn add_port(&mut self, port: u16, proto: Protocol);

    /// Progress update: `scanned` of `total` ports dispatched so far.
    fn send_status(&mut self, scanned: usize, total: usize);

    /// End-of-scan marker.
    fn set_flag(&mut self, flag: ScanFlag);
}

/// In-memory sink collecting everything it is handed. Useful for embedding
/// hosts that post-process results, and for driving the scanner in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub ports: Vec<(u16, Protocol)>,
    pub statuses: Vec<(usize, usize)>,
    pub flags: Vec<ScanFlag>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_flag(&self, flag: ScanFlag) -> bool {
        self.flags.contains(&flag)
    }
}

impl ScanSink for MemorySink {
    fn add_port(&mut self, port: u16, proto: Protocol) {
        self.ports.push((port, proto));
    }

    fn send_status(&mut self, scanned: usize, total: usize) {
        self.statuses.push((scanned, total));
    }

    fn set_flag(&mut self, flag: ScanFlag) {
        self.flags.push(flag);
    }
}

/// Outcome of one host scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub target: IpAddr,
    /// True when the target was rejected before any socket opened
    /// (loopback targets are never scanned).
    pub skipped: bool,
    pub ports_scanned: usize,
    pub open_ports: Vec<u16>,
    pub duration: Duration,
}

impl ScanSummary {
    pub fn skipped(target: IpAddr) -> Self {
        Self {
            target,
            skipped: true,
            ports_scanned: 0,
            open_ports: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}
