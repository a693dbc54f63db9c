pub mod error;
pub mod rtt_probe;
pub mod syn;
pub mod table;

pub use error::ScanError;
pub use rtt_probe::{PROBE_PORTS, measure_rtt};
#[cfg(unix)]
pub use syn::scan_host;
pub use syn::{ScanTarget, scan_with};
pub use table::{NUM_RETRIES, Probe, ProbeTable};
