use serde::{Deserialize, Serialize};

/// How the initial round-trip budget is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RttMode {
    /// Start from the conservative one-second default without probing.
    #[default]
    Fixed,
    /// Warm up against a list of well-known ports and derive the budget
    /// from observed reply timings. Falls back to the one-second default
    /// when nothing answers.
    Measure,
}

/// Per-scan tunables supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub rtt_mode: RttMode,
    /// Seed for the per-scan PRNG (magic port, IP ids). `None` seeds from
    /// OS entropy; tests pin it for reproducible packet fields.
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_fixed() {
        assert_eq!(ScanOptions::default().rtt_mode, RttMode::Fixed);
    }
}
