//! Wall-clock timestamps packed into 32 bits so a send time can ride in the
//! TCP sequence field of a SYN and come back in the SYN/ACK's acknowledgment.
//!
//! Layout: `((sec & 0xF) << 28) | ((usec & 0xFFFF_FFF0) >> 4)` — a 16-second
//! span at 16 µs resolution. Values are kept in host order everywhere;
//! the packet builder and parser convert at the wire boundary.
//!
//! The encoding assumes the peer echoes `seq + 1`, which any compliant TCP
//! does. A middlebox that rewrites sequence numbers silently breaks the RTT
//! measurement; there is no way to detect that from this side.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One second in packed units. Upper bound for every RTT estimate.
pub const RTT_MAX: u32 = 1 << 28;

fn wall_clock() -> (u64, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    (now.as_secs(), now.subsec_micros())
}

fn pack(sec: u64, usec: u32) -> u32 {
    (((sec & 0xF) as u32) << 28) | ((usec & 0xFFFF_FFF0) >> 4)
}

/// Current wall time in the packed encoding.
pub fn now() -> u32 {
    let (sec, usec) = wall_clock();
    pack(sec, usec)
}

/// Expand a packed value into a duration. Microseconds are normalized into
/// `[0, 1_000_000)`; anything past two seconds saturates to exactly 2 s.
pub fn decode(packed: u32) -> Duration {
    let mut secs = (packed >> 28) & 0xF;
    let mut micros = (packed & 0x0FFF_FFFF) << 4;
    while micros >= 1_000_000 {
        micros -= 1_000_000;
        secs += 1;
    }
    if secs > 2 {
        return Duration::new(2, 0);
    }
    Duration::new(u64::from(secs), micros * 1_000)
}

fn elapsed_from(now: u32, then: u32) -> u32 {
    if then > now {
        // Clock jitter put the send time in the future; call it instantaneous.
        return 0;
    }
    (now - then).min(RTT_MAX)
}

/// Packed interval between `then` and the current time, clamped to [`RTT_MAX`].
pub fn elapsed(then: u32) -> u32 {
    elapsed_from(now(), then)
}

fn dead_at(now: u32, then: u32, budget: u32) -> bool {
    now.wrapping_sub(then) > budget.saturating_mul(2)
}

/// Has a probe sent at `then` outlived twice the round-trip budget?
pub fn is_dead(then: u32, budget: u32) -> bool {
    dead_at(now(), then, budget)
}
