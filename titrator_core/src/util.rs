//! Common time/rounding helpers for titrator_core.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Hold time in microseconds for one pulse edge at the given step
/// frequency, with the period split by `divisor` (2 for symmetric
/// half-periods, 4 when the driver needs setup headroom).
/// Clamps to at least 1 us.
#[inline]
pub fn edge_hold_us(freq_hz: u32, divisor: u32) -> u32 {
    let hz = u64::from(freq_hz.max(1));
    let div = u64::from(divisor.max(1));
    ((MICROS_PER_SEC / (div * hz)).max(1)) as u32
}

/// Round to 2 decimal places, the instrument's display precision for both
/// pH and millilitres.
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
