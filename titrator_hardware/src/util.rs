use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Sleep for `us` microseconds with a short spin tail for sub-millisecond
/// accuracy. Plain `thread::sleep` alone overshoots badly below ~1 ms,
/// which audibly distorts step timing.
pub fn precise_delay_us(us: u64) {
    let deadline = Instant::now() + Duration::from_micros(us);
    if us > 1_500 {
        std::thread::sleep(Duration::from_micros(us - 1_000));
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Poll `done` until it returns true or `timeout` expires.
pub fn wait_until(
    mut done: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !done() {
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
