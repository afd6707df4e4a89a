//! Test and helper mocks for titrator_core

use std::time::{Duration, Instant};

/// A probe that always errors on read; useful for exercising sampler
/// stall handling and shutdown paths.
pub struct NoopProbe;

impl titrator_traits::Probe for NoopProbe {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<titrator_traits::ProbeReading, titrator_traits::BoxError> {
        Err(Box::new(std::io::Error::other("noop probe")))
    }
}

/// A probe that returns the same reading forever.
pub struct FixedProbe {
    pub millivolts: f64,
    pub temperature_c: f64,
}

impl titrator_traits::Probe for FixedProbe {
    fn read(
        &mut self,
        _timeout: Duration,
    ) -> Result<titrator_traits::ProbeReading, titrator_traits::BoxError> {
        Ok(titrator_traits::ProbeReading {
            millivolts: self.millivolts,
            temperature_c: self.temperature_c,
        })
    }
}

/// A clock whose sleeps return immediately; timestamps stay real so
/// settle-heavy scripts run in test time.
#[derive(Clone, Copy, Default)]
pub struct InstantClock;

impl titrator_traits::Clock for InstantClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _d: Duration) {}

    fn ms_since(&self, earlier: Instant) -> u64 {
        let ms = Instant::now().saturating_duration_since(earlier).as_millis();
        (ms.min(u128::from(u64::MAX))) as u64
    }
}
