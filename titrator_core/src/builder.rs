//! Builder for `MotorAxis`. All fields are validated on `try_build()`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use titrator_traits::{Clock, InputPin, MonotonicClock, OutputPin, WaveDevice};

use crate::axis::{AxisConfig, MotorAxis};
use crate::error::{BuildError, Result};

/// Sensor/busy poll cadence; must stay at or below 1 ms so a limit
/// trigger cancels an in-flight waveform within a few polls.
pub const DEFAULT_POLL: Duration = Duration::from_millis(1);

pub struct MotorAxisBuilder<O, I, W> {
    name: Option<String>,
    config: Option<AxisConfig>,
    dir: Option<O>,
    enable: Option<O>,
    start_sensor: Option<I>,
    end_sensor: Option<I>,
    wave: Option<W>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cancel: Option<Arc<AtomicBool>>,
    poll: Duration,
}

impl<O, I, W> Default for MotorAxisBuilder<O, I, W> {
    fn default() -> Self {
        Self {
            name: None,
            config: None,
            dir: None,
            enable: None,
            start_sensor: None,
            end_sensor: None,
            wave: None,
            clock: None,
            cancel: None,
            poll: DEFAULT_POLL,
        }
    }
}

impl<O: OutputPin, I: InputPin, W: WaveDevice> MotorAxisBuilder<O, I, W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: AxisConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn dir_pin(mut self, pin: O) -> Self {
        self.dir = Some(pin);
        self
    }

    pub fn enable_pin(mut self, pin: O) -> Self {
        self.enable = Some(pin);
        self
    }

    pub fn start_sensor(mut self, pin: I) -> Self {
        self.start_sensor = Some(pin);
        self
    }

    pub fn end_sensor(mut self, pin: I) -> Self {
        self.end_sensor = Some(pin);
        self
    }

    pub fn wave_device(mut self, dev: W) -> Self {
        self.wave = Some(dev);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a cancel flag between axes so one Ctrl-C stops everything.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn try_build(self) -> Result<MotorAxis<O, I, W>> {
        let config = self
            .config
            .ok_or_else(|| eyre::Report::new(BuildError::InvalidConfig("axis config missing")))?;
        if config.step_freq_hz == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "step frequency must be nonzero",
            )));
        }
        if self.poll.is_zero() || self.poll > Duration::from_millis(1) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "poll interval must be between 1 us and 1 ms",
            )));
        }
        let (Some(dir), Some(enable), Some(start_sensor), Some(end_sensor)) =
            (self.dir, self.enable, self.start_sensor, self.end_sensor)
        else {
            return Err(eyre::Report::new(BuildError::MissingPins));
        };
        let wave = self
            .wave
            .ok_or_else(|| eyre::Report::new(BuildError::MissingWaveDevice))?;
        let clock = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let name = self
            .name
            .unwrap_or_else(|| format!("axis-gpio{}", config.step_pin));
        let cancel = self.cancel.unwrap_or_default();
        Ok(MotorAxis::from_parts(
            name,
            config,
            dir,
            enable,
            start_sensor,
            end_sensor,
            wave,
            clock,
            cancel,
            self.poll,
        ))
    }
}
