pub mod clock;

pub use clock::{Clock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[inline]
    pub fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// One timed edge transition inside a hardware-buffered waveform.
///
/// `rising_mask` / `falling_mask` are GPIO bit masks (bit n = BCM pin n);
/// the level is held for `hold_us` microseconds before the next event.
/// Invariant: `hold_us > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEvent {
    pub rising_mask: u32,
    pub falling_mask: u32,
    pub hold_us: u32,
}

/// Opaque id of a created waveform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveId(pub u32);

/// Transmission plan for one or more created waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePlan {
    /// Play the wave once.
    Once(WaveId),
    /// Play `wave` `times` times, then optionally `then` once.
    Repeat {
        wave: WaveId,
        times: u32,
        then: Option<WaveId>,
    },
    /// Play the wave until stopped.
    Forever(WaveId),
}

pub trait OutputPin {
    fn write(&mut self, level: Level) -> Result<(), BoxError>;
}

pub trait InputPin {
    fn read(&mut self) -> Result<Level, BoxError>;

    /// Register an edge callback fired whenever the pin level changes.
    /// The default implementation reports no callback support; callers
    /// fall back to polling.
    fn on_edge(&mut self, _callback: Box<dyn FnMut(Level) + Send>) -> Result<(), BoxError> {
        Err("edge callbacks not supported by this pin".into())
    }

    /// Remove a previously registered edge callback. No-op when none is set.
    fn clear_edge(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// The shared waveform transmit unit.
///
/// Only one waveform may be under construction at a time and only one may
/// transmit at a time; callers serialize access. `clear` drops every wave
/// built so far, `add` appends events to the wave under construction,
/// `create` seals it and returns its id.
pub trait WaveDevice {
    fn clear(&mut self) -> Result<(), BoxError>;
    fn add(&mut self, events: &[PulseEvent]) -> Result<usize, BoxError>;
    fn create(&mut self) -> Result<WaveId, BoxError>;
    fn transmit(&mut self, plan: WavePlan) -> Result<(), BoxError>;
    fn busy(&mut self) -> Result<bool, BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
    fn delete(&mut self, id: WaveId) -> Result<(), BoxError>;
}

/// One electrode sample: millivolts plus the thermistor temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub millivolts: f64,
    pub temperature_c: f64,
}

pub trait Probe {
    fn read(&mut self, timeout: std::time::Duration) -> Result<ProbeReading, BoxError>;
}
