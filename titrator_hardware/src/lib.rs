//! Hardware implementations of the `titrator_traits` boundary.
//!
//! Simulated pins, wave unit, and probe are always available and back the
//! CLI's sim mode plus most tests. Real Raspberry Pi implementations
//! (rppal GPIO, software-timed wave playback, ADS1115 probe) live behind
//! the `hardware` feature.

pub mod error;
pub mod util;

#[cfg(feature = "hardware")]
pub mod ads1115;
#[cfg(feature = "hardware")]
pub mod gpio;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use titrator_traits::{
    BoxError, InputPin, Level, OutputPin, Probe, ProbeReading, PulseEvent, WaveDevice, WaveId,
    WavePlan,
};

/// Shared observable state of a simulated output pin.
#[derive(Debug)]
pub struct SimPinState {
    level: Mutex<Level>,
    writes: Mutex<u32>,
}

impl SimPinState {
    pub fn level(&self) -> Level {
        *self.level.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn writes(&self) -> u32 {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Simulated output pin; the returned handle observes every write.
pub struct SimOutputPin {
    state: Arc<SimPinState>,
}

impl SimOutputPin {
    pub fn new() -> (Self, Arc<SimPinState>) {
        let state = Arc::new(SimPinState {
            level: Mutex::new(Level::Low),
            writes: Mutex::new(0),
        });
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl OutputPin for SimOutputPin {
    fn write(&mut self, level: Level) -> Result<(), BoxError> {
        *self.state.level.lock().unwrap_or_else(|e| e.into_inner()) = level;
        *self.state.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

type EdgeCallback = Box<dyn FnMut(Level) + Send>;

/// External control handle for a simulated sensor input.
#[derive(Clone)]
pub struct SimSensorHandle {
    high: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<EdgeCallback>>>,
}

impl SimSensorHandle {
    /// Drive the simulated line; fires a registered edge callback on change.
    pub fn set(&self, level: Level) {
        let was = self.high.swap(level == Level::High, Ordering::SeqCst);
        if was != (level == Level::High)
            && let Ok(mut guard) = self.callback.lock()
            && let Some(cb) = guard.as_mut()
        {
            cb(level);
        }
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

/// Simulated digital input with pull-down biasing (idles low).
pub struct SimSensor {
    high: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<EdgeCallback>>>,
}

impl SimSensor {
    pub fn new() -> (Self, SimSensorHandle) {
        let high = Arc::new(AtomicBool::new(false));
        let callback = Arc::new(Mutex::new(None));
        let handle = SimSensorHandle {
            high: high.clone(),
            callback: callback.clone(),
        };
        (Self { high, callback }, handle)
    }
}

impl InputPin for SimSensor {
    fn read(&mut self) -> Result<Level, BoxError> {
        Ok(if self.high.load(Ordering::SeqCst) {
            Level::High
        } else {
            Level::Low
        })
    }

    fn on_edge(&mut self, callback: EdgeCallback) -> Result<(), BoxError> {
        *self.callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
        Ok(())
    }

    fn clear_edge(&mut self) -> Result<(), BoxError> {
        *self.callback.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Limit sensor standing in for real travel in sim mode: reads low for a
/// fixed number of polls, goes high once as if the carriage arrived, then
/// re-arms. Paired with the ~1 ms motion poll this makes sim homing take
/// `reads_until_high` milliseconds instead of running forever.
pub struct SimTravelSensor {
    reads_until_high: u32,
    reads: u32,
}

impl SimTravelSensor {
    pub fn new(reads_until_high: u32) -> Self {
        Self {
            reads_until_high: reads_until_high.max(2),
            reads: 0,
        }
    }
}

impl InputPin for SimTravelSensor {
    fn read(&mut self) -> Result<Level, BoxError> {
        self.reads += 1;
        if self.reads >= self.reads_until_high {
            self.reads = 0;
            Ok(Level::High)
        } else {
            Ok(Level::Low)
        }
    }
}

struct BuiltWave {
    pulses: usize,
    duration: Duration,
}

enum SimTx {
    Idle,
    Until(Instant),
    Forever,
}

/// Simulated wave transmit unit.
///
/// Mirrors the real unit's single-construction-buffer discipline: `clear`
/// drops everything, `add` extends the wave under construction, `create`
/// seals it. Playback duration is derived from the summed hold times and
/// divided by `time_scale` so sim runs do not dose in real time.
pub struct SimWaveDevice {
    building: Option<Vec<PulseEvent>>,
    created: HashMap<u32, BuiltWave>,
    next_id: u32,
    tx: SimTx,
    time_scale: u32,
    pub max_pulses: usize,
    /// Total pulses ever transmitted (pairs of edges count as one step).
    transmitted_pulses: u64,
    stopped: bool,
}

impl SimWaveDevice {
    pub fn new() -> Self {
        Self::with_time_scale(1)
    }

    /// `time_scale` > 1 compresses playback time by that factor.
    pub fn with_time_scale(time_scale: u32) -> Self {
        Self {
            building: None,
            created: HashMap::new(),
            next_id: 0,
            tx: SimTx::Idle,
            time_scale: time_scale.max(1),
            max_pulses: 5000 * 2,
            transmitted_pulses: 0,
            stopped: false,
        }
    }

    pub fn transmitted_pulses(&self) -> u64 {
        self.transmitted_pulses
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped
    }
}

impl Default for SimWaveDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveDevice for SimWaveDevice {
    fn clear(&mut self) -> Result<(), BoxError> {
        self.building = None;
        self.created.clear();
        Ok(())
    }

    fn add(&mut self, events: &[PulseEvent]) -> Result<usize, BoxError> {
        let building = self.building.get_or_insert_with(Vec::new);
        if building.len() + events.len() > self.max_pulses {
            return Err(Box::new(error::HwError::WaveBufferFull(
                building.len() + events.len(),
            )));
        }
        building.extend_from_slice(events);
        Ok(building.len())
    }

    fn create(&mut self) -> Result<WaveId, BoxError> {
        let events = self.building.take().ok_or(error::HwError::NoWave)?;
        let micros: u64 = events.iter().map(|e| u64::from(e.hold_us)).sum();
        let id = self.next_id;
        self.next_id += 1;
        self.created.insert(
            id,
            BuiltWave {
                // two edges per step pulse
                pulses: events.len() / 2,
                duration: Duration::from_micros(micros / u64::from(self.time_scale)),
            },
        );
        Ok(WaveId(id))
    }

    fn transmit(&mut self, plan: WavePlan) -> Result<(), BoxError> {
        let wave = |id: WaveId| -> Result<&BuiltWave, BoxError> {
            self.created
                .get(&id.0)
                .ok_or_else(|| Box::new(error::HwError::UnknownWave(id.0)) as BoxError)
        };
        let (duration, pulses, forever) = match plan {
            WavePlan::Once(id) => {
                let w = wave(id)?;
                (w.duration, w.pulses as u64, false)
            }
            WavePlan::Repeat { wave: id, times, then } => {
                let w = wave(id)?;
                let mut d = w.duration * times;
                let mut p = w.pulses as u64 * u64::from(times);
                if let Some(t) = then {
                    let w2 = wave(t)?;
                    d += w2.duration;
                    p += w2.pulses as u64;
                }
                (d, p, false)
            }
            WavePlan::Forever(id) => {
                let w = wave(id)?;
                (w.duration, w.pulses as u64, true)
            }
        };
        self.transmitted_pulses += pulses;
        self.stopped = false;
        self.tx = if forever {
            SimTx::Forever
        } else {
            SimTx::Until(Instant::now() + duration)
        };
        Ok(())
    }

    fn busy(&mut self) -> Result<bool, BoxError> {
        Ok(match self.tx {
            SimTx::Idle => false,
            SimTx::Forever => true,
            SimTx::Until(deadline) => Instant::now() < deadline,
        })
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.tx = SimTx::Idle;
        self.stopped = true;
        Ok(())
    }

    fn delete(&mut self, id: WaveId) -> Result<(), BoxError> {
        self.created.remove(&id.0);
        Ok(())
    }
}

/// Simulated electrode probe with a linear mV drift per read.
///
/// Defaults to a pre-titration acid reading drifting toward neutral, which
/// gives the sim CLI a plausible pH trajectory.
pub struct SimProbe {
    millivolts: f64,
    drift_mv: f64,
    temperature_c: f64,
}

impl SimProbe {
    pub fn new(start_mv: f64, drift_mv: f64) -> Self {
        Self {
            millivolts: start_mv,
            drift_mv,
            temperature_c: 21.3,
        }
    }
}

impl Default for SimProbe {
    fn default() -> Self {
        // ~pH 4.5 drifting upward (mV falling) as titrant is added
        Self::new(148.0, -2.0)
    }
}

impl Probe for SimProbe {
    fn read(&mut self, _timeout: Duration) -> Result<ProbeReading, BoxError> {
        let reading = ProbeReading {
            millivolts: self.millivolts,
            temperature_c: self.temperature_c,
        };
        self.millivolts += self.drift_mv;
        tracing::trace!(mv = reading.millivolts, "probe sample (sim)");
        Ok(reading)
    }
}
