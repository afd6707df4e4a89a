//! MotorAxis terminal-state behavior against simulated hardware.
//!
//! Covers the three outcomes (completed, sensor stop, cancel) plus the
//! hardware-error path, and checks the de-energize guarantee across all
//! of them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use titrator_core::axis::{Axis, Direction, MotionRequest, MotorAxis, StopReason};
use titrator_core::mocks::InstantClock;
use titrator_core::{AxisConfig, TitratorError};
use titrator_hardware::{SimOutputPin, SimPinState, SimSensor, SimSensorHandle, SimWaveDevice};
use titrator_traits::{BoxError, Level, MonotonicClock, PulseEvent, WaveDevice, WaveId, WavePlan};

fn axis_config() -> AxisConfig {
    AxisConfig {
        dir_pin: 13,
        step_pin: 19,
        enable_pin: 12,
        start_sensor_pin: 16,
        end_sensor_pin: 7,
        step_freq_hz: 1_000,
        enable_active: Level::High,
    }
}

struct Rig {
    axis: MotorAxis<SimOutputPin, SimSensor, SimWaveDevice>,
    enable: Arc<SimPinState>,
    dir: Arc<SimPinState>,
    start: SimSensorHandle,
    end: SimSensorHandle,
}

fn rig(real_clock: bool) -> Rig {
    // counted moves play out in compressed time
    rig_with(1_000_000, real_clock)
}

fn rig_with(time_scale: u32, real_clock: bool) -> Rig {
    let (dir_pin, dir) = SimOutputPin::new();
    let (enable_pin, enable) = SimOutputPin::new();
    let (start_pin, start) = SimSensor::new();
    let (end_pin, end) = SimSensor::new();
    let clock: Arc<dyn titrator_traits::Clock + Send + Sync> = if real_clock {
        Arc::new(MonotonicClock::new())
    } else {
        Arc::new(InstantClock)
    };
    let axis = MotorAxis::builder()
        .name("burette")
        .config(axis_config())
        .dir_pin(dir_pin)
        .enable_pin(enable_pin)
        .start_sensor(start_pin)
        .end_sensor(end_pin)
        .wave_device(SimWaveDevice::with_time_scale(time_scale))
        .clock(clock)
        .try_build()
        .unwrap();
    Rig {
        axis,
        enable,
        dir,
        start,
        end,
    }
}

#[test]
fn counted_move_completes_and_de_energizes() {
    let mut rig = rig(false);
    let out = rig
        .axis
        .run(&MotionRequest::Steps {
            count: 12_345,
            freq_hz: 500,
            dir: Direction::Forward,
        })
        .unwrap();
    assert_eq!(out.reason, StopReason::Completed);
    assert_eq!(out.completed_steps, 12_345);
    assert_eq!(rig.dir.level(), Level::High);
    assert_eq!(rig.enable.level(), Level::Low);
    // energize + de-energize
    assert_eq!(rig.enable.writes(), 2);
}

#[test]
fn zero_step_move_is_a_no_op() {
    let mut rig = rig(false);
    let out = rig
        .axis
        .run(&MotionRequest::Steps {
            count: 0,
            freq_hz: 500,
            dir: Direction::Forward,
        })
        .unwrap();
    assert_eq!(out.reason, StopReason::Completed);
    assert_eq!(out.completed_steps, 0);
    assert_eq!(rig.enable.level(), Level::Low);
}

#[test]
fn motion_toward_high_sensor_is_skipped_without_energizing() {
    let mut rig = rig(false);
    rig.end.set(Level::High);
    let out = rig
        .axis
        .run(&MotionRequest::Steps {
            count: 1_000,
            freq_hz: 500,
            dir: Direction::Forward,
        })
        .unwrap();
    assert_eq!(out.reason, StopReason::SensorTriggered);
    assert_eq!(out.completed_steps, 0);
    assert_eq!(rig.enable.writes(), 0);
}

#[test]
fn homing_skipped_when_already_at_target_sensor() {
    let mut rig = rig(false);
    rig.start.set(Level::High);
    let out = rig
        .axis
        .run(&MotionRequest::homing(Direction::Reverse, 1_000))
        .unwrap();
    assert_eq!(out.reason, StopReason::SensorTriggered);
    assert_eq!(out.completed_steps, 0);
}

#[test]
fn homing_stops_at_sensor_and_de_energizes() {
    let mut rig = rig(true);
    let start = rig.start.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(15));
        start.set(Level::High);
    });
    let out = rig
        .axis
        .run(&MotionRequest::homing(Direction::Reverse, 1_000))
        .unwrap();
    trigger.join().unwrap();
    assert_eq!(out.reason, StopReason::SensorTriggered);
    assert_eq!(rig.dir.level(), Level::Low);
    assert_eq!(rig.enable.level(), Level::Low);
}

#[test]
fn pre_set_cancel_flag_skips_motion() {
    let mut rig = rig(false);
    rig.axis.cancel_flag().store(true, Ordering::SeqCst);
    let out = rig
        .axis
        .run(&MotionRequest::Steps {
            count: 500,
            freq_hz: 500,
            dir: Direction::Forward,
        })
        .unwrap();
    assert_eq!(out.reason, StopReason::Cancelled);
    assert_eq!(out.completed_steps, 0);
    assert_eq!(rig.enable.writes(), 0);
}

#[test]
fn cancel_mid_homing_stops_and_de_energizes() {
    let mut rig = rig(true);
    let cancel = rig.axis.cancel_flag();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(15));
        cancel.store(true, Ordering::SeqCst);
    });
    let out = rig
        .axis
        .run(&MotionRequest::homing(Direction::Forward, 1_000))
        .unwrap();
    trigger.join().unwrap();
    assert_eq!(out.reason, StopReason::Cancelled);
    assert_eq!(rig.enable.level(), Level::Low);
}

#[test]
fn timed_jog_aborts_on_either_sensor() {
    // real playback time so the sensor, not the deadline, ends the jog
    let mut rig = rig_with(1, true);
    let start = rig.start.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(15));
        start.set(Level::High);
    });
    // Long enough that only the sensor can end it early.
    let out = rig
        .axis
        .run(&MotionRequest::ForDuration {
            ms: 60_000,
            freq_hz: 1_000,
            dir: Direction::Forward,
        })
        .unwrap();
    trigger.join().unwrap();
    assert_eq!(out.reason, StopReason::SensorTriggered);
    assert_eq!(rig.enable.level(), Level::Low);
}

/// Wave device whose transmit always fails, for the fatal-error path.
struct FailingWave(SimWaveDevice);

impl WaveDevice for FailingWave {
    fn clear(&mut self) -> Result<(), BoxError> {
        self.0.clear()
    }
    fn add(&mut self, events: &[PulseEvent]) -> Result<usize, BoxError> {
        self.0.add(events)
    }
    fn create(&mut self) -> Result<WaveId, BoxError> {
        self.0.create()
    }
    fn transmit(&mut self, _plan: WavePlan) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("dma unavailable")))
    }
    fn busy(&mut self) -> Result<bool, BoxError> {
        self.0.busy()
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        self.0.stop()
    }
    fn delete(&mut self, id: WaveId) -> Result<(), BoxError> {
        self.0.delete(id)
    }
}

#[test]
fn hardware_error_surfaces_after_de_energize() {
    let (dir_pin, _dir) = SimOutputPin::new();
    let (enable_pin, enable) = SimOutputPin::new();
    let (start_pin, _start) = SimSensor::new();
    let (end_pin, _end) = SimSensor::new();
    let mut axis = MotorAxis::builder()
        .config(axis_config())
        .dir_pin(dir_pin)
        .enable_pin(enable_pin)
        .start_sensor(start_pin)
        .end_sensor(end_pin)
        .wave_device(FailingWave(SimWaveDevice::new()))
        .clock(Arc::new(InstantClock))
        .try_build()
        .unwrap();

    let err = axis
        .run(&MotionRequest::Steps {
            count: 100,
            freq_hz: 500,
            dir: Direction::Forward,
        })
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TitratorError>(),
        Some(TitratorError::HardwareFault(_))
    ));
    // energized then forced back off before the error surfaced
    assert_eq!(enable.level(), Level::Low);
    assert_eq!(enable.writes(), 2);
}

#[test]
fn shared_cancel_flag_is_observable() {
    let rig = rig(false);
    let flag: Arc<AtomicBool> = rig.axis.cancel_flag();
    assert!(!flag.load(Ordering::SeqCst));
}
