//! One stepper axis: direction/step/enable pins plus two limit sensors.
//!
//! Motion runs through the shared wave unit; the axis interleaves wave
//! busy polling with sensor polling in the same ≤1 ms tick so a limit
//! trigger cancels an in-flight waveform within a few polls. The one
//! invariant everything here bends around: the enable pin is driven back
//! to its inactive level before any operation returns, success or not —
//! a motor must never be left energized.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use titrator_traits::{Clock, InputPin, Level, OutputPin, WaveDevice};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::pulse::{ChunkPlan, PeriodSplit, PulseTrain};
use crate::sensor::SensorGate;
use crate::wave::WaveformPlayer;

/// Immutable identity of one physical stepper driver.
#[derive(Debug, Clone, Copy)]
pub struct AxisConfig {
    pub dir_pin: u8,
    pub step_pin: u8,
    pub enable_pin: u8,
    pub start_sensor_pin: u8,
    pub end_sensor_pin: u8,
    pub step_freq_hz: u32,
    /// Level that energizes the driver; carriers differ.
    pub enable_active: Level,
}

/// Direction of travel. `Forward` drives toward the end sensor (burette
/// empty / valve at vessel), `Reverse` toward the start sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// The limit sensor this direction of travel runs into.
    pub fn target_sensor(self) -> SensorSel {
        match self {
            Direction::Forward => SensorSel::End,
            Direction::Reverse => SensorSel::Start,
        }
    }

    fn dir_level(self) -> Level {
        match self {
            Direction::Forward => Level::High,
            Direction::Reverse => Level::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSel {
    Start,
    End,
}

/// A single motion, submitted as data so queues can inspect and log it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionRequest {
    /// Step exactly `count` pulses at `freq_hz`.
    Steps {
        count: u64,
        freq_hz: u32,
        dir: Direction,
    },
    /// Run until the target sensor triggers (homing).
    UntilSensor {
        freq_hz: u32,
        dir: Direction,
        target: SensorSel,
    },
    /// Run for a fixed time; aborted immediately by either sensor.
    ForDuration {
        ms: u64,
        freq_hz: u32,
        dir: Direction,
    },
}

impl MotionRequest {
    /// Homing request with the target sensor matching the direction.
    pub fn homing(dir: Direction, freq_hz: u32) -> Self {
        MotionRequest::UntilSensor {
            freq_hz,
            dir,
            target: dir.target_sensor(),
        }
    }

    pub fn freq_hz(&self) -> u32 {
        match *self {
            MotionRequest::Steps { freq_hz, .. }
            | MotionRequest::UntilSensor { freq_hz, .. }
            | MotionRequest::ForDuration { freq_hz, .. } => freq_hz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All chunks played out.
    Completed,
    /// The target limit sensor went high; travel is physically bounded.
    SensorTriggered,
    /// Caller-initiated abort.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionOutcome {
    pub completed_steps: u64,
    pub reason: StopReason,
}

impl MotionOutcome {
    fn skipped() -> Self {
        Self {
            completed_steps: 0,
            reason: StopReason::SensorTriggered,
        }
    }
}

/// Seam for sequence/queue layers; lets tests drive scripts without
/// hardware.
pub trait Axis {
    fn name(&self) -> &str;
    fn execute(&mut self, req: &MotionRequest) -> Result<MotionOutcome>;
    /// Shared cooperative-cancel flag; setting it stops the current and
    /// all following motions until cleared.
    fn cancel_flag(&self) -> Arc<AtomicBool>;
}

pub struct MotorAxis<O: OutputPin, I: InputPin, W: WaveDevice> {
    name: String,
    cfg: AxisConfig,
    dir: O,
    enable: O,
    start_gate: SensorGate<I>,
    end_gate: SensorGate<I>,
    player: WaveformPlayer<W>,
    clock: Arc<dyn Clock + Send + Sync>,
    cancel: Arc<AtomicBool>,
    poll: Duration,
}

impl<O: OutputPin, I: InputPin, W: WaveDevice> MotorAxis<O, I, W> {
    /// Start building an axis.
    pub fn builder() -> crate::builder::MotorAxisBuilder<O, I, W> {
        crate::builder::MotorAxisBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        name: String,
        cfg: AxisConfig,
        dir: O,
        enable: O,
        start_sensor: I,
        end_sensor: I,
        wave: W,
        clock: Arc<dyn Clock + Send + Sync>,
        cancel: Arc<AtomicBool>,
        poll: Duration,
    ) -> Self {
        Self {
            name,
            start_gate: SensorGate::new(start_sensor, cfg.start_sensor_pin),
            end_gate: SensorGate::new(end_sensor, cfg.end_sensor_pin),
            player: WaveformPlayer::new(wave),
            dir,
            enable,
            cfg,
            clock,
            cancel,
            poll,
        }
    }

    pub fn config(&self) -> &AxisConfig {
        &self.cfg
    }

    /// Clear a latched cancel before a new run.
    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    fn gate(&mut self, sel: SensorSel) -> &mut SensorGate<I> {
        match sel {
            SensorSel::Start => &mut self.start_gate,
            SensorSel::End => &mut self.end_gate,
        }
    }

    fn energize(&mut self, dir: Direction) -> Result<()> {
        self.dir
            .write(dir.dir_level())
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set direction pin")?;
        self.enable
            .write(self.cfg.enable_active)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("energize driver")
    }

    fn de_energize(&mut self) -> Result<()> {
        self.enable
            .write(self.cfg.enable_active.inverted())
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("de-energize driver")
    }

    /// Run one motion to a terminal state. The driver is de-energized on
    /// every path out of here, including errors.
    pub fn run(&mut self, req: &MotionRequest) -> Result<MotionOutcome> {
        if self.cancel.load(Ordering::SeqCst) {
            return Ok(MotionOutcome {
                completed_steps: 0,
                reason: StopReason::Cancelled,
            });
        }

        // Refuse to drive into a limit that is already active.
        if let Some(target) = self.pre_motion_target(req)
            && self.gate(target).is_triggered()?
        {
            let gpio = self.gate(target).gpio();
            info!(axis = %self.name, gpio, "target sensor already high, skipping motion");
            return Ok(MotionOutcome::skipped());
        }

        let result = match self.energize(self.req_dir(req)) {
            Ok(()) => self.run_energized(req),
            Err(e) => Err(e),
        };
        if result.is_err() {
            // Waveform may still be in flight on the error path.
            if let Err(e) = self.player.stop() {
                warn!(axis = %self.name, error = %e, "wave stop failed during abort");
            }
        }
        match (result, self.de_energize()) {
            (Ok(out), Ok(())) => Ok(out),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn req_dir(&self, req: &MotionRequest) -> Direction {
        match *req {
            MotionRequest::Steps { dir, .. }
            | MotionRequest::UntilSensor { dir, .. }
            | MotionRequest::ForDuration { dir, .. } => dir,
        }
    }

    fn pre_motion_target(&self, req: &MotionRequest) -> Option<SensorSel> {
        match *req {
            MotionRequest::Steps { dir, .. } => Some(dir.target_sensor()),
            MotionRequest::UntilSensor { target, .. } => Some(target),
            // Time-bounded jogs rely on in-flight sensor aborts instead.
            MotionRequest::ForDuration { .. } => None,
        }
    }

    fn run_energized(&mut self, req: &MotionRequest) -> Result<MotionOutcome> {
        match *req {
            MotionRequest::Steps {
                count,
                freq_hz,
                dir,
            } => {
                let train = PulseTrain::new(self.cfg.step_pin, freq_hz, PeriodSplit::Quarter);
                let plan = ChunkPlan::for_steps(count);
                self.player.begin_counted(&train, &plan)?;
                self.poll_to_completion(&train, Some(count), Some(dir.target_sensor()), None, None)
            }
            MotionRequest::UntilSensor {
                freq_hz, target, ..
            } => {
                let train = PulseTrain::new(self.cfg.step_pin, freq_hz, PeriodSplit::Half);
                self.player.begin_repeating(&train)?;
                self.poll_to_completion(&train, None, Some(target), None, None)
            }
            MotionRequest::ForDuration { ms, freq_hz, .. } => {
                let count = ms.saturating_mul(u64::from(freq_hz)) / 1_000;
                let train = PulseTrain::new(self.cfg.step_pin, freq_hz, PeriodSplit::Half);
                let plan = ChunkPlan::for_steps(count);
                self.player.begin_counted(&train, &plan)?;

                // Either sensor aborts a jog; prefer edge callbacks, the
                // poll loop covers pins without callback support.
                let abort = Arc::new(AtomicBool::new(false));
                let watching_start = self.watch_gate(SensorSel::Start, &abort)?;
                let watching_end = self.watch_gate(SensorSel::End, &abort)?;
                let out = self.poll_to_completion(
                    &train,
                    Some(count),
                    Some(SensorSel::End),
                    Some(SensorSel::Start),
                    Some(&abort),
                );
                if watching_start {
                    self.start_gate.disable()?;
                }
                if watching_end {
                    self.end_gate.disable()?;
                }
                out
            }
        }
    }

    fn watch_gate(&mut self, sel: SensorSel, abort: &Arc<AtomicBool>) -> Result<bool> {
        let flag = abort.clone();
        self.gate(sel).on_edge(Box::new(move |level| {
            if level == Level::High {
                flag.store(true, Ordering::SeqCst);
            }
        }))
    }

    /// Shared busy/sensor poll loop. `expected_steps` is None for
    /// repeat-forever homing; completed steps on early stop are estimated
    /// from elapsed time at the commanded rate.
    fn poll_to_completion(
        &mut self,
        train: &PulseTrain,
        expected_steps: Option<u64>,
        primary: Option<SensorSel>,
        secondary: Option<SensorSel>,
        sensor_abort: Option<&AtomicBool>,
    ) -> Result<MotionOutcome> {
        let started = Instant::now();
        let estimate = |elapsed: Duration| -> u64 {
            let step_us = u64::from(train.hold_us()) * 2;
            let stepped = (elapsed.as_micros() as u64) / step_us.max(1);
            match expected_steps {
                Some(n) => stepped.min(n),
                None => stepped,
            }
        };

        loop {
            if !self.player.busy()? {
                return Ok(MotionOutcome {
                    completed_steps: expected_steps.unwrap_or_else(|| estimate(started.elapsed())),
                    reason: StopReason::Completed,
                });
            }
            if self.cancel.load(Ordering::SeqCst) {
                self.player.stop()?;
                debug!(axis = %self.name, "motion cancelled");
                return Ok(MotionOutcome {
                    completed_steps: estimate(started.elapsed()),
                    reason: StopReason::Cancelled,
                });
            }
            if let Some(flag) = sensor_abort
                && flag.load(Ordering::SeqCst)
            {
                self.player.stop()?;
                info!(axis = %self.name, "sensor edge stopped motion");
                return Ok(MotionOutcome {
                    completed_steps: estimate(started.elapsed()),
                    reason: StopReason::SensorTriggered,
                });
            }
            for sel in [primary, secondary].into_iter().flatten() {
                if self.gate(sel).is_triggered()? {
                    self.player.stop()?;
                    let gpio = self.gate(sel).gpio();
                    info!(axis = %self.name, gpio, "limit sensor stopped motion");
                    return Ok(MotionOutcome {
                        completed_steps: estimate(started.elapsed()),
                        reason: StopReason::SensorTriggered,
                    });
                }
            }
            self.clock.sleep(self.poll);
        }
    }
}

impl<O: OutputPin, I: InputPin, W: WaveDevice> Axis for MotorAxis<O, I, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, req: &MotionRequest) -> Result<MotionOutcome> {
        self.run(req)
    }

    fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }
}
