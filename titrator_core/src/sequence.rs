//! Named motion procedures over the burette and valve axes.
//!
//! Each procedure is a fixed script of queued motions with settling
//! pauses between mechanical transitions. Sensor stops inside a script
//! are soft successes: the sensors, not the requested counts, are the
//! authoritative end of travel.

use std::sync::Arc;
use std::time::Duration;

use titrator_traits::Clock;
use tracing::info;

use crate::axis::{Direction, MotionOutcome, MotionRequest, StopReason};
use crate::calibration::DosingCalibration;
use crate::error::Result;
use crate::queue::{AxisId, AxisSet, CommandQueue};

/// Result of a metered dose, surfaced up to titration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseReport {
    pub requested_ml: f64,
    /// Volume actually metered, estimated from completed steps. Falls
    /// short of the request when the burette ran dry mid-dose.
    pub dispensed_ml: f64,
    pub full_cycles: u32,
    pub cut_short: bool,
}

pub struct SequenceController {
    axes: AxisSet,
    cal: DosingCalibration,
    burette_freq_hz: u32,
    valve_freq_hz: u32,
    settle: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SequenceController {
    pub fn new(
        axes: AxisSet,
        cal: DosingCalibration,
        burette_freq_hz: u32,
        valve_freq_hz: u32,
        settle: Duration,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            axes,
            cal,
            burette_freq_hz,
            valve_freq_hz,
            settle,
            clock,
        }
    }

    pub fn calibration(&self) -> &DosingCalibration {
        &self.cal
    }

    fn queue(&self) -> CommandQueue {
        CommandQueue::new(self.settle)
    }

    fn run(&mut self, mut queue: CommandQueue) -> Result<Vec<MotionOutcome>> {
        queue.run(&mut self.axes, &self.clock)
    }

    fn fill_request(&self) -> MotionRequest {
        MotionRequest::homing(Direction::Reverse, self.burette_freq_hz)
    }

    fn empty_request(&self) -> MotionRequest {
        MotionRequest::homing(Direction::Forward, self.burette_freq_hz)
    }

    fn valve_vessel_request(&self) -> MotionRequest {
        MotionRequest::homing(Direction::Forward, self.valve_freq_hz)
    }

    fn valve_bottle_request(&self) -> MotionRequest {
        MotionRequest::homing(Direction::Reverse, self.valve_freq_hz)
    }

    /// One empty+refill leg pair with the matching valve positions: the
    /// vessel port takes the expelled contents, the bottle port feeds the
    /// refill. Already-positioned valve homings are skipped by the axis
    /// pre-motion guard.
    fn push_cycle(&self, q: &mut CommandQueue) {
        q.push(AxisId::Valve, self.valve_vessel_request(), "valve to vessel");
        q.push(AxisId::Burette, self.empty_request(), "cycle empty");
        q.push(AxisId::Valve, self.valve_bottle_request(), "valve to bottle");
        q.push(AxisId::Burette, self.fill_request(), "cycle fill");
    }

    /// Connect the bottle, then retract the plunger until the start
    /// sensor triggers, drawing a full burette.
    pub fn fill_burette(&mut self) -> Result<()> {
        info!("filling burette");
        let mut q = self.queue();
        q.push(AxisId::Valve, self.valve_bottle_request(), "valve to bottle");
        q.push(AxisId::Burette, self.fill_request(), "fill");
        self.run(q).map(|_| ())
    }

    /// Connect the vessel, then drive the plunger until the end sensor
    /// triggers, expelling the burette contents.
    pub fn empty_burette(&mut self) -> Result<()> {
        info!("emptying burette");
        let mut q = self.queue();
        q.push(AxisId::Valve, self.valve_vessel_request(), "valve to vessel");
        q.push(AxisId::Burette, self.empty_request(), "empty");
        self.run(q).map(|_| ())
    }

    /// `cycles` repetitions of empty then refill, valve switched per leg.
    pub fn rinse_burette(&mut self, cycles: u32) -> Result<()> {
        info!(cycles, "rinsing burette");
        let mut q = self.queue();
        for _ in 0..cycles {
            self.push_cycle(&mut q);
        }
        self.run(q).map(|_| ())
    }

    /// Rotate the valve to connect the bottle to the burette (fill path).
    pub fn valve_to_bottle(&mut self) -> Result<()> {
        info!("valve to bottle");
        let mut q = self.queue();
        q.push(
            AxisId::Valve,
            MotionRequest::homing(Direction::Reverse, self.valve_freq_hz),
            "valve to bottle",
        );
        self.run(q).map(|_| ())
    }

    /// Rotate the valve to connect the burette to the vessel (dose path).
    pub fn valve_to_vessel(&mut self) -> Result<()> {
        info!("valve to vessel");
        let mut q = self.queue();
        q.push(
            AxisId::Valve,
            MotionRequest::homing(Direction::Forward, self.valve_freq_hz),
            "valve to vessel",
        );
        self.run(q).map(|_| ())
    }

    /// Meter `ml` into the vessel. Volumes beyond one burette of travel
    /// are realized as full empty+refill cycles followed by a counted
    /// partial dose; the counted dose is pre-guarded against an already
    /// empty burette by the axis itself.
    pub fn dose_volume(&mut self, ml: f64) -> Result<DoseReport> {
        let plan = self.cal.plan_dose(ml)?;
        info!(
            ml,
            full_cycles = plan.full_cycles,
            leftover_steps = plan.leftover_steps,
            "dosing"
        );

        let mut q = self.queue();
        for _ in 0..plan.full_cycles {
            self.push_cycle(&mut q);
        }
        q.push(AxisId::Valve, self.valve_vessel_request(), "valve to vessel");
        q.push(
            AxisId::Burette,
            MotionRequest::Steps {
                count: plan.leftover_steps,
                freq_hz: self.cal.dose_freq_hz(),
                dir: Direction::Forward,
            },
            "dose steps",
        );
        let queued = q.len();
        let outcomes = self.run(q)?;

        // The counted dose is always the last entry; each full cycle
        // before it contributed one burette.
        let last = outcomes.last();
        let metered_steps = match last {
            Some(out) if outcomes.len() == queued => out.completed_steps,
            _ => 0,
        };
        let cut_short = !matches!(
            last,
            Some(MotionOutcome {
                reason: StopReason::Completed,
                ..
            })
        ) || metered_steps < plan.leftover_steps
            || outcomes.len() < queued;
        let dispensed_ml = f64::from(plan.full_cycles) * self.cal.burette_max_ml()
            + self.cal.ml_for(metered_steps.min(plan.leftover_steps));
        if cut_short {
            info!(requested = ml, dispensed = dispensed_ml, "dose cut short");
        }
        Ok(DoseReport {
            requested_ml: ml,
            dispensed_ml,
            full_cycles: plan.full_cycles,
            cut_short,
        })
    }

    /// Meter `ml`, refilling once from the bottle when the burette runs
    /// dry mid-increment. Used by the titration loop, which doses in
    /// sub-burette increments and must keep making progress across a run
    /// longer than one burette.
    pub fn dose_with_refill(&mut self, ml: f64) -> Result<DoseReport> {
        let first = self.dose_volume(ml)?;
        if !first.cut_short {
            return Ok(first);
        }
        let remaining = (ml - first.dispensed_ml).max(0.0);
        info!(remaining, "burette ran dry; refilling to meter the remainder");
        self.clock.sleep(self.settle);
        self.fill_burette()?;
        self.clock.sleep(self.settle);
        let retry = self.dose_volume(remaining)?;
        Ok(DoseReport {
            requested_ml: ml,
            dispensed_ml: first.dispensed_ml + retry.dispensed_ml,
            full_cycles: first.full_cycles + retry.full_cycles,
            cut_short: retry.cut_short,
        })
    }
}
