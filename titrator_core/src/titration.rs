//! Closed-loop titration: dose, settle, re-sample, repeat.
//!
//! The loop reads pH from whatever sampler publishes it and doses
//! through whatever meters volume; both sit behind traits so the loop
//! itself is pure control logic. Two volumes come out of every run: the
//! volume at which the target pH was first reached (latched once, never
//! revised by overshoot) and the total volume dosed.

use std::sync::Arc;
use std::time::Duration;

use titrator_traits::Clock;
use tracing::{info, warn};

use crate::error::{Result, TitratorError};
use crate::sequence::{DoseReport, SequenceController};
use crate::util::round2;

pub const MIN_STEP_ML: f64 = 0.05;
pub const MAX_STEP_ML: f64 = 0.5;
pub const MIN_PH: f64 = 0.0;
pub const MAX_PH: f64 = 14.0;

/// Latest pH as published by the probe sampler. Never blocks.
pub trait PhSource {
    fn current_ph(&self) -> Result<f64>;
}

/// Volume metering seam; implemented by [`SequenceController`] and by
/// test scripts.
pub trait Dispenser {
    fn dispense(&mut self, ml: f64) -> Result<DoseReport>;
}

impl Dispenser for SequenceController {
    fn dispense(&mut self, ml: f64) -> Result<DoseReport> {
        self.dose_with_refill(ml)
    }
}

/// Validated titration inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitrationParams {
    step_ml: f64,
    target_ph: f64,
    max_volume_ml: f64,
    settle: Duration,
}

impl TitrationParams {
    pub fn new(step_ml: f64, target_ph: f64, max_volume_ml: f64, settle: Duration) -> Result<Self> {
        if !step_ml.is_finite() || !(MIN_STEP_ML..=MAX_STEP_ML).contains(&step_ml) {
            return Err(TitratorError::InvalidInput(format!(
                "step volume must be between {MIN_STEP_ML} and {MAX_STEP_ML} ml, got {step_ml}"
            ))
            .into());
        }
        if !target_ph.is_finite() || !(MIN_PH..=MAX_PH).contains(&target_ph) {
            return Err(TitratorError::InvalidInput(format!(
                "target pH must be between {MIN_PH} and {MAX_PH}, got {target_ph}"
            ))
            .into());
        }
        if !max_volume_ml.is_finite() || max_volume_ml <= 0.0 {
            return Err(TitratorError::InvalidInput(format!(
                "max volume must be positive, got {max_volume_ml}"
            ))
            .into());
        }
        Ok(Self {
            step_ml,
            target_ph: round2(target_ph),
            max_volume_ml,
            settle,
        })
    }

    pub fn step_ml(&self) -> f64 {
        self.step_ml
    }

    pub fn target_ph(&self) -> f64 {
        self.target_ph
    }

    pub fn max_volume_ml(&self) -> f64 {
        self.max_volume_ml
    }

    /// Dosing continues one pH unit past the target (clamped to the
    /// scale) so the endpoint is bracketed, not just touched.
    pub fn stop_threshold(&self) -> f64 {
        (self.target_ph + 1.0).min(MAX_PH)
    }
}

/// Terminal state of a titration run. `capped` means the volume cap, not
/// the pH threshold, ended the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitrationReport {
    pub volume_at_target_ml: Option<f64>,
    pub total_volume_ml: f64,
    pub final_ph: f64,
    pub doses: u32,
    pub capped: bool,
}

pub struct TitrationLoop<'a> {
    params: TitrationParams,
    clock: Arc<dyn Clock + Send + Sync>,
    ph: &'a dyn PhSource,
}

impl<'a> TitrationLoop<'a> {
    pub fn new(
        params: TitrationParams,
        ph: &'a dyn PhSource,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self { params, clock, ph }
    }

    /// Run to a terminal state. The cap is strict: an increment that
    /// would overshoot `max_volume_ml` is never started, so the total
    /// stays at the last completed full increment at or before the cap.
    pub fn run(&mut self, dispenser: &mut dyn Dispenser) -> Result<TitrationReport> {
        let p = self.params;
        let stop = p.stop_threshold();
        info!(
            target_ph = p.target_ph,
            stop_threshold = stop,
            step_ml = p.step_ml,
            max_volume_ml = p.max_volume_ml,
            "titration start"
        );

        let mut ph = self.ph.current_ph()?;
        let mut total = 0.0_f64;
        let mut doses = 0_u32;
        let mut volume_at_target = if ph >= p.target_ph { Some(0.0) } else { None };
        let mut capped = false;

        while ph < stop {
            if total + p.step_ml > p.max_volume_ml + 1e-9 {
                capped = true;
                break;
            }
            let report = dispenser.dispense(p.step_ml)?;
            if report.dispensed_ml <= 0.0 {
                // Even a refill produced nothing; pH can never move again.
                if volume_at_target.is_some() {
                    warn!(total_ml = round2(total), "reagent exhausted past the endpoint");
                    break;
                }
                return Err(TitratorError::State(format!(
                    "reagent exhausted at {:.2} ml before target pH {:.2}",
                    round2(total),
                    p.target_ph
                ))
                .into());
            }
            total += report.dispensed_ml;
            doses += 1;

            self.clock.sleep(p.settle);
            ph = self.ph.current_ph()?;
            info!(dose = doses, total_ml = round2(total), ph, "titration step");

            if volume_at_target.is_none() && ph >= p.target_ph {
                // Latched once; overshoot never revises it.
                volume_at_target = Some(round2(total));
            }
        }

        let total = round2(total);
        if volume_at_target.is_none() {
            warn!(
                total_ml = total,
                final_ph = ph,
                "volume cap reached before target pH; total volume is an approximation"
            );
        }
        info!(
            volume_at_target = ?volume_at_target,
            total_ml = total,
            final_ph = ph,
            capped,
            "titration finished"
        );
        Ok(TitrationReport {
            volume_at_target_ml: volume_at_target,
            total_volume_ml: total,
            final_ph: round2(ph),
            doses,
            capped,
        })
    }
}
