//! Volume/step conversion for the burette drive.
//!
//! The burette screw advances a fixed number of motor steps per
//! millilitre dispensed; the factor comes from bench calibration and
//! lives in the config file. Conversions truncate toward zero so a dose
//! never overshoots the requested volume by rounding.

use crate::error::{Result, TitratorError};

#[derive(Debug, Clone, Copy)]
pub struct DosingCalibration {
    steps_per_ml: f64,
    burette_max_ml: f64,
    dose_freq_hz: u32,
}

impl DosingCalibration {
    pub fn new(steps_per_ml: f64, burette_max_ml: f64, dose_freq_hz: u32) -> Result<Self> {
        if !steps_per_ml.is_finite() || steps_per_ml <= 0.0 {
            return Err(TitratorError::InvalidInput(format!(
                "steps_per_ml must be positive, got {steps_per_ml}"
            ))
            .into());
        }
        if !burette_max_ml.is_finite() || burette_max_ml <= 0.0 {
            return Err(TitratorError::InvalidInput(format!(
                "burette_max_ml must be positive, got {burette_max_ml}"
            ))
            .into());
        }
        if dose_freq_hz == 0 {
            return Err(TitratorError::InvalidInput("dose frequency must be nonzero".into()).into());
        }
        Ok(Self {
            steps_per_ml,
            burette_max_ml,
            dose_freq_hz,
        })
    }

    pub fn steps_per_ml(&self) -> f64 {
        self.steps_per_ml
    }

    /// Usable burette capacity in millilitres.
    pub fn burette_max_ml(&self) -> f64 {
        self.burette_max_ml
    }

    /// Step rate used for metered dosing moves.
    pub fn dose_freq_hz(&self) -> u32 {
        self.dose_freq_hz
    }

    /// Motor steps for `ml`, truncated. Rejects negative, non-finite, and
    /// over-capacity volumes.
    pub fn steps_for(&self, ml: f64) -> Result<u64> {
        if !ml.is_finite() || ml < 0.0 {
            return Err(TitratorError::InvalidInput(format!(
                "volume must be a non-negative number, got {ml}"
            ))
            .into());
        }
        if ml > self.burette_max_ml {
            return Err(TitratorError::InvalidInput(format!(
                "volume {ml:.3} ml exceeds burette capacity {:.2} ml",
                self.burette_max_ml
            ))
            .into());
        }
        Ok((ml * self.steps_per_ml) as u64)
    }

    /// Volume represented by `steps`, the inverse of [`steps_for`][Self::steps_for].
    pub fn ml_for(&self, steps: u64) -> f64 {
        steps as f64 / self.steps_per_ml
    }

    /// Plan a dose that may exceed one burette of travel: each full
    /// burette is realized as an empty+refill cycle, the remainder as a
    /// direct step count.
    pub fn plan_dose(&self, ml: f64) -> Result<DosePlan> {
        if !ml.is_finite() || ml < 0.0 {
            return Err(TitratorError::InvalidInput(format!(
                "volume must be a non-negative number, got {ml}"
            ))
            .into());
        }
        let full_cycles = (ml / self.burette_max_ml).floor() as u32;
        let leftover_ml = ml - f64::from(full_cycles) * self.burette_max_ml;
        let leftover_steps = self.steps_for(leftover_ml)?;
        Ok(DosePlan {
            full_cycles,
            leftover_ml,
            leftover_steps,
        })
    }
}

/// How a requested volume decomposes into burette travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DosePlan {
    pub full_cycles: u32,
    pub leftover_ml: f64,
    pub leftover_steps: u64,
}
