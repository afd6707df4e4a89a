//! Bridging impls from `titrator_config` types to core types.

use titrator_traits::Level;

use crate::axis::AxisConfig;
use crate::calibration::DosingCalibration;
use crate::error::Result;

impl From<&titrator_config::AxisCfg> for AxisConfig {
    fn from(c: &titrator_config::AxisCfg) -> Self {
        Self {
            dir_pin: c.dir_pin,
            step_pin: c.step_pin,
            enable_pin: c.enable_pin,
            start_sensor_pin: c.start_sensor_pin,
            end_sensor_pin: c.end_sensor_pin,
            step_freq_hz: c.step_freq_hz,
            enable_active: if c.enable_active_high {
                Level::High
            } else {
                Level::Low
            },
        }
    }
}

impl DosingCalibration {
    /// Calibration from the config file; fails on out-of-range constants.
    pub fn from_cfg(c: &titrator_config::CalibrationCfg) -> Result<Self> {
        DosingCalibration::new(c.steps_per_ml, c.burette_max_ml, c.dose_freq_hz)
    }
}
