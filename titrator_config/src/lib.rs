#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the titrator.
//!
//! `Config` and sub-structs are deserialized from TOML and validated with
//! descriptive messages before any hardware is touched.

use serde::Deserialize;
use std::path::Path;

/// Pin map and drive parameters for one stepper axis.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AxisCfg {
    pub dir_pin: u8,
    pub step_pin: u8,
    pub enable_pin: u8,
    pub start_sensor_pin: u8,
    pub end_sensor_pin: u8,
    /// Step frequency in Hz for homing moves.
    pub step_freq_hz: u32,
    /// DRV8825 boards enable active-high, some carriers invert it.
    #[serde(default = "default_true")]
    pub enable_active_high: bool,
}

fn default_true() -> bool {
    true
}

/// Volume-to-steps calibration constants, fixed per instrument.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Burette plunger steps per millilitre.
    pub steps_per_ml: f64,
    /// Usable volume of one full burette travel.
    pub burette_max_ml: f64,
    /// Step frequency used while dosing (slower than homing).
    pub dose_freq_hz: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            steps_per_ml: 7704.16,
            burette_max_ml: 8.14,
            dose_freq_hz: 500,
        }
    }
}

/// Multi-axis procedure pacing.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SequenceCfg {
    /// Minimum wait between mechanical transitions (ms).
    pub settle_ms: u64,
    /// Default rinse repetitions.
    pub rinse_cycles: u32,
}

impl Default for SequenceCfg {
    fn default() -> Self {
        Self {
            settle_ms: 1000,
            rinse_cycles: 1,
        }
    }
}

/// Titration loop bounds and pacing.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TitrationCfg {
    /// Hard cap on total dosed volume per run (mL).
    pub max_volume_ml: f64,
    /// Wait after each increment before re-sampling pH (ms).
    pub settle_ms: u64,
    /// Smallest accepted dose increment (mL).
    pub min_step_ml: f64,
    /// Largest accepted dose increment (mL).
    pub max_step_ml: f64,
}

impl Default for TitrationCfg {
    fn default() -> Self {
        Self {
            max_volume_ml: 10.0,
            settle_ms: 1000,
            min_step_ml: 0.05,
            max_step_ml: 0.5,
        }
    }
}

/// Electrode probe sampling.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ProbeCfg {
    /// Background sampling period (ms).
    pub poll_period_ms: u64,
    /// Per-read timeout (ms).
    pub sample_timeout_ms: u64,
    /// I2C bus index for the ADS1115 when running on hardware.
    pub i2c_bus: u8,
    /// I2C address of the ADC.
    pub i2c_address: u16,
}

impl Default for ProbeCfg {
    fn default() -> Self {
        Self {
            poll_period_ms: 500,
            sample_timeout_ms: 150,
            i2c_bus: 1,
            i2c_address: 0x48,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// Path to a JSON-lines log file; console only when absent.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub burette: AxisCfg,
    pub valve: AxisCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub sequence: SequenceCfg,
    #[serde(default)]
    pub titration: TitrationCfg,
    #[serde(default)]
    pub probe: ProbeCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&content).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn validate_axis(name: &str, axis: &AxisCfg) -> eyre::Result<()> {
    if axis.step_freq_hz == 0 {
        eyre::bail!("{name}.step_freq_hz must be > 0");
    }
    if axis.step_freq_hz > 250_000 {
        eyre::bail!("{name}.step_freq_hz is unreasonably high (>250kHz)");
    }
    let pins = [
        axis.dir_pin,
        axis.step_pin,
        axis.enable_pin,
        axis.start_sensor_pin,
        axis.end_sensor_pin,
    ];
    for (i, a) in pins.iter().enumerate() {
        for b in pins.iter().skip(i + 1) {
            if a == b {
                eyre::bail!("{name} pin map assigns GPIO {a} twice");
            }
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        validate_axis("burette", &self.burette)?;
        validate_axis("valve", &self.valve)?;

        // Calibration
        if !(self.calibration.steps_per_ml > 0.0) {
            eyre::bail!("calibration.steps_per_ml must be > 0");
        }
        if !(self.calibration.burette_max_ml > 0.0) {
            eyre::bail!("calibration.burette_max_ml must be > 0");
        }
        if self.calibration.dose_freq_hz == 0 {
            eyre::bail!("calibration.dose_freq_hz must be > 0");
        }

        // Sequence
        if self.sequence.settle_ms > 60_000 {
            eyre::bail!("sequence.settle_ms is unreasonably large (>60s)");
        }

        // Titration
        if !(self.titration.max_volume_ml > 0.0) {
            eyre::bail!("titration.max_volume_ml must be > 0");
        }
        if !(self.titration.min_step_ml > 0.0) {
            eyre::bail!("titration.min_step_ml must be > 0");
        }
        if self.titration.max_step_ml < self.titration.min_step_ml {
            eyre::bail!("titration.max_step_ml must be >= titration.min_step_ml");
        }
        if self.titration.settle_ms == 0 {
            eyre::bail!("titration.settle_ms must be >= 1");
        }

        // Probe
        if self.probe.poll_period_ms == 0 {
            eyre::bail!("probe.poll_period_ms must be >= 1");
        }
        if self.probe.sample_timeout_ms == 0 {
            eyre::bail!("probe.sample_timeout_ms must be >= 1");
        }

        Ok(())
    }
}

/// Sample config matching the reference instrument wiring; used by tests
/// and as a template for `titrator_config.toml`.
pub const SAMPLE_CONFIG: &str = r#"
[burette]
dir_pin = 13
step_pin = 19
enable_pin = 12
start_sensor_pin = 16
end_sensor_pin = 7
step_freq_hz = 1000

[valve]
dir_pin = 24
step_pin = 18
enable_pin = 4
start_sensor_pin = 8
end_sensor_pin = 25
step_freq_hz = 75

[calibration]
steps_per_ml = 7704.16
burette_max_ml = 8.14
dose_freq_hz = 500

[sequence]
settle_ms = 1000
rinse_cycles = 1

[titration]
max_volume_ml = 10.0
settle_ms = 1000
min_step_ml = 0.05
max_step_ml = 0.5

[probe]
poll_period_ms = 500
sample_timeout_ms = 150
i2c_bus = 1
i2c_address = 0x48
"#;
