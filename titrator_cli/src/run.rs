//! Hardware assembly and command execution.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::WrapErr;
use serde_json::json;
use titrator_config::Config;
use titrator_core::error::Result;
use titrator_core::{
    AxisSet, DosingCalibration, MotorAxis, PhSource, ProbeSampler, SequenceController,
    TitrationLoop, TitrationParams, TitratorError,
};
use titrator_traits::{Clock, MonotonicClock, Probe};
use tracing::info;

use crate::cli::{Commands, ValvePosition};

/// Sim homing travel time at the ~1 ms motion poll, in polls.
const SIM_TRAVEL_POLLS: u32 = 250;
/// Sim waveform playback runs this many times faster than real time.
const SIM_TIME_SCALE: u32 = 1_000;

/// One assembled instrument: both axes behind the sequence controller,
/// plus the background probe sampler.
pub struct Station {
    sequence: SequenceController,
    sampler: ProbeSampler,
    rinse_cycles: u32,
    titration: titrator_config::TitrationCfg,
    probe_poll_ms: u64,
}

/// What a command run reports: one human line and one JSON object.
pub struct Outcome {
    pub human: String,
    pub json: serde_json::Value,
}

fn build_axes<F, O, I, W>(
    cfg: &Config,
    cancel: &Arc<AtomicBool>,
    clock: &Arc<dyn Clock + Send + Sync>,
    mut parts: F,
) -> Result<AxisSet>
where
    F: FnMut(&titrator_config::AxisCfg) -> Result<(O, O, I, I, W)>,
    O: titrator_traits::OutputPin + 'static,
    I: titrator_traits::InputPin + 'static,
    W: titrator_traits::WaveDevice + 'static,
{
    let mut build_one = |name: &str, axis_cfg: &titrator_config::AxisCfg| -> Result<Box<dyn titrator_core::Axis>> {
        let (dir, enable, start, end, wave) = parts(axis_cfg)?;
        let axis: MotorAxis<O, I, W> = MotorAxis::builder()
            .name(name)
            .config(axis_cfg.into())
            .dir_pin(dir)
            .enable_pin(enable)
            .start_sensor(start)
            .end_sensor(end)
            .wave_device(wave)
            .clock(clock.clone())
            .cancel_flag(cancel.clone())
            .try_build()
            .wrap_err_with(|| format!("assemble {name} axis"))?;
        Ok(Box::new(axis))
    };
    Ok(AxisSet {
        burette: build_one("burette", &cfg.burette)?,
        valve: build_one("valve", &cfg.valve)?,
    })
}

fn build_station<P: Probe + Send + 'static>(
    cfg: &Config,
    axes: AxisSet,
    probe: P,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<Station> {
    let sampler = ProbeSampler::spawn(
        probe,
        Duration::from_millis(cfg.probe.poll_period_ms),
        Duration::from_millis(cfg.probe.sample_timeout_ms),
        MonotonicClock::new(),
    );
    let sequence = SequenceController::new(
        axes,
        DosingCalibration::from_cfg(&cfg.calibration)?,
        cfg.burette.step_freq_hz,
        cfg.valve.step_freq_hz,
        Duration::from_millis(cfg.sequence.settle_ms),
        clock,
    );
    Ok(Station {
        sequence,
        sampler,
        rinse_cycles: cfg.sequence.rinse_cycles,
        titration: cfg.titration,
        probe_poll_ms: cfg.probe.poll_period_ms,
    })
}

/// Simulated instrument: sensors "arrive" after a fixed travel time and
/// waveform playback runs in compressed time.
pub fn build_sim_station(cfg: &Config, cancel: &Arc<AtomicBool>) -> Result<Station> {
    use titrator_hardware::{SimOutputPin, SimProbe, SimTravelSensor, SimWaveDevice};

    info!("assembling simulated instrument");
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let axes = build_axes(cfg, cancel, &clock, |_axis_cfg| {
        let (dir, _) = SimOutputPin::new();
        let (enable, _) = SimOutputPin::new();
        Ok((
            dir,
            enable,
            SimTravelSensor::new(SIM_TRAVEL_POLLS),
            SimTravelSensor::new(SIM_TRAVEL_POLLS),
            SimWaveDevice::with_time_scale(SIM_TIME_SCALE),
        ))
    })?;
    // Acid start point drifting toward neutral as titrant is added.
    build_station(cfg, axes, SimProbe::default(), clock)
}

/// Real instrument on Raspberry Pi GPIO + ADS1115.
#[cfg(feature = "hardware")]
pub fn build_hw_station(cfg: &Config, cancel: &Arc<AtomicBool>) -> Result<Station> {
    use titrator_hardware::ads1115::Ads1115Probe;
    use titrator_hardware::gpio::{GpioWaveDevice, RppalInput, RppalOutput};

    info!("assembling GPIO instrument");
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let axes = build_axes(cfg, cancel, &clock, |axis_cfg| {
        Ok((
            RppalOutput::new(axis_cfg.dir_pin)?,
            RppalOutput::new(axis_cfg.enable_pin)?,
            RppalInput::new(axis_cfg.start_sensor_pin)?,
            RppalInput::new(axis_cfg.end_sensor_pin)?,
            GpioWaveDevice::new(axis_cfg.step_pin)?,
        ))
    })?;
    let probe = Ads1115Probe::new(cfg.probe.i2c_bus, cfg.probe.i2c_address)
        .wrap_err("open ADS1115 probe")?;
    build_station(cfg, axes, probe, clock)
}

impl Station {
    pub fn execute(&mut self, cmd: &Commands) -> Result<Outcome> {
        match cmd {
            Commands::Fill => {
                self.sequence.fill_burette()?;
                Ok(Outcome {
                    human: "burette filled".into(),
                    json: json!({ "command": "fill", "ok": true }),
                })
            }
            Commands::Empty => {
                self.sequence.empty_burette()?;
                Ok(Outcome {
                    human: "burette emptied".into(),
                    json: json!({ "command": "empty", "ok": true }),
                })
            }
            Commands::Rinse { cycles } => {
                let cycles = cycles.unwrap_or(self.rinse_cycles);
                self.sequence.rinse_burette(cycles)?;
                Ok(Outcome {
                    human: format!("burette rinsed ({cycles} cycles)"),
                    json: json!({ "command": "rinse", "ok": true, "cycles": cycles }),
                })
            }
            Commands::Valve { position } => {
                let name = match position {
                    ValvePosition::Bottle => {
                        self.sequence.valve_to_bottle()?;
                        "bottle"
                    }
                    ValvePosition::Vessel => {
                        self.sequence.valve_to_vessel()?;
                        "vessel"
                    }
                };
                Ok(Outcome {
                    human: format!("valve at {name}"),
                    json: json!({ "command": "valve", "ok": true, "position": name }),
                })
            }
            Commands::Dose { ml } => {
                let report = self.sequence.dose_volume(*ml)?;
                let human = if report.cut_short {
                    format!(
                        "dose cut short: {:.3} of {:.3} ml dispensed",
                        report.dispensed_ml, report.requested_ml
                    )
                } else {
                    format!("dosed {:.3} ml", report.dispensed_ml)
                };
                Ok(Outcome {
                    human,
                    json: json!({
                        "command": "dose",
                        "ok": !report.cut_short,
                        "requested_ml": report.requested_ml,
                        "dispensed_ml": report.dispensed_ml,
                        "full_cycles": report.full_cycles,
                    }),
                })
            }
            Commands::Titrate { step_ml, target_ph } => self.titrate(*step_ml, *target_ph),
            Commands::SelfCheck => self.self_check(),
        }
    }

    fn titrate(&mut self, step_ml: f64, target_ph: f64) -> Result<Outcome> {
        if step_ml < self.titration.min_step_ml || step_ml > self.titration.max_step_ml {
            return Err(TitratorError::InvalidInput(format!(
                "step volume must be between {} and {} ml, got {step_ml}",
                self.titration.min_step_ml, self.titration.max_step_ml
            ))
            .into());
        }
        let params = TitrationParams::new(
            step_ml,
            target_ph,
            self.titration.max_volume_ml,
            Duration::from_millis(self.titration.settle_ms),
        )?;

        self.wait_for_probe()?;

        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
        let report = TitrationLoop::new(params, &self.sampler, clock).run(&mut self.sequence)?;

        let human = match report.volume_at_target_ml {
            Some(v) => format!(
                "target pH {:.2} reached at {v:.2} ml (total dosed {:.2} ml, final pH {:.2})",
                params.target_ph(),
                report.total_volume_ml,
                report.final_ph
            ),
            None => format!(
                "target pH not reached before the {:.1} ml cap; dosed {:.2} ml (approximation), final pH {:.2}",
                params.max_volume_ml(),
                report.total_volume_ml,
                report.final_ph
            ),
        };
        Ok(Outcome {
            human,
            json: json!({
                "command": "titrate",
                "ok": report.volume_at_target_ml.is_some(),
                "target_ph": params.target_ph(),
                "volume_at_target_ml": report.volume_at_target_ml,
                "total_volume_ml": report.total_volume_ml,
                "final_ph": report.final_ph,
                "doses": report.doses,
                "capped": report.capped,
            }),
        })
    }

    /// Home the valve and exercise the burette drive pins with a
    /// zero-length dose, then confirm the sampler publishes fresh
    /// readings; no liquid moves.
    fn self_check(&mut self) -> Result<Outcome> {
        self.sequence.dose_volume(0.0).wrap_err("axis pin check")?;
        let ph = self.wait_for_probe()?;
        let sample = self.sampler.latest();
        let stalled_ms = self.sampler.stalled_for_now();
        let stale_after = self.probe_poll_ms.saturating_mul(3).max(250);
        if stalled_ms > stale_after {
            return Err(TitratorError::Timeout)
                .wrap_err_with(|| format!("probe stalled for {stalled_ms} ms"));
        }
        Ok(Outcome {
            human: format!("self-check ok (pH {ph:.2}, probe fresh within {stalled_ms} ms)"),
            json: json!({
                "command": "self-check",
                "ok": true,
                "ph": ph,
                "millivolts": sample.map(|s| s.millivolts),
                "temperature_c": sample.map(|s| s.temperature_c),
                "probe_stalled_ms": stalled_ms,
            }),
        })
    }

    /// Block briefly until the sampler has published at least one value.
    fn wait_for_probe(&self) -> Result<f64> {
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            match self.sampler.current_ph() {
                Ok(ph) => return Ok(ph),
                Err(e) if std::time::Instant::now() >= deadline => {
                    return Err(e).wrap_err("no probe reading within 3s");
                }
                Err(_) => std::thread::sleep(Duration::from_millis(20)),
            }
        }
    }
}
