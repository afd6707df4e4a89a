//! Waveform upload and playback over the shared wave unit.
//!
//! The wave unit is a single non-reentrant hardware resource: uploading a
//! new batch clears whatever was built before, and only one transmission
//! runs at a time. `WaveformPlayer` owns that discipline; callers poll
//! `busy()` at the motion loop's cadence and interleave sensor checks.

use eyre::WrapErr;
use titrator_traits::{WaveDevice, WavePlan};
use tracing::debug;

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::pulse::{ChunkPlan, PulseTrain};

pub struct WaveformPlayer<W: WaveDevice> {
    dev: W,
    transmitting: bool,
}

impl<W: WaveDevice> WaveformPlayer<W> {
    pub fn new(dev: W) -> Self {
        Self {
            dev,
            transmitting: false,
        }
    }

    /// Transmit exactly `plan.total_steps()` pulses: the main batch chained
    /// `repeats` times, then the leftover batch once. Zero steps is an
    /// immediate success with nothing uploaded.
    pub fn begin_counted(&mut self, train: &PulseTrain, plan: &ChunkPlan) -> Result<()> {
        if plan.is_empty() {
            self.transmitting = false;
            return Ok(());
        }
        self.clear()?;

        let mut leftover_wave = None;
        let mut main_wave = None;
        if plan.repeats > 0 {
            self.add_batch(train, plan.batch_size)?;
            main_wave = Some(self.create()?);
        }
        if plan.leftover > 0 {
            self.add_batch(train, plan.leftover)?;
            leftover_wave = Some(self.create()?);
        }

        let wave_plan = match (main_wave, leftover_wave) {
            (Some(main), tail) => WavePlan::Repeat {
                wave: main,
                times: plan.repeats as u32,
                then: tail,
            },
            (None, Some(tail)) => WavePlan::Once(tail),
            (None, None) => unreachable!("non-empty plan with no waves"),
        };
        debug!(
            repeats = plan.repeats,
            leftover = plan.leftover,
            hold_us = train.hold_us(),
            "wave chain transmit"
        );
        self.dev
            .transmit(wave_plan)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave transmit")?;
        self.transmitting = true;
        Ok(())
    }

    /// Transmit one full batch on repeat until stopped; used for homing
    /// where the limit sensor, not a count, ends the motion.
    pub fn begin_repeating(&mut self, train: &PulseTrain) -> Result<()> {
        self.clear()?;
        self.add_batch(train, crate::pulse::MAX_WAVE_PULSES)?;
        let wave = self.create()?;
        debug!(hold_us = train.hold_us(), "wave repeat transmit");
        self.dev
            .transmit(WavePlan::Forever(wave))
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave transmit")?;
        self.transmitting = true;
        Ok(())
    }

    /// Whether a transmission is still in flight. A counted plan that was
    /// empty reports not busy without touching the device.
    pub fn busy(&mut self) -> Result<bool> {
        if !self.transmitting {
            return Ok(false);
        }
        let busy = self
            .dev
            .busy()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave busy query")?;
        if !busy {
            self.transmitting = false;
        }
        Ok(busy)
    }

    /// Stop the in-flight transmission; remaining chained batches are
    /// discarded by the device.
    pub fn stop(&mut self) -> Result<()> {
        if !self.transmitting {
            return Ok(());
        }
        self.transmitting = false;
        self.dev
            .stop()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave stop")
    }

    fn clear(&mut self) -> Result<()> {
        self.dev
            .clear()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave clear")
    }

    fn add_batch(&mut self, train: &PulseTrain, pulses: u64) -> Result<()> {
        let events = train.batch(pulses);
        self.dev
            .add(&events)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave add")?;
        Ok(())
    }

    fn create(&mut self) -> Result<titrator_traits::WaveId> {
        self.dev
            .create()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("wave create")
    }
}
