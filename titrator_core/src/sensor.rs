//! Limit-sensor gating.
//!
//! Limit sensors are pull-down biased and active-high for both the start
//! and end of travel. The gate is polled from the motion loop at the same
//! cadence as the wave busy check; time-bounded motions can additionally
//! register an edge callback for immediate aborts.

use eyre::WrapErr;
use titrator_traits::{InputPin, Level};
use tracing::trace;

use crate::error::Result;
use crate::hw_error::map_hw_error;

pub struct SensorGate<I: InputPin> {
    pin: I,
    gpio: u8,
    watching: bool,
}

impl<I: InputPin> SensorGate<I> {
    pub fn new(pin: I, gpio: u8) -> Self {
        Self {
            pin,
            gpio,
            watching: false,
        }
    }

    /// BCM pin number, for log context.
    pub fn gpio(&self) -> u8 {
        self.gpio
    }

    pub fn read(&mut self) -> Result<Level> {
        self.pin
            .read()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("read sensor GPIO {}", self.gpio))
    }

    /// A sensor is triggered when the line reads high.
    pub fn is_triggered(&mut self) -> Result<bool> {
        let level = self.read()?;
        if level == Level::High {
            trace!(gpio = self.gpio, "limit sensor high");
        }
        Ok(level == Level::High)
    }

    /// Register an edge callback. Falls back to `Ok(false)` when the pin
    /// implementation has no callback support, so callers can poll instead.
    pub fn on_edge(&mut self, callback: Box<dyn FnMut(Level) + Send>) -> Result<bool> {
        match self.pin.on_edge(callback) {
            Ok(()) => {
                self.watching = true;
                Ok(true)
            }
            Err(e) => {
                trace!(gpio = self.gpio, error = %e, "edge callback unavailable, polling");
                Ok(false)
            }
        }
    }

    /// Remove a registered edge callback; no-op when none was set.
    pub fn disable(&mut self) -> Result<()> {
        if !self.watching {
            return Ok(());
        }
        self.watching = false;
        self.pin
            .clear_edge()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("clear edge on GPIO {}", self.gpio))
    }
}
