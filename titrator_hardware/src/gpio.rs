//! rppal-backed pins and a software-timed wave player.
//!
//! The Pi's DMA wave engine is not exposed by rppal, so `GpioWaveDevice`
//! reproduces the same contract in software: built waves are played from a
//! dedicated thread that toggles the step pin with microsecond pacing.
//! Host-side overhead stays O(chunks) for callers because a whole plan is
//! handed to the thread in one call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use titrator_traits::{
    BoxError, InputPin, Level, OutputPin, PulseEvent, WaveDevice, WaveId, WavePlan,
};

use crate::error::HwError;
use crate::util::precise_delay_us;

fn gpio() -> Result<rppal::gpio::Gpio, HwError> {
    rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

pub struct RppalOutput {
    pin: rppal::gpio::OutputPin,
}

impl RppalOutput {
    pub fn new(bcm_pin: u8) -> Result<Self, HwError> {
        let pin = gpio()?
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output_low();
        Ok(Self { pin })
    }
}

impl OutputPin for RppalOutput {
    fn write(&mut self, level: Level) -> Result<(), BoxError> {
        match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        }
        Ok(())
    }
}

/// Input with pull-down bias; limit sensors are active-high.
pub struct RppalInput {
    pin: rppal::gpio::InputPin,
}

impl RppalInput {
    pub fn new(bcm_pin: u8) -> Result<Self, HwError> {
        let pin = gpio()?
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pulldown();
        Ok(Self { pin })
    }
}

impl InputPin for RppalInput {
    fn read(&mut self) -> Result<Level, BoxError> {
        Ok(if self.pin.is_high() {
            Level::High
        } else {
            Level::Low
        })
    }

    fn on_edge(&mut self, mut callback: Box<dyn FnMut(Level) + Send>) -> Result<(), BoxError> {
        self.pin
            .set_async_interrupt(rppal::gpio::Trigger::Both, move |level| {
                callback(match level {
                    rppal::gpio::Level::High => Level::High,
                    rppal::gpio::Level::Low => Level::Low,
                })
            })
            .map_err(|e| Box::new(HwError::Gpio(e.to_string())) as BoxError)
    }

    fn clear_edge(&mut self) -> Result<(), BoxError> {
        self.pin
            .clear_async_interrupt()
            .map_err(|e| Box::new(HwError::Gpio(e.to_string())) as BoxError)
    }
}

/// Software wave engine bound to one step pin.
pub struct GpioWaveDevice {
    step_pin_mask: u32,
    pin: Arc<Mutex<rppal::gpio::OutputPin>>,
    building: Option<Vec<PulseEvent>>,
    created: HashMap<u32, Arc<Vec<PulseEvent>>>,
    next_id: u32,
    max_pulses: usize,
    playing: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl GpioWaveDevice {
    /// Hardware-observed ceiling on a single wave buffer (edge events).
    pub const MAX_WAVE_EVENTS: usize = 5000 * 2;

    pub fn new(step_bcm_pin: u8) -> Result<Self, HwError> {
        let pin = gpio()?
            .get(step_bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output_low();
        Ok(Self {
            step_pin_mask: 1u32 << step_bcm_pin,
            pin: Arc::new(Mutex::new(pin)),
            building: None,
            created: HashMap::new(),
            next_id: 0,
            max_pulses: Self::MAX_WAVE_EVENTS,
            playing: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            tracing::warn!("wave playback thread panicked");
        }
    }

    fn play_events(
        pin: &mut rppal::gpio::OutputPin,
        mask: u32,
        events: &[PulseEvent],
        cancel: &AtomicBool,
    ) -> bool {
        for ev in events {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if ev.rising_mask & mask != 0 {
                pin.set_high();
            }
            if ev.falling_mask & mask != 0 {
                pin.set_low();
            }
            precise_delay_us(u64::from(ev.hold_us));
        }
        true
    }
}

impl WaveDevice for GpioWaveDevice {
    fn clear(&mut self) -> Result<(), BoxError> {
        self.building = None;
        self.created.clear();
        Ok(())
    }

    fn add(&mut self, events: &[PulseEvent]) -> Result<usize, BoxError> {
        let building = self.building.get_or_insert_with(Vec::new);
        if building.len() + events.len() > self.max_pulses {
            return Err(Box::new(HwError::WaveBufferFull(
                building.len() + events.len(),
            )));
        }
        building.extend_from_slice(events);
        Ok(building.len())
    }

    fn create(&mut self) -> Result<WaveId, BoxError> {
        let events = self.building.take().ok_or(HwError::NoWave)?;
        let id = self.next_id;
        self.next_id += 1;
        self.created.insert(id, Arc::new(events));
        Ok(WaveId(id))
    }

    fn transmit(&mut self, plan: WavePlan) -> Result<(), BoxError> {
        // Only one transmission at a time; a new plan preempts the old.
        self.cancel.store(true, Ordering::SeqCst);
        self.join_worker();

        let lookup = |id: WaveId| -> Result<Arc<Vec<PulseEvent>>, BoxError> {
            self.created
                .get(&id.0)
                .cloned()
                .ok_or_else(|| Box::new(HwError::UnknownWave(id.0)) as BoxError)
        };
        let (main, times, then, forever) = match plan {
            WavePlan::Once(id) => (lookup(id)?, 1u32, None, false),
            WavePlan::Repeat { wave, times, then } => {
                let tail = match then {
                    Some(t) => Some(lookup(t)?),
                    None => None,
                };
                (lookup(wave)?, times, tail, false)
            }
            WavePlan::Forever(id) => (lookup(id)?, 0, None, true),
        };

        let mask = self.step_pin_mask;
        self.cancel.store(false, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        let playing = self.playing.clone();
        let cancel = self.cancel.clone();
        let shared_pin = self.pin.clone();

        let worker = std::thread::spawn(move || {
            let mut pin = shared_pin.lock().unwrap_or_else(|e| e.into_inner());
            if forever {
                while Self::play_events(&mut pin, mask, &main, &cancel) {}
            } else {
                let mut done = true;
                for _ in 0..times {
                    if !Self::play_events(&mut pin, mask, &main, &cancel) {
                        done = false;
                        break;
                    }
                }
                if done && let Some(tail) = then {
                    Self::play_events(&mut pin, mask, &tail, &cancel);
                }
            }
            pin.set_low();
            playing.store(false, Ordering::SeqCst);
        });
        self.worker = Some(worker);
        Ok(())
    }

    fn busy(&mut self) -> Result<bool, BoxError> {
        Ok(self.playing.load(Ordering::SeqCst))
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&mut self, id: WaveId) -> Result<(), BoxError> {
        self.created.remove(&id.0);
        Ok(())
    }
}

impl Drop for GpioWaveDevice {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.join_worker();
    }
}
