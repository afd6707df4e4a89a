//! Pulse-train construction for stepper motion.
//!
//! A step is a rising edge followed by a falling edge on the step pin, each
//! held for one edge period. The wave unit caps how many edge events fit in
//! a single buffer, so step counts are planned as a repeated main batch plus
//! one leftover batch; the same batch buffer with a repeat count covers most
//! of the travel without per-step host work.

use titrator_traits::PulseEvent;

use crate::util::edge_hold_us;

/// Largest number of step pulses that fit in one wave buffer.
pub const MAX_WAVE_PULSES: u64 = 5000;

/// How the step period is split across the two edge holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSplit {
    /// Symmetric half-periods; standard for homing moves.
    Half,
    /// Quarter-periods, leaving headroom for driver dir/enable setup;
    /// used for counted dose moves.
    Quarter,
}

impl PeriodSplit {
    #[inline]
    fn divisor(self) -> u32 {
        match self {
            PeriodSplit::Half => 2,
            PeriodSplit::Quarter => 4,
        }
    }
}

/// Builds batches of step-pin edge events at a fixed frequency.
#[derive(Debug, Clone, Copy)]
pub struct PulseTrain {
    step_pin_mask: u32,
    hold_us: u32,
}

impl PulseTrain {
    pub fn new(step_bcm_pin: u8, freq_hz: u32, split: PeriodSplit) -> Self {
        Self {
            step_pin_mask: 1u32 << step_bcm_pin,
            hold_us: edge_hold_us(freq_hz, split.divisor()),
        }
    }

    /// Edge hold time in microseconds.
    pub fn hold_us(&self) -> u32 {
        self.hold_us
    }

    /// Build one batch of `pulses` steps (2 edge events per step).
    pub fn batch(&self, pulses: u64) -> Vec<PulseEvent> {
        let mut events = Vec::with_capacity((pulses as usize) * 2);
        for _ in 0..pulses {
            events.push(PulseEvent {
                rising_mask: self.step_pin_mask,
                falling_mask: 0,
                hold_us: self.hold_us,
            });
            events.push(PulseEvent {
                rising_mask: 0,
                falling_mask: self.step_pin_mask,
                hold_us: self.hold_us,
            });
        }
        events
    }
}

/// Chunking plan for a counted motion: `repeats` plays of a full
/// `MAX_WAVE_PULSES` batch plus one `leftover` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub batch_size: u64,
    pub repeats: u64,
    pub leftover: u64,
}

impl ChunkPlan {
    pub fn for_steps(step_count: u64) -> Self {
        Self::with_batch_size(step_count, MAX_WAVE_PULSES)
    }

    pub fn with_batch_size(step_count: u64, batch_size: u64) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            repeats: step_count / batch_size,
            leftover: step_count % batch_size,
        }
    }

    /// Number of wave plays needed: `ceil(step_count / batch_size)`.
    pub fn chunk_count(&self) -> u64 {
        self.repeats + u64::from(self.leftover != 0)
    }

    pub fn total_steps(&self) -> u64 {
        self.repeats * self.batch_size + self.leftover
    }

    pub fn is_empty(&self) -> bool {
        self.total_steps() == 0
    }
}
