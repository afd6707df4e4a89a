//! Property tests for pulse chunking and calibration arithmetic.

use proptest::prelude::*;
use titrator_core::pulse::{ChunkPlan, MAX_WAVE_PULSES, PeriodSplit, PulseTrain};
use titrator_core::util::edge_hold_us;
use titrator_core::{DosingCalibration, Direction};

proptest! {
    #[test]
    fn chunks_sum_to_exact_step_count(steps in 0u64..200_000) {
        let plan = ChunkPlan::for_steps(steps);
        prop_assert_eq!(plan.total_steps(), steps);
        prop_assert!(plan.batch_size <= MAX_WAVE_PULSES);
        prop_assert!(plan.leftover < MAX_WAVE_PULSES);
    }

    #[test]
    fn chunk_count_is_ceiling_division(steps in 0u64..200_000) {
        let plan = ChunkPlan::for_steps(steps);
        prop_assert_eq!(plan.chunk_count(), steps.div_ceil(MAX_WAVE_PULSES));
    }

    #[test]
    fn batches_alternate_rising_and_falling(pulses in 1u64..500, pin in 0u8..28) {
        let train = PulseTrain::new(pin, 500, PeriodSplit::Quarter);
        let events = train.batch(pulses);
        prop_assert_eq!(events.len() as u64, pulses * 2);
        for pair in events.chunks(2) {
            prop_assert_eq!(pair[0].rising_mask, 1u32 << pin);
            prop_assert_eq!(pair[0].falling_mask, 0);
            prop_assert_eq!(pair[1].falling_mask, 1u32 << pin);
            prop_assert_eq!(pair[1].rising_mask, 0);
        }
    }

    #[test]
    fn edge_hold_never_collapses_to_zero(freq in 1u32..10_000_000, div in 2u32..5) {
        prop_assert!(edge_hold_us(freq, div) >= 1);
    }

    #[test]
    fn steps_for_is_monotone(a in 0.0f64..8.0, b in 0.0f64..8.0) {
        let cal = DosingCalibration::new(7704.16, 8.14, 500).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(cal.steps_for(lo).unwrap() <= cal.steps_for(hi).unwrap());
    }

    #[test]
    fn homing_target_matches_direction(forward in any::<bool>()) {
        let dir = if forward { Direction::Forward } else { Direction::Reverse };
        let req = titrator_core::MotionRequest::homing(dir, 1_000);
        let titrator_core::MotionRequest::UntilSensor { target, .. } = req else {
            panic!("homing must be an until-sensor request");
        };
        prop_assert_eq!(target, dir.target_sensor());
    }
}

#[test]
fn zero_steps_yield_an_empty_plan() {
    let plan = ChunkPlan::for_steps(0);
    assert!(plan.is_empty());
    assert_eq!(plan.chunk_count(), 0);
}
