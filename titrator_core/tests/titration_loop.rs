//! TitrationLoop control behavior against simulated chemistry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rstest::rstest;
use titrator_core::sequence::DoseReport;
use titrator_core::titration::{Dispenser, PhSource, TitrationLoop, TitrationParams};
use titrator_core::{Result, mocks::InstantClock};

const SETTLE: Duration = Duration::from_millis(1000);

/// Vessel model: pH rises linearly with each dose.
struct Vessel {
    doses: Arc<AtomicU32>,
    start_ph: f64,
    ph_per_dose: f64,
}

impl Vessel {
    fn new(start_ph: f64, ph_per_dose: f64) -> Self {
        Self {
            doses: Arc::new(AtomicU32::new(0)),
            start_ph,
            ph_per_dose,
        }
    }

    fn dispenser(&self) -> VesselDispenser {
        VesselDispenser {
            doses: self.doses.clone(),
        }
    }
}

impl PhSource for Vessel {
    fn current_ph(&self) -> Result<f64> {
        let n = f64::from(self.doses.load(Ordering::SeqCst));
        Ok(self.start_ph + self.ph_per_dose * n)
    }
}

struct VesselDispenser {
    doses: Arc<AtomicU32>,
}

impl Dispenser for VesselDispenser {
    fn dispense(&mut self, ml: f64) -> Result<DoseReport> {
        self.doses.fetch_add(1, Ordering::SeqCst);
        Ok(DoseReport {
            requested_ml: ml,
            dispensed_ml: ml,
            full_cycles: 0,
            cut_short: false,
        })
    }
}

fn params(step: f64, target: f64, max: f64) -> TitrationParams {
    TitrationParams::new(step, target, max, SETTLE).unwrap()
}

#[test]
fn latches_volume_at_first_target_crossing() {
    // pH 6.5 + 0.05 per dose: reaches 7.0 at dose 10, stop threshold 8.0
    // at dose 30.
    let vessel = Vessel::new(6.5, 0.05);
    let mut dispenser = vessel.dispenser();
    let report = TitrationLoop::new(params(0.1, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut dispenser)
        .unwrap();

    assert_eq!(report.volume_at_target_ml, Some(1.0));
    assert_eq!(report.doses, 30);
    assert!((report.total_volume_ml - 3.0).abs() < 1e-9);
    assert!((report.final_ph - 8.0).abs() < 1e-9);
    assert!(!report.capped);
    assert!(report.total_volume_ml <= 10.0);
}

#[test]
fn volume_cap_is_strict_and_reported_as_approximation() {
    // pH never moves; the cap must end the loop at whole increments.
    let vessel = Vessel::new(6.0, 0.0);
    let mut dispenser = vessel.dispenser();
    let report = TitrationLoop::new(params(0.3, 9.0, 1.0), &vessel, Arc::new(InstantClock))
        .run(&mut dispenser)
        .unwrap();

    assert!(report.capped);
    assert_eq!(report.volume_at_target_ml, None);
    // 4th increment would overshoot 1.0 ml and is never started
    assert_eq!(report.doses, 3);
    assert!((report.total_volume_ml - 0.9).abs() < 1e-9);
}

#[test]
fn already_at_target_latches_zero_volume() {
    // Above target but below the stop threshold, so dosing continues.
    let vessel = Vessel::new(7.2, 0.1);
    let mut dispenser = vessel.dispenser();
    let report = TitrationLoop::new(params(0.1, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut dispenser)
        .unwrap();

    assert_eq!(report.volume_at_target_ml, Some(0.0));
    assert!(report.final_ph >= 8.0);
    assert!(report.doses > 0);
}

#[test]
fn overshoot_does_not_revise_the_latched_volume() {
    let vessel = Vessel::new(6.9, 0.2);
    let mut dispenser = vessel.dispenser();
    let report = TitrationLoop::new(params(0.05, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut dispenser)
        .unwrap();

    // First dose crosses 7.0; later doses overshoot further.
    assert_eq!(report.volume_at_target_ml, Some(0.05));
    assert!(report.doses > 1);
}

#[test]
fn stop_threshold_is_clamped_to_the_ph_scale() {
    assert!((params(0.1, 13.5, 10.0).stop_threshold() - 14.0).abs() < 1e-9);
    assert!((params(0.1, 7.0, 10.0).stop_threshold() - 8.0).abs() < 1e-9);
}

#[test]
fn target_ph_is_rounded_to_two_decimals() {
    assert!((params(0.1, 7.0051, 10.0).target_ph() - 7.01).abs() < 1e-9);
}

#[rstest]
#[case(0.04, 7.0, 10.0)]
#[case(0.51, 7.0, 10.0)]
#[case(f64::NAN, 7.0, 10.0)]
#[case(0.1, -0.5, 10.0)]
#[case(0.1, 14.2, 10.0)]
#[case(0.1, f64::INFINITY, 10.0)]
#[case(0.1, 7.0, 0.0)]
#[case(0.1, 7.0, -1.0)]
fn rejects_out_of_range_inputs(#[case] step: f64, #[case] target: f64, #[case] max: f64) {
    assert!(TitrationParams::new(step, target, max, SETTLE).is_err());
}

#[rstest]
#[case(0.05)]
#[case(0.5)]
fn accepts_step_bounds_inclusive(#[case] step: f64) {
    assert!(TitrationParams::new(step, 7.0, 10.0, SETTLE).is_ok());
}

/// Reports a dry burette that refilling did not cure.
struct ExhaustedDispenser;

impl Dispenser for ExhaustedDispenser {
    fn dispense(&mut self, ml: f64) -> Result<DoseReport> {
        Ok(DoseReport {
            requested_ml: ml,
            dispensed_ml: 0.0,
            full_cycles: 0,
            cut_short: true,
        })
    }
}

#[test]
fn exhausted_reagent_before_target_ends_the_loop_with_an_error() {
    // Zero dispensed, flat pH: without a terminal condition the loop
    // would dose forever.
    let vessel = Vessel::new(4.0, 0.0);
    let err = TitrationLoop::new(params(0.1, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut ExhaustedDispenser)
        .unwrap_err();
    assert!(err.to_string().contains("exhausted"), "{err}");
}

#[test]
fn exhausted_reagent_past_the_endpoint_keeps_the_latched_volume() {
    // Already over the target when the reagent runs out; the run ends
    // cleanly with the crossing volume intact.
    let vessel = Vessel::new(7.3, 0.0);
    let report = TitrationLoop::new(params(0.1, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut ExhaustedDispenser)
        .unwrap();
    assert_eq!(report.volume_at_target_ml, Some(0.0));
    assert!((report.total_volume_ml - 0.0).abs() < 1e-9);
    assert!(!report.capped);
}

#[test]
fn dispenser_failure_propagates() {
    struct FailingDispenser;
    impl Dispenser for FailingDispenser {
        fn dispense(&mut self, _ml: f64) -> Result<DoseReport> {
            Err(titrator_core::TitratorError::HardwareFault("wave dma".into()).into())
        }
    }
    let vessel = Vessel::new(4.0, 0.0);
    let err = TitrationLoop::new(params(0.1, 7.0, 10.0), &vessel, Arc::new(InstantClock))
        .run(&mut FailingDispenser)
        .unwrap_err();
    assert!(err.to_string().contains("hardware fault"));
}
