#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core titration logic (hardware-agnostic).
//!
//! All hardware interaction goes through the `titrator_traits` contracts;
//! this crate turns them into motion, dosing, and closed-loop titration.
//!
//! ## Architecture
//!
//! - **Pulse planning**: step trains batched into bounded waveform chunks
//!   (`pulse` module)
//! - **Waveform playback**: upload/transmit/busy discipline over the
//!   shared wave unit (`wave`)
//! - **Axis motion**: the per-axis state machine with limit-sensor gating
//!   and the guaranteed de-energize step (`axis`, `sensor`, `builder`)
//! - **Dosing**: volume/step calibration and named motion scripts
//!   (`calibration`, `sequence`, `queue`)
//! - **Titration**: the dose/settle/re-sample control loop and the
//!   background pH sampler (`titration`, `sampler`)

pub mod axis;
pub mod builder;
pub mod calibration;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod pulse;
pub mod queue;
pub mod sampler;
pub mod sensor;
pub mod sequence;
pub mod titration;
pub mod util;
pub mod wave;

pub use axis::{
    Axis, AxisConfig, Direction, MotionOutcome, MotionRequest, MotorAxis, SensorSel, StopReason,
};
pub use builder::MotorAxisBuilder;
pub use calibration::{DosePlan, DosingCalibration};
pub use error::{BuildError, Result, TitratorError};
pub use queue::{AxisId, AxisSet, CommandQueue};
pub use sampler::{PhSample, ProbeSampler, SharedReading, ph_from_mv};
pub use sequence::{DoseReport, SequenceController};
pub use titration::{Dispenser, PhSource, TitrationLoop, TitrationParams, TitrationReport};
