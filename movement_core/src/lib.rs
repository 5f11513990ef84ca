#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core for an analog clock whose hands are driven by unipolar
//! stepper motors (hardware-agnostic).
//!
//! All hardware interactions go through `movement_traits::OutputPin` and
//! `movement_traits::EdgePin`.
//!
//! ## Architecture
//!
//! - **Stepper** (`stepper` module): queued half-step execution with an
//!   absolute step counter readable from any thread.
//! - **Hand** (`hand` module): maps wall time to a clockwise-only stream of
//!   step commands, modulo the measured revolution size.
//! - **Encoder** (`encoder` module): measures the true half-steps per
//!   revolution from a slotted-disk photo-interrupter and re-bases the hand
//!   at every mark.
//! - **Calibration** (`calibrate` module): startup revolutions that give the
//!   encoder its first estimate.
//! - **Supervisor** (`clock` module): wires the above per configured hand
//!   and exposes the observer surface.
//!
//! Gearing is rarely integral, so every position computation runs modulo the
//! *measured* revolution size, not the nominal one; the nominal value only
//! anchors thresholds that must not drift with noisy estimates.

pub mod calibrate;
pub mod clock;
pub mod encoder;
pub mod error;
pub mod hand;
pub mod mocks;
pub mod stepper;

pub use calibrate::calibrate;
pub use clock::{ClockMovement, HandHardware, HandParams};
pub use encoder::{DEFAULT_DEBOUNCE, Encoder, EncoderParams, MarkSink};
pub use error::{BuildError, MovementError};
pub use hand::{Hand, HandStatus, MoveHand};
pub use stepper::{StepSource, Stepper};
