//! Clock supervisor: builds one stepper, hand, and encoder per configured
//! hand, runs calibration, starts the tick loops, and exposes a read-only
//! observer surface.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use movement_traits::{Clock, EdgePin, OutputPin};

use crate::calibrate::calibrate;
use crate::encoder::{Encoder, EncoderParams};
use crate::error::{MovementError, Report, Result};
use crate::hand::{Hand, HandStatus, MoveHand};
use crate::stepper::Stepper;

/// Per-hand parameters, decoupled from any on-disk format.
#[derive(Debug, Clone)]
pub struct HandParams {
    pub name: String,
    pub rpm: f64,
    pub period: Duration,
    pub update: Duration,
    pub reference: i64,
    pub offset: i64,
    pub mark_width: i64,
    pub debounce: i64,
    pub invert: bool,
}

/// Hardware channels for one hand. Each pin is owned by exactly one
/// stepper or encoder for the life of the process.
pub struct HandHardware {
    pub stepper_pins: [Box<dyn OutputPin>; 4],
    pub encoder_pin: Box<dyn EdgePin>,
}

/// Shim between a hand and its stepper: applies the configured RPM and
/// powers the coils down between moves. Holding torque is not needed
/// between ticks, and the coils run warm when left energized.
struct StepperMover {
    name: String,
    stepper: Arc<Stepper>,
    rpm: f64,
}

impl MoveHand for StepperMover {
    fn move_steps(&self, steps: i64) {
        if let Err(e) = self.stepper.step(self.rpm, steps) {
            warn!(hand = %self.name, error = %e, "move rejected");
            return;
        }
        // off() drains the queue first, so moves through the shim complete
        // before it returns.
        if let Err(e) = self.stepper.off() {
            warn!(hand = %self.name, error = %e, "stepper off failed");
        }
    }
}

struct HandUnit {
    params: HandParams,
    hand: Arc<Hand>,
    mover: Arc<StepperMover>,
    encoder: Encoder,
    // Kept alive for the life of the movement; dropping it would stop the
    // worker under the hand.
    _stepper: Arc<Stepper>,
}

/// The whole clock: one control loop per hand.
#[derive(Default)]
pub struct ClockMovement {
    units: Vec<HandUnit>,
}

impl ClockMovement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire up one hand: stepper first, then the hand with the stepper
    /// handle, then the encoder with both handles.
    pub fn add_hand(
        &mut self,
        params: HandParams,
        hw: HandHardware,
        clock: Arc<dyn Clock>,
    ) -> Result<()> {
        let stepper = Arc::new(Stepper::new(params.reference, hw.stepper_pins).map_err(Report::new)?);
        let mover = Arc::new(StepperMover {
            name: params.name.clone(),
            stepper: stepper.clone(),
            rpm: params.rpm,
        });
        let hand = Arc::new(Hand::new(
            params.name.clone(),
            params.period,
            params.update,
            params.reference,
            params.offset,
            mover.clone(),
            stepper.clone(),
            clock,
        ));
        let encoder = Encoder::spawn(
            hw.encoder_pin,
            stepper.clone(),
            hand.clone(),
            EncoderParams {
                mark_width: params.mark_width,
                debounce: params.debounce,
                invert: params.invert,
            },
        )?;
        self.units.push(HandUnit {
            params,
            hand,
            mover,
            encoder,
            _stepper: stepper,
        });
        Ok(())
    }

    /// Calibrate every hand in parallel, then start the tick loops. A hand
    /// that fails to calibrate is fatal: the error propagates and the
    /// process should exit.
    pub fn start(&self) -> Result<()> {
        thread::scope(|s| {
            let handles: Vec<_> = self
                .units
                .iter()
                .map(|u| {
                    s.spawn(move || {
                        calibrate(u.mover.as_ref(), &u.encoder, &u.hand, u.params.reference)
                    })
                })
                .collect();
            for h in handles {
                h.join()
                    .map_err(|_| eyre::eyre!("calibration thread panicked"))??;
            }
            Ok::<(), Report>(())
        })?;
        for u in &self.units {
            let hand = u.hand.clone();
            thread::spawn(move || hand.run());
        }
        Ok(())
    }

    /// Thread-safe snapshot of every hand, for the status page.
    pub fn snapshot(&self) -> Vec<HandStatus> {
        self.units.iter().map(|u| u.hand.status()).collect()
    }

    /// Apply a user offset adjustment to the named hand.
    pub fn adjust(&self, name: &str, delta: i64) -> Result<()> {
        match self.units.iter().find(|u| u.hand.name() == name) {
            Some(u) => {
                u.hand.adjust(delta);
                Ok(())
            }
            None => Err(Report::new(MovementError::UnknownHand(name.to_string()))),
        }
    }

    /// True once every hand has entered its tick loop.
    pub fn ticking(&self) -> bool {
        self.units.iter().all(|u| u.hand.ticking())
    }
}
