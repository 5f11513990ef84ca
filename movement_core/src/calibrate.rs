//! One-shot startup calibration: force enough revolutions for the encoder
//! to produce an initial estimate before ticking begins.

use std::thread;
use std::time::Duration;

use tracing::info;

use crate::encoder::Encoder;
use crate::error::{MovementError, Report, Result};
use crate::hand::{Hand, MoveHand};

const SETTLE_POLL: Duration = Duration::from_millis(50);
const SETTLE_TRIES: u32 = 40;

/// Drive the hand forward far enough to cross the encoder mark at least
/// twice, then wait for the encoder to report a revolution estimate. The
/// hand's base and revolution size are seeded by the mark callback along the
/// way; the first scheduled tick fast-forwards to the correct position, so
/// no extra positioning move is needed here.
///
/// Any gearing ratio within the encoder's sanity band is accepted; the
/// measured value is not checked against the reference.
pub fn calibrate(mover: &dyn MoveHand, encoder: &Encoder, hand: &Hand, reference: i64) -> Result<()> {
    info!(hand = %hand.name(), "starting calibration");
    // Three and a half revolutions: the edge loop consumes the very first
    // edge to establish its debounce reference, so the first full pulse may
    // not count as a mark. This still leaves two qualifying marks even when
    // the gearing runs several percent long.
    mover.move_steps(reference * 3 + reference / 2);
    // The move is synchronous, but the final edge events may still be in
    // flight to the encoder's thread.
    let mut measured = encoder.measured();
    for _ in 0..SETTLE_TRIES {
        if measured != 0 {
            break;
        }
        thread::sleep(SETTLE_POLL);
        measured = encoder.measured();
    }
    if measured == 0 {
        return Err(Report::new(MovementError::Calibrate(
            hand.name().to_string(),
        )));
    }
    info!(hand = %hand.name(), measured, "calibration complete");
    Ok(())
}
