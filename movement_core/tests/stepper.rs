use std::thread;
use std::time::Duration;

use movement_core::Stepper;
use movement_core::mocks::{FailPin, PinBank};
use movement_traits::OutputPin;

/// Half-step rows in phase order, mirrored here so a driver change that
/// scrambles the table fails loudly.
const SEQUENCE: [[u8; 4]; 8] = [
    [1, 0, 0, 0],
    [1, 1, 0, 0],
    [0, 1, 0, 0],
    [0, 1, 1, 0],
    [0, 0, 1, 0],
    [0, 0, 1, 1],
    [0, 0, 0, 1],
    [1, 0, 0, 1],
];

fn phase_index(row: [u8; 4]) -> Option<usize> {
    SEQUENCE.iter().position(|r| *r == row)
}

#[test]
fn executes_steps_and_counts_signed_sum() {
    let (bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.step(600.0, 16).expect("step cw");
    stepper.wait().expect("wait");
    assert_eq!(stepper.get_step(), 16);

    stepper.step(600.0, -6).expect("step ccw");
    stepper.wait().expect("wait");
    assert_eq!(stepper.get_step(), 10);

    // Energize row + 16 cw + 6 ccw
    let rows = bank.rows();
    assert_eq!(rows.len(), 1 + 16 + 6);
}

#[test]
fn phase_index_moves_by_one_per_pulse() {
    let (bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.step(600.0, 20).expect("step cw");
    stepper.step(600.0, -9).expect("step ccw");
    stepper.wait().expect("wait");

    let rows = bank.rows();
    let indices: Vec<usize> = rows
        .iter()
        .map(|r| phase_index(*r).expect("row not in phase table"))
        .collect();
    for pair in indices.windows(2) {
        let diff = (pair[1] + 8 - pair[0]) % 8;
        assert!(
            diff == 1 || diff == 7,
            "phase jumped from {} to {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn save_restore_round_trips_phase_index() {
    let (_bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.restore(5).expect("restore");
    assert_eq!(stepper.save(), 5);
    // restore(save()) is a no-op on the index
    stepper.restore(stepper.save()).expect("restore");
    assert_eq!(stepper.save(), 5);
    // out-of-range values are masked into the table
    stepper.restore(13).expect("restore");
    assert_eq!(stepper.save(), 13 & 7);
}

#[test]
fn rejects_nonpositive_rpm() {
    let (_bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    assert!(stepper.step(0.0, 5).is_err());
    assert!(stepper.step(-3.0, 5).is_err());
    // zero steps is a no-op, not an error
    stepper.step(3.0, 0).expect("zero steps ok");
    stepper.wait().expect("wait");
    assert_eq!(stepper.get_step(), 0);
}

#[test]
fn off_deenergizes_but_keeps_phase_and_count() {
    let (bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.step(600.0, 3).expect("step");
    stepper.off().expect("off");
    assert_eq!(bank.levels(), [0, 0, 0, 0]);
    assert_eq!(stepper.save(), 3);
    assert_eq!(stepper.get_step(), 3);
    // idempotent
    stepper.off().expect("off again");
    assert_eq!(bank.levels(), [0, 0, 0, 0]);

    // The next move re-energizes on the same phase row before stepping on.
    stepper.step(600.0, 1).expect("step");
    stepper.wait().expect("wait");
    let rows = bank.rows();
    let reenergized = rows[rows.len() - 2];
    assert_eq!(phase_index(reenergized), Some(3));
}

#[test]
fn rejects_invalid_steps_per_revolution() {
    let (_bank, pins) = PinBank::new();
    assert!(Stepper::new(30, pins).is_err());
}

#[test]
fn stop_aborts_in_flight_move() {
    let (_bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    // ~15ms per half-step at 1 rpm; 1000 steps would take ~15s.
    stepper.step(1.0, 1000).expect("step");
    thread::sleep(Duration::from_millis(100));
    stepper.stop().expect("stop");
    let stopped_at = stepper.get_step();
    assert!(
        stopped_at > 0 && stopped_at < 1000,
        "expected a partial move, got {stopped_at}"
    );
    // The stepper remains usable after an abort.
    stepper.step(600.0, 4).expect("step");
    stepper.wait().expect("wait");
    assert_eq!(stepper.get_step(), stopped_at + 4);
}

#[test]
fn stop_flushes_queued_moves() {
    let (_bank, pins) = PinBank::new();
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.step(1.0, 1000).expect("step");
    stepper.step(600.0, 500).expect("queued step");
    thread::sleep(Duration::from_millis(50));
    stepper.stop().expect("stop");
    let stopped_at = stepper.get_step();
    // The queued 500-step move must not run after the abort.
    assert!(stopped_at < 500, "queue was not flushed: {stopped_at}");
}

#[test]
fn pin_failure_kills_the_worker() {
    let pins: [Box<dyn OutputPin>; 4] = [
        Box::new(FailPin),
        Box::new(FailPin),
        Box::new(FailPin),
        Box::new(FailPin),
    ];
    let stepper = Stepper::new(4096, pins).expect("build stepper");
    stepper.step(600.0, 4).expect("queue move");
    // The worker dies on the first write; the sync marker is never acked.
    assert!(stepper.wait().is_err());
    assert!(stepper.step(600.0, 4).is_err());
}
