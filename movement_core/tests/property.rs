use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use time::macros::datetime;

use movement_core::Hand;
use movement_core::mocks::{ManualClock, RecordingMover};
use movement_core::{MoveHand, StepSource};
use movement_traits::clock::Clock;

#[derive(Debug, Clone)]
enum Op {
    /// The stepper advanced (encoder lag, manual nudge, anything).
    Drift(i64),
    /// The encoder re-based the hand with a fresh estimate.
    Mark { measured: i64, location: i64 },
    /// A user tweaked the offset.
    Adjust(i64),
    /// A scheduled tick fired this many seconds into the hour.
    Tick(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..500).prop_map(Op::Drift),
        ((3700i64..4500), (0i64..200_000)).prop_map(|(m, l)| Op::Mark {
            measured: m,
            location: l
        }),
        (-200i64..200).prop_map(Op::Adjust),
        (0i64..3600).prop_map(Op::Tick),
    ]
}

fn fixture() -> (Arc<Hand>, Arc<RecordingMover>, Arc<ManualClock>) {
    let mover = RecordingMover::new();
    let clock = ManualClock::at(datetime!(2021-06-01 12:00:00 UTC));
    let hand = Arc::new(Hand::new(
        "prop",
        Duration::from_secs(3600),
        Duration::from_secs(10),
        4096,
        2100,
        mover.clone(),
        mover.clone(),
        clock.clone(),
    ));
    (hand, mover, clock)
}

proptest! {
    /// The position invariant holds through any interleaving of drift,
    /// marks, adjustments, and ticks.
    #[test]
    fn current_position_stays_within_the_revolution(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (hand, mover, clock) = fixture();
        for op in ops {
            match op {
                Op::Drift(steps) => mover.move_steps(steps),
                Op::Mark { measured, location } => hand.mark(measured, location),
                Op::Adjust(delta) => hand.adjust(delta),
                Op::Tick(secs) => {
                    clock.set(datetime!(2021-06-01 12:00:00 UTC) + Duration::from_secs(secs as u64));
                    hand.step_to(hand.target(clock.wall()));
                }
            }
            let (current, revolution, _offset) = hand.position();
            prop_assert!(revolution > 0);
            prop_assert!((0..revolution).contains(&current),
                "current {current} outside 0..{revolution}");
        }
    }

    /// Scheduled ticking never asks the stepper to move backwards, even
    /// when marks shrink the revolution underneath the hand.
    #[test]
    fn ticking_issues_only_clockwise_moves(
        secs in prop::collection::vec(1i64..120, 1..40),
        shrink_at in 0usize..40,
        shrink_by in 0i64..80,
    ) {
        let (hand, mover, clock) = fixture();
        let mut t = 0i64;
        for (i, ds) in secs.iter().enumerate() {
            t += ds;
            if i == shrink_at {
                // A mark that shrinks the revolution forces a backward
                // target, which the hand must absorb as a skip or a wrap.
                hand.mark(4096 - shrink_by, mover.step_count());
            }
            clock.set(datetime!(2021-06-01 12:00:00 UTC) + Duration::from_secs(t as u64));
            hand.step_to(hand.target(clock.wall()));
        }
        for steps in mover.moves() {
            prop_assert!(steps > 0, "backward or empty move issued: {steps}");
        }
    }

    /// Offset adjustments cancel modulo the revolution size.
    #[test]
    fn adjust_round_trips(k in 0i64..4096, drift in 0i64..10_000) {
        let (hand, mover, _clock) = fixture();
        mover.move_steps(drift);
        let (before, _, offset_before) = hand.position();
        hand.adjust(k);
        hand.adjust(-k);
        let (after, _, offset_after) = hand.position();
        prop_assert_eq!(before, after);
        prop_assert_eq!(offset_before, offset_after);
        prop_assert_eq!(hand.status().adjusted, 2);
    }
}
