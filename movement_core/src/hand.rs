//! Clock hand scheduling: wall time in, clockwise step commands out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, trace};

use movement_traits::Clock;

use crate::encoder::MarkSink;
use crate::stepper::StepSource;

/// Where a hand sends its movement requests. The supervisor implements this
/// with a shim that applies the configured RPM and powers the coils down
/// between moves.
pub trait MoveHand: Send + Sync {
    fn move_steps(&self, steps: i64);
}

/// Geometry of the hand, guarded by one mutex: everything needed to map the
/// stepper's absolute counter to an angular position.
struct Geometry {
    /// Measured half-steps per revolution. Starts at the configured
    /// reference and is overwritten by the encoder. Always > 0.
    measured: i64,
    /// Absolute step count at the last encoder mark.
    base: i64,
    /// Signed step distance from the mark to 12 o'clock.
    offset: i64,
    marks: u64,
    skipped: u64,
    fast_forward: u64,
    adjusted: u64,
}

/// Thread-safe snapshot of one hand for the observer surface.
#[derive(Debug, Clone)]
pub struct HandStatus {
    pub name: String,
    pub position: i64,
    pub revolution: i64,
    pub offset: i64,
    pub ticking: bool,
    pub marks: u64,
    pub skipped: u64,
    pub fast_forward: u64,
    pub adjusted: u64,
}

/// A clock hand. One revolution of the hand is `ticks` discrete positions;
/// every update interval the hand is repositioned to match the wall time.
/// Movement is clockwise only: small backward targets are waited out, large
/// ones are wrapped into a long forward move.
pub struct Hand {
    name: String,
    mover: Arc<dyn MoveHand>,
    counter: Arc<dyn StepSource>,
    clock: Arc<dyn Clock>,
    update: Duration,
    update_ms: i64,
    /// Number of discrete positions on the face: period / update.
    ticks: i64,
    /// reference / 100: the skip threshold anchors on the configured value
    /// rather than the (noisy) measured one.
    skip_threshold: i64,
    ticking: AtomicBool,
    geo: Mutex<Geometry>,
}

impl Hand {
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        update: Duration,
        reference: i64,
        offset: i64,
        mover: Arc<dyn MoveHand>,
        counter: Arc<dyn StepSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        let update_ms = update.as_millis() as i64;
        let ticks = (period.as_millis() / update.as_millis()) as i64;
        info!(
            hand = %name,
            ticks,
            reference,
            update_ms,
            "hand created"
        );
        Self {
            name,
            mover,
            counter,
            clock,
            update,
            update_ms,
            ticks,
            skip_threshold: reference / 100,
            ticking: AtomicBool::new(false),
            geo: Mutex::new(Geometry {
                measured: reference,
                base: 0,
                offset,
                marks: 0,
                skipped: 0,
                fast_forward: 0,
                adjusted: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ticking(&self) -> bool {
        self.ticking.load(Ordering::Relaxed)
    }

    /// Atomic snapshot of `(current position, revolution size, offset)`.
    pub fn position(&self) -> (i64, i64, i64) {
        let g = self.lock_geo();
        (self.current_locked(&g), g.measured, g.offset)
    }

    /// Full snapshot for the observer surface.
    pub fn status(&self) -> HandStatus {
        let g = self.lock_geo();
        HandStatus {
            name: self.name.clone(),
            position: self.current_locked(&g),
            revolution: g.measured,
            offset: g.offset,
            ticking: self.ticking(),
            marks: g.marks,
            skipped: g.skipped,
            fast_forward: g.fast_forward,
            adjusted: g.adjusted,
        }
    }

    /// Apply a user adjustment of `delta` half-steps. A positive delta moves
    /// the indicated position counter-clockwise one step visually without
    /// moving the motor, bringing the pointer closer to the encoder mark.
    pub fn adjust(&self, delta: i64) {
        let mut g = self.lock_geo();
        g.offset = (g.offset - delta).rem_euclid(g.measured);
        g.adjusted += 1;
        debug!(hand = %self.name, delta, offset = g.offset, "offset adjusted");
    }

    /// Re-base the hand on a fresh encoder mark: `measured` is the new
    /// revolution size and `location` the absolute step count at the mark.
    pub fn mark(&self, measured: i64, location: i64) {
        let mut g = self.lock_geo();
        g.measured = measured;
        g.base = location;
        g.marks += 1;
        trace!(hand = %self.name, measured, location, "mark");
    }

    /// Target step position on the face for wall time `t`.
    pub fn target(&self, t: OffsetDateTime) -> i64 {
        // Milliseconds into the 12-hour cycle.
        let secs = (i64::from(t.hour() % 12)) * 3600
            + i64::from(t.minute()) * 60
            + i64::from(t.second());
        let ms = secs * 1000 + i64::from(t.millisecond());
        let tick = (ms / self.update_ms) % self.ticks;
        let measured = self.lock_geo().measured;
        // Round to the nearest half-step rather than truncating.
        (tick * measured + self.ticks / 2) / self.ticks
    }

    /// Move the hand to `target`, clockwise only.
    ///
    /// A small negative delta happens whenever the encoder shrinks the
    /// revolution size under a position the previous command already passed;
    /// waiting for wall time to catch up is cheaper than reversing and
    /// confusing the encoder's edge interpretation.
    pub fn step_to(&self, target: i64) {
        let steps = {
            let mut g = self.lock_geo();
            let current = self.current_locked(&g);
            let delta = target - current;
            if delta < 0 {
                if -delta < self.skip_threshold {
                    g.skipped += 1;
                    debug!(hand = %self.name, delta, "skipping tick");
                    0
                } else {
                    g.fast_forward += 1;
                    delta + g.measured
                }
            } else {
                if delta > self.skip_threshold {
                    g.fast_forward += 1;
                }
                delta
            }
        };
        if steps > 0 {
            self.mover.move_steps(steps);
        }
    }

    /// Run the hand: set the initial position, align to the update boundary,
    /// then reposition on every tick. Blocks forever; call on its own thread
    /// once calibration has produced a revolution estimate.
    pub fn run(&self) {
        let initial = self.target(self.clock.wall());
        info!(hand = %self.name, target = initial, "setting initial position");
        self.step_to(initial);
        self.sync_to_boundary();
        self.ticking.store(true, Ordering::Relaxed);
        let ticker = crossbeam_channel::tick(self.update);
        loop {
            let _ = ticker.recv();
            self.step_to(self.target(self.clock.wall()));
        }
    }

    /// Sleep until the next wall instant that is a whole multiple of the
    /// update interval, so a 10s hand ticks at :00, :10, :20 rather than
    /// :07, :17, :27.
    fn sync_to_boundary(&self) {
        let now = self.clock.wall();
        let ms_of_day = i64::from(now.hour()) * 3_600_000
            + i64::from(now.minute()) * 60_000
            + i64::from(now.second()) * 1000
            + i64::from(now.millisecond());
        let rem = ms_of_day % self.update_ms;
        self.clock
            .sleep(Duration::from_millis((self.update_ms - rem) as u64));
    }

    fn current_locked(&self, g: &Geometry) -> i64 {
        (self.counter.step_count() - g.base + g.offset).rem_euclid(g.measured)
    }

    fn lock_geo(&self) -> MutexGuard<'_, Geometry> {
        self.geo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MarkSink for Hand {
    fn mark(&self, measured: i64, location: i64) {
        Hand::mark(self, measured, location);
    }
}
