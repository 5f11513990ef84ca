//! Test and simulation doubles: a virtual geared movement standing in for
//! the physical gear train, pin recorders, and a controllable wall clock.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel as xch;
use time::OffsetDateTime;

use movement_traits::{Clock, Edge, EdgePin, OutputPin};

use crate::hand::MoveHand;
use crate::stepper::StepSource;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Four output pins that record every write into a shared log, so tests can
/// reconstruct the coil rows a stepper actually drove.
pub struct PinBank {
    log: Arc<Mutex<Vec<(usize, u8)>>>,
}

struct LogPin {
    id: usize,
    log: Arc<Mutex<Vec<(usize, u8)>>>,
}

impl OutputPin for LogPin {
    fn set(&mut self, high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        lock(&self.log).push((self.id, u8::from(high)));
        Ok(())
    }
}

impl PinBank {
    pub fn new() -> (Self, [Box<dyn OutputPin>; 4]) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pin = |id| -> Box<dyn OutputPin> {
            Box::new(LogPin {
                id,
                log: log.clone(),
            })
        };
        (Self { log: log.clone() }, [pin(0), pin(1), pin(2), pin(3)])
    }

    /// Successive coil rows: one entry per completed write of all four pins.
    pub fn rows(&self) -> Vec<[u8; 4]> {
        let log = lock(&self.log);
        let mut levels = [0u8; 4];
        let mut rows = Vec::new();
        for &(id, v) in log.iter() {
            levels[id] = v;
            if id == 3 {
                rows.push(levels);
            }
        }
        rows
    }

    /// The level each pin was last driven to.
    pub fn levels(&self) -> [u8; 4] {
        let log = lock(&self.log);
        let mut levels = [0u8; 4];
        for &(id, v) in log.iter() {
            levels[id] = v;
        }
        levels
    }
}

/// Output pin that fails on every write, for worker-death tests.
pub struct FailPin;

impl OutputPin for FailPin {
    fn set(&mut self, _high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("pin write failed".into())
    }
}

/// Edge-triggered input fed from a channel.
pub struct ChannelEdgePin {
    rx: xch::Receiver<u8>,
}

impl ChannelEdgePin {
    pub fn pair() -> (Box<dyn EdgePin>, xch::Sender<u8>) {
        let (tx, rx) = xch::unbounded();
        (Box::new(Self { rx }), tx)
    }
}

impl EdgePin for ChannelEdgePin {
    fn configure_edge(&mut self, _edge: Edge) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    fn wait_and_read(&mut self) -> Result<u8, Box<dyn Error + Send + Sync>> {
        self.rx
            .recv()
            .map_err(|_| -> Box<dyn Error + Send + Sync> { "edge source disconnected".into() })
    }
}

/// Step source that replays a scripted sequence of locations, one per read.
/// Lets encoder tests pin the exact step count seen at each edge without
/// racing the edge loop.
pub struct ScriptedCounter {
    locations: Mutex<VecDeque<i64>>,
    last: AtomicI64,
}

impl ScriptedCounter {
    pub fn new(locations: impl Into<VecDeque<i64>>) -> Arc<Self> {
        Arc::new(Self {
            locations: Mutex::new(locations.into()),
            last: AtomicI64::new(0),
        })
    }
}

impl StepSource for ScriptedCounter {
    fn step_count(&self) -> i64 {
        match lock(&self.locations).pop_front() {
            Some(loc) => {
                self.last.store(loc, Ordering::SeqCst);
                loc
            }
            None => self.last.load(Ordering::SeqCst),
        }
    }
}

/// Mark sink that records every callback.
#[derive(Default)]
pub struct RecordingSink {
    marks: Mutex<Vec<(i64, i64)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn marks(&self) -> Vec<(i64, i64)> {
        lock(&self.marks).clone()
    }
}

impl crate::encoder::MarkSink for RecordingSink {
    fn mark(&self, measured: i64, location: i64) {
        lock(&self.marks).push((measured, location));
    }
}

/// A perfect stepper: applies every requested move to the counter instantly
/// and records the request. Doubles as the hand's mover and step source.
#[derive(Default)]
pub struct RecordingMover {
    moves: Mutex<Vec<i64>>,
    count: AtomicI64,
}

impl RecordingMover {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn moves(&self) -> Vec<i64> {
        lock(&self.moves).clone()
    }
}

impl MoveHand for RecordingMover {
    fn move_steps(&self, steps: i64) {
        self.count.fetch_add(steps, Ordering::SeqCst);
        lock(&self.moves).push(steps);
    }
}

impl StepSource for RecordingMover {
    fn step_count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Wall clock whose time is set by the test. `sleep` advances it.
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn at(t: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(t) })
    }

    pub fn set(&self, t: OffsetDateTime) {
        *lock(&self.now) = t;
    }
}

impl Clock for ManualClock {
    fn wall(&self) -> OffsetDateTime {
        *lock(&self.now)
    }

    fn sleep(&self, d: Duration) {
        let mut now = lock(&self.now);
        *now += d;
    }
}

/// Gear-train geometry for the virtual movement.
#[derive(Debug, Clone, Copy)]
pub struct SimGear {
    /// Nominal half-steps per revolution.
    pub reference: i64,
    /// Physical position units advanced per commanded half-step; the gear
    /// ratio. 1.0 means the nominal step count is exact.
    pub per_step: f64,
    /// Mark window on the disk, in physical units: the sensor reads 1 for
    /// positions in `edge1..=edge2`.
    pub edge1: i64,
    pub edge2: i64,
}

struct SimState {
    position: f64,
    in_window: bool,
}

/// Virtual geared movement: moves advance a float position by `per_step`
/// per half-step, and the encoder pin sees an edge whenever the position
/// enters or leaves the mark window. The step counter reports the physical
/// position, so the measured revolution comes out at
/// `reference * per_step`, exactly like a real non-integral gear train.
pub struct SimMovement {
    gear: SimGear,
    actual: f64,
    state: Mutex<SimState>,
    count: AtomicI64,
    tx: xch::Sender<u8>,
}

impl SimMovement {
    pub fn new(gear: SimGear) -> (Arc<Self>, Box<dyn EdgePin>) {
        let (tx, rx) = xch::bounded(0);
        let sim = Arc::new(Self {
            gear,
            actual: gear.reference as f64 * gear.per_step,
            state: Mutex::new(SimState {
                position: 0.0,
                in_window: false,
            }),
            count: AtomicI64::new(0),
            tx,
        });
        (sim, Box::new(ChannelEdgePin { rx }))
    }

    fn in_window(&self, loc: i64) -> bool {
        loc >= self.gear.edge1 && loc <= self.gear.edge2
    }
}

impl MoveHand for SimMovement {
    fn move_steps(&self, steps: i64) {
        let mut st = lock(&self.state);
        let inc = if steps < 0 {
            -self.gear.per_step
        } else {
            self.gear.per_step
        };
        for _ in 0..steps.unsigned_abs() {
            st.position += inc;
            self.count.store(st.position as i64, Ordering::SeqCst);
            let loc = st.position.rem_euclid(self.actual) as i64;
            let inside = self.in_window(loc);
            if inside != st.in_window {
                st.in_window = inside;
                // Rendezvous send: returns once the edge loop has taken the
                // event. The short sleep lets it read the step counter
                // before we move on.
                let _ = self
                    .tx
                    .send_timeout(u8::from(inside), Duration::from_secs(1));
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

impl StepSource for SimMovement {
    fn step_count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}
