//! Slotted-disk photo-interrupter encoder: turns edge events on one input
//! pin into an estimate of the true half-steps per revolution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread;

use eyre::WrapErr;
use tracing::{debug, error, info, warn};

use movement_traits::{Edge, EdgePin};

use crate::error::Result;
use crate::stepper::StepSource;

/// Receiver of accepted revolution estimates (the hand).
pub trait MarkSink: Send + Sync {
    /// `measured` half-steps per revolution, re-based at absolute step
    /// count `location` (the falling edge of the mark).
    fn mark(&self, measured: i64, location: i64);
}

/// Edges closer than this many half-steps to the previous one are noise.
pub const DEFAULT_DEBOUNCE: i64 = 5;

/// Moving-average window over accepted revolution candidates.
const AVERAGE_WINDOW: usize = 5;

/// Reject a candidate differing from the previous estimate by more than 10%.
fn out_of_band(candidate: i64, previous: i64) -> bool {
    (candidate - previous).abs() * 10 > previous
}

pub struct EncoderParams {
    /// Minimum width of a qualifying mark pulse, in half-steps.
    pub mark_width: i64,
    /// Debounce distance in half-steps.
    pub debounce: i64,
    /// XOR the input value, for active-low sensors.
    pub invert: bool,
}

/// The encoder driver. The edge loop runs on its own thread; `measured` and
/// `last_edge` are shared atomics so calibration and the supervisor can
/// observe progress without touching the loop.
pub struct Encoder {
    measured: Arc<AtomicI64>,
    last_edge: Arc<AtomicI64>,
    counter: Arc<dyn StepSource>,
}

impl Encoder {
    /// Configure the pin for both edges and start the edge loop.
    pub fn spawn(
        mut pin: Box<dyn EdgePin>,
        counter: Arc<dyn StepSource>,
        sink: Arc<dyn MarkSink>,
        params: EncoderParams,
    ) -> Result<Self> {
        pin.configure_edge(Edge::Both)
            .map_err(|e| eyre::eyre!("{e}"))
            .wrap_err("configure encoder edge")?;
        let measured = Arc::new(AtomicI64::new(0));
        let last_edge = Arc::new(AtomicI64::new(-1));
        let worker = EdgeLoop {
            pin,
            counter: counter.clone(),
            sink,
            params,
            measured: measured.clone(),
            last_edge: last_edge.clone(),
        };
        thread::spawn(move || worker.run());
        Ok(Self {
            measured,
            last_edge,
            counter,
        })
    }

    /// Current revolution estimate; 0 until the first mark pair.
    pub fn measured(&self) -> i64 {
        self.measured.load(Ordering::SeqCst)
    }

    /// Step distance travelled since the last qualifying mark.
    pub fn location(&self) -> i64 {
        self.counter.step_count() - self.last_edge.load(Ordering::SeqCst)
    }
}

struct EdgeLoop {
    pin: Box<dyn EdgePin>,
    counter: Arc<dyn StepSource>,
    sink: Arc<dyn MarkSink>,
    params: EncoderParams,
    measured: Arc<AtomicI64>,
    last_edge: Arc<AtomicI64>,
}

impl EdgeLoop {
    fn run(mut self) {
        // Debounce reference: location of the last edge of either polarity.
        let mut last: i64 = -1;
        // Rising edge of the pulse currently being measured.
        let mut pulse_start: i64 = -1;
        // Falling edge of the last qualifying mark.
        let mut last_mark: i64 = -1;
        let mut window: VecDeque<i64> = VecDeque::with_capacity(AVERAGE_WINDOW);

        loop {
            let level = match self.pin.wait_and_read() {
                Ok(v) => v,
                Err(e) => {
                    // Sensor is gone; the hand keeps ticking on its last
                    // known revolution size.
                    error!(error = %e, "encoder input failed, edge loop exiting");
                    return;
                }
            };
            let level = if self.params.invert { level ^ 1 } else { level };
            let loc = self.counter.step_count();
            if last == -1 {
                last = loc;
                continue;
            }
            let gap = (loc - last).abs();
            last = loc;
            if gap < self.params.debounce {
                continue;
            }
            if level == 1 {
                pulse_start = loc;
            } else if pulse_start >= 0 && loc - pulse_start >= self.params.mark_width {
                self.mark_at(loc, last_mark, &mut window);
                last_mark = loc;
            }
        }
    }

    /// A qualifying mark ended at `loc`; update the estimate if we have a
    /// previous mark to measure against.
    fn mark_at(&self, loc: i64, last_mark: i64, window: &mut VecDeque<i64>) {
        self.last_edge.store(loc, Ordering::SeqCst);
        if last_mark < 0 {
            debug!(location = loc, "first mark");
            return;
        }
        let candidate = (loc - last_mark).abs();
        let previous = self.measured.load(Ordering::SeqCst);
        if previous != 0 && out_of_band(candidate, previous) {
            warn!(candidate, previous, "revolution estimate out of band, discarded");
            return;
        }
        if window.is_empty() {
            // Seed the window so the first estimate is not averaged down.
            window.extend(std::iter::repeat(candidate).take(AVERAGE_WINDOW));
        } else {
            if window.len() == AVERAGE_WINDOW {
                window.pop_front();
            }
            window.push_back(candidate);
        }
        let n = window.len() as i64;
        let sum: i64 = window.iter().sum();
        let estimate = (sum + n / 2) / n;
        self.measured.store(estimate, Ordering::SeqCst);
        info!(candidate, estimate, location = loc, "revolution measured");
        self.sink.mark(estimate, loc);
    }
}
