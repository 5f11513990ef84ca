//! Unipolar stepper driver: a command queue in front of a dedicated worker
//! that owns the four coil output pins.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as xch;
use crossbeam_channel::select;
use tracing::{error, trace};

use movement_traits::OutputPin;

use crate::error::{BuildError, MovementError, Report, Result};

/// Half-step sequence. Each row sets the four coil lines.
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

/// Read access to a stepper's absolute step counter.
pub trait StepSource: Send + Sync {
    fn step_count(&self) -> i64;
}

enum Command {
    Move { rpm: f64, steps: i64 },
    Sync(xch::Sender<()>),
    Off(xch::Sender<()>),
    Restore { index: usize, done: xch::Sender<()> },
    Shutdown,
}

enum MoveOutcome {
    Done,
    Aborted,
    Closed,
}

/// One stepper motor. Queued moves execute serially on a worker thread; the
/// absolute step counter and the phase index are readable from any thread.
pub struct Stepper {
    cmd_tx: xch::Sender<Command>,
    stop_tx: xch::Sender<()>,
    count: Arc<AtomicI64>,
    index: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl Stepper {
    /// Create a stepper and start its worker.
    /// `half_steps` is the nominal number of half-steps per revolution.
    pub fn new(
        half_steps: i64,
        pins: [Box<dyn OutputPin>; 4],
    ) -> std::result::Result<Self, BuildError> {
        if half_steps <= 30 {
            return Err(BuildError::InvalidSteps(half_steps));
        }
        // ns of delay per half-step at 1 RPM
        let factor = (60_i64 * 1_000_000_000) as f64 / half_steps as f64;
        let (cmd_tx, cmd_rx) = xch::bounded(20);
        let (stop_tx, stop_rx) = xch::bounded(0);
        let count = Arc::new(AtomicI64::new(0));
        let index = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            pins,
            index: index.clone(),
            count: count.clone(),
            on: false,
            factor,
            cmd_rx,
            stop_rx,
        };
        let handle = thread::spawn(move || worker.run());
        Ok(Self {
            cmd_tx,
            stop_tx,
            count,
            index,
            handle: Some(handle),
        })
    }

    /// Queue a move of `half_steps` at `rpm`; negative steps run
    /// counter-clockwise. Returns as soon as the move is queued (the send
    /// blocks only when the queue is full).
    pub fn step(&self, rpm: f64, half_steps: i64) -> Result<()> {
        if !rpm.is_finite() || rpm <= 0.0 {
            return Err(Report::new(MovementError::Rpm(rpm)));
        }
        if half_steps == 0 {
            return Ok(());
        }
        self.cmd_tx
            .send(Command::Move {
                rpm,
                steps: half_steps,
            })
            .map_err(|_| Report::new(MovementError::StepperGone))
    }

    /// Block until every command queued before this call has completed.
    pub fn wait(&self) -> Result<()> {
        let (ack_tx, ack_rx) = xch::bounded(1);
        self.cmd_tx
            .send(Command::Sync(ack_tx))
            .map_err(|_| Report::new(MovementError::StepperGone))?;
        ack_rx
            .recv()
            .map_err(|_| Report::new(MovementError::StepperGone))
    }

    /// Drain the queue, then de-energize all four coils. The phase index is
    /// left where the motor stopped, so the next move resumes in phase.
    pub fn off(&self) -> Result<()> {
        let (ack_tx, ack_rx) = xch::bounded(1);
        self.cmd_tx
            .send(Command::Off(ack_tx))
            .map_err(|_| Report::new(MovementError::StepperGone))?;
        ack_rx
            .recv()
            .map_err(|_| Report::new(MovementError::StepperGone))
    }

    /// Abort any in-flight move and flush the queue. Queued waiters are
    /// released; the step counter reflects where the motor actually stopped.
    pub fn stop(&self) -> Result<()> {
        self.stop_tx
            .send(())
            .map_err(|_| Report::new(MovementError::StepperGone))?;
        self.wait()
    }

    /// Snapshot of the absolute step counter.
    pub fn get_step(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Current phase index (for orderly persistence).
    pub fn save(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// Set the phase index and drive the outputs to match.
    pub fn restore(&self, index: usize) -> Result<()> {
        let (done_tx, done_rx) = xch::bounded(1);
        self.cmd_tx
            .send(Command::Restore {
                index,
                done: done_tx,
            })
            .map_err(|_| Report::new(MovementError::StepperGone))?;
        done_rx
            .recv()
            .map_err(|_| Report::new(MovementError::StepperGone))
    }

    /// Shut down the worker and release the pins. Aborts any in-flight
    /// move. Idempotent.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.cmd_tx.send(Command::Shutdown);
            // Kick a worker that is mid-move; it finds the shutdown request
            // while flushing. Fails harmlessly once the worker is gone.
            let _ = self.stop_tx.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for Stepper {
    fn drop(&mut self) {
        self.close();
    }
}

impl StepSource for Stepper {
    fn step_count(&self) -> i64 {
        self.get_step()
    }
}

struct Worker {
    pins: [Box<dyn OutputPin>; 4],
    index: Arc<AtomicUsize>,
    count: Arc<AtomicI64>,
    on: bool,
    factor: f64,
    cmd_rx: xch::Receiver<Command>,
    stop_rx: xch::Receiver<()>,
}

impl Worker {
    fn run(mut self) {
        loop {
            select! {
                recv(self.cmd_rx) -> msg => match msg {
                    Ok(cmd) => {
                        if self.handle(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(self.stop_rx) -> msg => match msg {
                    Ok(()) => {
                        if self.flush() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        }
        self.de_energize();
    }

    /// Returns true when the worker should exit.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Move { rpm, steps } => match self.run_move(rpm, steps) {
                Ok(MoveOutcome::Done | MoveOutcome::Aborted) => false,
                Ok(MoveOutcome::Closed) => true,
                Err(e) => {
                    error!(error = %e, "stepper output failed, worker exiting");
                    true
                }
            },
            Command::Sync(ack) => {
                let _ = ack.send(());
                false
            }
            Command::Off(ack) => {
                self.de_energize();
                let _ = ack.send(());
                false
            }
            Command::Restore { index, done } => {
                self.index.store(index & 7, Ordering::Relaxed);
                let exit = match self.write_outputs() {
                    Ok(()) => {
                        self.on = true;
                        false
                    }
                    Err(e) => {
                        error!(error = %e, "stepper output failed on restore");
                        true
                    }
                };
                let _ = done.send(());
                exit
            }
            Command::Shutdown => true,
        }
    }

    fn run_move(
        &mut self,
        rpm: f64,
        steps: i64,
    ) -> std::result::Result<MoveOutcome, Box<dyn Error + Send + Sync>> {
        let dir: i64 = if steps < 0 { -1 } else { 1 };
        let delay = Duration::from_nanos((self.factor / rpm) as u64);
        trace!(steps, rpm, delay_us = delay.as_micros() as u64, "move start");
        if !self.on {
            // Re-energize the coils on the current phase row before stepping.
            self.write_outputs()?;
            self.on = true;
        }
        let ticker = xch::tick(delay);
        for _ in 0..steps.unsigned_abs() {
            let next = (self.index.load(Ordering::Relaxed) as i64 + dir).rem_euclid(8) as usize;
            self.index.store(next, Ordering::Relaxed);
            self.write_outputs()?;
            self.count.fetch_add(dir, Ordering::SeqCst);
            select! {
                recv(self.stop_rx) -> msg => {
                    let shutdown = self.flush();
                    return Ok(if msg.is_err() || shutdown {
                        MoveOutcome::Closed
                    } else {
                        MoveOutcome::Aborted
                    });
                }
                recv(ticker) -> _ => {}
            }
        }
        Ok(MoveOutcome::Done)
    }

    /// Drain pending commands without stepping, releasing any waiters.
    /// Returns true when a shutdown request was found in the queue.
    fn flush(&mut self) -> bool {
        let mut shutdown = false;
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::Sync(ack) => {
                    let _ = ack.send(());
                }
                Command::Off(ack) => {
                    self.de_energize();
                    let _ = ack.send(());
                }
                Command::Restore { done, .. } => {
                    let _ = done.send(());
                }
                Command::Move { .. } => {}
                Command::Shutdown => shutdown = true,
            }
        }
        shutdown
    }

    fn write_outputs(&mut self) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        let row = SEQUENCE[self.index.load(Ordering::Relaxed) & 7];
        for (pin, level) in self.pins.iter_mut().zip(row) {
            pin.set(level == 1)?;
        }
        Ok(())
    }

    /// Best-effort: all four coils low.
    fn de_energize(&mut self) {
        for pin in self.pins.iter_mut() {
            let _ = pin.set(false);
        }
        self.on = false;
    }
}
