use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MovementError {
    #[error("invalid rpm: {0}")]
    Rpm(f64),
    #[error("stepper worker is gone")]
    StepperGone,
    #[error("{0}: calibration produced no revolution estimate")]
    Calibrate(String),
    #[error("unknown hand: {0}")]
    UnknownHand(String),
    #[error("pin error: {0}")]
    Pin(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid steps per revolution: {0}")]
    InvalidSteps(i64),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
