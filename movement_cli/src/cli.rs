//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "movement", version, about = "Stepper clock movement driver")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/movement.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to the
    /// config's logging.level, then "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate and drive the physical clock (requires the `hardware` feature)
    Run {
        /// Seconds between status log lines (0 disables them)
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        status_every: u64,
    },
    /// Drive a virtual movement with simulated gearing and encoder
    Sim {
        /// Stop after this many seconds (0 = run forever)
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        duration: u64,
    },
    /// Parse and validate the configuration, then exit
    Check,
}
