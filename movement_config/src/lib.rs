use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// One `[hands.<name>]` section.
///
/// Sample config:
/// ```toml
/// [hands.hours]
/// stepper_pins = [4, 17, 27, 22]
/// rpm = 3.0
/// period_secs = 43200
/// update_secs = 300
/// steps = 4096
/// encoder_pin = 24
/// mark_width = 200
/// offset = 2100
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HandCfg {
    /// Four GPIO numbers for the stepper coil outputs, in phase order.
    pub stepper_pins: [u8; 4],
    /// Stepping speed in RPM.
    pub rpm: f64,
    /// Wall duration of one full revolution of this hand, in seconds.
    pub period_secs: u64,
    /// How often the hand is repositioned, in seconds.
    pub update_secs: u64,
    /// Nominal half-steps per revolution (reference; the encoder refines it).
    pub steps: i64,
    /// GPIO number of the slotted-disk encoder input.
    pub encoder_pin: u8,
    /// Minimum width of a qualifying encoder mark, in half-steps.
    pub mark_width: i64,
    /// Signed half-step distance from the encoder mark to 12 o'clock.
    #[serde(default)]
    pub offset: i64,
    /// Invert the encoder input (active-low sensors).
    #[serde(default)]
    pub invert: bool,
    /// Discard edges closer than this many half-steps to the previous one.
    #[serde(default = "default_debounce")]
    pub debounce: i64,
}

fn default_debounce() -> i64 {
    5
}

/// Optional log sink for long unattended runs. The console subscriber is
/// configured by the CLI; these only control the extra file output.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// Path of the log file; no file sink when unset.
    pub file: Option<String>,
    /// Default filter when RUST_LOG and --log-level are absent,
    /// e.g. "info" or "movement_core=debug".
    pub level: Option<String>,
    /// Rotate the file "daily" or "hourly"; anything else never rotates.
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub hands: BTreeMap<String, HandCfg>,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no hands configured")]
    NoHands,
    #[error("{hand}: {reason}")]
    Hand { hand: String, reason: &'static str },
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Reject configs the control core cannot run with. Parse errors are
    /// caught by serde; this covers value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hands.is_empty() {
            return Err(ConfigError::NoHands);
        }
        for (name, h) in &self.hands {
            let fail = |reason| {
                Err(ConfigError::Hand {
                    hand: name.clone(),
                    reason,
                })
            };
            if h.steps <= 30 {
                return fail("steps per revolution must be > 30");
            }
            if !h.rpm.is_finite() || h.rpm <= 0.0 {
                return fail("rpm must be > 0");
            }
            if h.update_secs == 0 {
                return fail("update_secs must be > 0");
            }
            if h.period_secs < h.update_secs {
                return fail("period_secs must be >= update_secs");
            }
            if h.mark_width <= 0 {
                return fail("mark_width must be > 0");
            }
            if h.debounce < 0 {
                return fail("debounce must be >= 0");
            }
        }
        Ok(())
    }
}
