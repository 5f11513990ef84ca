use std::thread;
use std::time::Duration;

use time::OffsetDateTime;

/// Wall-clock abstraction for hand scheduling.
///
/// - wall(): returns the current local wall time
/// - sleep(): sleeps for the provided duration (implementations may simulate)
///
/// Hands only ever look at the time-of-day portion of `wall()`, so a
/// simulated clock just needs a plausible `OffsetDateTime`.
pub trait Clock: Send + Sync {
    fn wall(&self) -> OffsetDateTime;
    fn sleep(&self, d: Duration);
}

/// Default clock backed by the system time.
///
/// Falls back to UTC when the local offset cannot be determined (common in
/// multi-threaded processes on Unix, where reading the TZ database is unsound).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn wall(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}
