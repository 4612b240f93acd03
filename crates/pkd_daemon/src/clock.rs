//! Time source for timers and ledger timestamps.
//!
//! Every deadline in the daemon is computed from a [`Clock`] so tests can
//! drive watchdogs, grace periods and debounce timers without sleeping.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic now, used for deadlines and runtimes.
    fn now(&self) -> Instant;

    /// Seconds since the Unix epoch, used for ledger timestamps.
    fn unix_time(&self) -> u64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    unix_base: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self::starting_at(1_700_000_000)
    }

    /// Creates a clock whose wall time starts at `unix_base` seconds.
    pub fn starting_at(unix_base: u64) -> Self {
        Self {
            base: Instant::now(),
            unix_base,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Moves the clock forward to `instant`, if it lies in the future.
    pub fn advance_to(&self, instant: Instant) {
        let mut offset = self.offset.lock();
        let target = instant.saturating_duration_since(self.base);
        if target > *offset {
            *offset = target;
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn unix_time(&self) -> u64 {
        self.unix_base + self.offset.lock().as_secs()
    }
}
