//! Fixed-rate tick scheduling.
//!
//! The client advances in whole ticks of [`TICK`]. Wall-clock time is
//! accumulated and converted into due ticks, so a slow iteration catches up
//! instead of drifting.

use std::time::{Duration, Instant};

use tracing::warn;

/// Length of one client tick: 600 ms, the host's game tick.
pub const TICK: Duration = Duration::from_millis(600);

/// Longest stretch of elapsed time credited at once. Anything beyond is
/// dropped rather than replayed as a burst of ticks.
pub const MAX_CATCH_UP: Duration = Duration::from_secs(3);

/// Accumulator converting elapsed time into due ticks.
#[derive(Debug)]
pub struct TickClock {
    previous: Instant,
    accumulator: Duration,
    ticks: u64,
}

impl TickClock {
    pub fn new() -> Self {
        Self {
            previous: Instant::now(),
            accumulator: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Measures the time since the last call and returns how many ticks are
    /// due.
    pub fn poll(&mut self) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.previous);
        self.previous = now;
        self.advance(elapsed)
    }

    /// Credits `elapsed` and returns how many ticks are due.
    pub fn advance(&mut self, mut elapsed: Duration) -> u32 {
        if elapsed > MAX_CATCH_UP {
            warn!(
                "Fell {:.1}s behind, skipping ahead by {:.1}s",
                elapsed.as_secs_f64(),
                MAX_CATCH_UP.as_secs_f64()
            );
            elapsed = MAX_CATCH_UP;
        }

        self.accumulator += elapsed;
        let mut due = 0;
        while self.accumulator >= TICK {
            self.accumulator -= TICK;
            due += 1;
        }
        self.ticks += u64::from(due);
        due
    }

    /// Time left until the next tick is due.
    pub fn until_next(&self) -> Duration {
        TICK.saturating_sub(self.accumulator)
    }

    /// Ticks handed out so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
