//! Virtual frame clock
//!
//! Monotonic time advanced once per scheduler tick, quantized to a
//! configurable minimum granularity.

use std::time::Duration;

/// Default frame delta used when driving the clock at a fixed rate (60 Hz).
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_micros(16_666);

/// Monotonic virtual clock that feeds "now" to the schedulers.
///
/// Deltas smaller than the granularity accumulate until they add up to at
/// least one granularity step, so `now()` only ever moves in steps of
/// `granularity` or more.
#[derive(Debug, Clone)]
pub struct PriorityClock {
    tick_count: u64,
    now: Duration,
    pending: Duration,
    granularity: Duration,
}

impl PriorityClock {
    pub fn new() -> Self {
        Self::with_granularity(Duration::ZERO)
    }

    pub fn with_granularity(granularity: Duration) -> Self {
        Self {
            tick_count: 0,
            now: Duration::ZERO,
            pending: Duration::ZERO,
            granularity,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Advance by one tick of `delta` and return the (possibly unchanged) current time.
    pub fn advance(&mut self, delta: Duration) -> Duration {
        self.tick_count += 1;
        self.pending += delta;
        if self.pending >= self.granularity && !self.pending.is_zero() {
            self.now += self.pending;
            self.pending = Duration::ZERO;
        }
        self.now
    }

    /// Advance by the default fixed frame duration.
    pub fn advance_frame(&mut self) -> Duration {
        self.advance(DEFAULT_FRAME_DURATION)
    }
}

impl Default for PriorityClock {
    fn default() -> Self {
        Self::new()
    }
}
