//! Frame clocks
//!
//! Every timestamp in the animation runtime is a [`Timestamp`]: the time
//! elapsed since the clock's origin. Clocks read `tokio::time::Instant`, so a
//! paused tokio runtime drives them deterministically.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Time elapsed since a clock's origin
pub type Timestamp = Duration;

/// Source of frame timestamps
///
/// Returns `None` when no time source is available. Consumers degrade to a
/// default instead of failing.
pub trait FrameClock: Send + Sync {
    fn now(&self) -> Option<Timestamp>;
}

/// Monotonic clock anchored at its creation time
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock for MonotonicClock {
    fn now(&self) -> Option<Timestamp> {
        Some(self.origin.elapsed())
    }
}

/// Clock whose time is set explicitly by the host
///
/// Useful when the host already receives vsync timestamps, and in tests.
/// Starts unset, in which case `now()` returns `None`.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Option<Timestamp>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock that already reads `now`
    pub fn starting_at(now: Timestamp) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    /// Move the clock forward, starting from zero if it was unset
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = Some(now.unwrap_or_default() + by);
    }

    /// Make the clock unavailable again
    pub fn unset(&self) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl FrameClock for ManualClock {
    fn now(&self) -> Option<Timestamp> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Duration of one frame at `rate` frames per second
pub(crate) fn frame_period(rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(rate.max(1)))
}
