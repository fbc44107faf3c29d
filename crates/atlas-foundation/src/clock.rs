//! Clock abstraction for test determinism.
//!
//! Time-sensitive components (cache TTL, scheduler offsets) read the current
//! instant through this trait so tests can advance a virtual clock instead of
//! sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed implementation.
#[derive(Debug, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock that only moves when explicitly advanced.
pub struct TestClock {
    current: parking_lot::Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            current: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Advance the virtual clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}

/// Clock handle shared across components.
pub type SharedClock = Arc<dyn Clock>;

pub fn real_clock() -> SharedClock {
    Arc::new(RealClock)
}

pub fn test_clock() -> Arc<TestClock> {
    Arc::new(TestClock::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_only_on_demand() {
        let clock = TestClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now().duration_since(t0), Duration::from_secs(3));
    }
}
