//! Monotonic time source for playback position arithmetic.

use std::time::Instant;

/// Seconds on a monotonic clock. Only differences between readings are
/// meaningful.
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
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

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
pub use manual::ManualClock;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 0.0);
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances_only_on_request() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), 0.0);
        clock.advance(2.5);
        let shared = clock.clone();
        shared.advance(0.5);
        assert_eq!(clock.now(), 3.0);
    }
}
