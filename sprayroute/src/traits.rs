//! Seams to the host environment.
//!
//! These traits let the router run under:
//! - Simulated time (driven by a discrete-event simulator) or a real clock
//! - Any buffer implementation that can report capacity and free space
//! - Any random source (only used for `QueueMode::Random`)

use crate::time::Timestamp;

/// Time source trait for real or simulated time.
///
/// Every router gets its own clock. There is no global time.
///
/// # Example (testing with MockClock)
///
/// ```
/// use sprayroute::traits::test_impls::MockClock;
/// use sprayroute::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), Timestamp::from_secs(10));
///
/// clock.set(Timestamp::from_millis(5000));
/// assert_eq!(clock.now().as_millis(), 5000);
/// ```
pub trait Clock {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Buffer occupancy query.
///
/// Capacity and free space are owned by whoever stores the messages; the
/// utility estimator only reads them.
pub trait Buffer {
    /// Total buffer size in bytes.
    fn capacity(&self) -> u64;

    /// Currently unused bytes.
    fn free_space(&self) -> u64;

    /// Bytes in use.
    fn occupied(&self) -> u64 {
        self.capacity().saturating_sub(self.free_space())
    }
}

/// Random number generator trait.
///
/// Used for:
/// - Shuffling replication candidates in `QueueMode::Random`
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use core::cell::Cell;

    use super::*;

    /// Mock clock for testing (time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        /// Jump to the given timestamp.
        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        /// Advance time by the given duration.
        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            self.current.get()
        }
    }

    /// Fixed-occupancy buffer.
    #[derive(Clone, Copy, Debug)]
    pub struct MockBuffer {
        pub capacity: u64,
        pub free: u64,
    }

    impl MockBuffer {
        pub fn new(capacity: u64, free: u64) -> Self {
            Self { capacity, free }
        }
    }

    impl Buffer for MockBuffer {
        fn capacity(&self) -> u64 {
            self.capacity
        }

        fn free_space(&self) -> u64 {
            self.free
        }
    }

    /// Mock random for testing (deterministic).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            // Simple LCG
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max - min;
            if range == 0 {
                return min;
            }
            min + (self.state % range)
        }
    }
}
