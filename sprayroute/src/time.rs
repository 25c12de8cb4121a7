//! Time types for replication control.
//!
//! No component reads a platform clock. Timestamps come from an injected
//! [`Clock`](crate::traits::Clock) or are passed in explicitly, so simulated
//! time can be driven deterministically.

use core::ops::{Add, AddAssign, Sub};

/// Simulation timestamp in milliseconds.
///
/// Wraps a u64 to enforce explicit unit conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Simulation start. Also stands in for "never" when a pending
    /// timestamp is absent.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Maximum timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    /// Create a timestamp from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    /// Get the timestamp as milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Get the timestamp as seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Saturating subtraction of another timestamp, returning a duration.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// Duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Create a duration from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    /// Create a duration from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    /// Create a duration from minutes.
    #[inline]
    pub const fn from_mins(mins: u64) -> Self {
        Duration(mins.saturating_mul(60 * 1000))
    }

    /// Get the duration as milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Get the duration as seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Get the duration as fractional seconds.
    ///
    /// Contact metrics (t1, t2, t3) are expressed in seconds.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, other: Duration) -> Self {
        Duration(self.0.saturating_add(other.0))
    }

    /// True for the zero-length duration.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

/// A closed `[start, end]` span of simulated time with `end > start`.
///
/// Immutable once built. Used for both contact intervals (link up to link
/// down) and intercontact gaps (link down to the next link up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: Timestamp,
    end: Timestamp,
}

impl Interval {
    /// Build an interval, or `None` if it would have non-positive length.
    #[inline]
    pub const fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        if end.0 > start.0 {
            Some(Interval { start, end })
        } else {
            None
        }
    }

    /// When the interval opened.
    #[inline]
    pub const fn start(&self) -> Timestamp {
        self.start
    }

    /// When the interval closed.
    #[inline]
    pub const fn end(&self) -> Timestamp {
        self.end
    }

    /// `end - start`, always non-zero.
    #[inline]
    pub const fn duration(&self) -> Duration {
        Duration(self.end.0 - self.start.0)
    }

    /// True if the two intervals share any instant other than an endpoint.
    #[inline]
    pub const fn overlaps(&self, other: &Interval) -> bool {
        self.start.0 < other.end.0 && other.start.0 < self.end.0
    }
}
