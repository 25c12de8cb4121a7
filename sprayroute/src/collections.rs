//! Bounded interval log.
//!
//! Contact and intercontact histories are append-only sequences. With an
//! unbounded window they simply grow for the length of a run; with a finite
//! window the oldest interval is evicted on overflow. Consecutive evictions
//! without intermediate growth trigger a `shrink_to_fit` (1/16 of the window,
//! minimum 1), so a log that briefly spiked gives its memory back.

use alloc::collections::VecDeque;

use crate::time::{Duration, Interval};

/// Calculate shrink threshold from the window size (1/16, minimum 1).
const fn shrink_threshold(window: usize) -> u8 {
    let threshold = window / 16;
    if threshold == 0 {
        1
    } else if threshold > u8::MAX as usize {
        u8::MAX
    } else {
        threshold as u8
    }
}

/// Chronological log of intervals, oldest first.
///
/// Appends that would overlap or precede the newest entry are refused, which
/// keeps the log non-overlapping and start-ordered.
#[derive(Clone, Debug)]
pub struct IntervalLog {
    inner: VecDeque<Interval>,
    window: usize,
    evictions: u8,
    shrink_threshold: u8,
}

impl IntervalLog {
    /// Create an empty log holding at most `window` intervals.
    pub fn with_window(window: usize) -> Self {
        Self {
            inner: VecDeque::new(),
            window: window.max(1),
            evictions: 0,
            shrink_threshold: shrink_threshold(window),
        }
    }

    /// Append an interval. Returns false if it would break ordering.
    ///
    /// Evicts the oldest interval when the window is full.
    pub fn push(&mut self, interval: Interval) -> bool {
        if let Some(last) = self.inner.back() {
            if interval.start() < last.end() {
                return false;
            }
        }
        if self.inner.len() >= self.window {
            self.inner.pop_front();
            self.evictions = self.evictions.saturating_add(1);
            self.maybe_shrink();
        } else {
            self.evictions = 0;
        }
        self.inner.push_back(interval);
        true
    }

    /// Check if shrink threshold reached and shrink if so.
    fn maybe_shrink(&mut self) {
        if self.evictions >= self.shrink_threshold {
            self.inner.shrink_to_fit();
            self.evictions = 0;
        }
    }

    /// Most recent interval.
    pub fn latest(&self) -> Option<&Interval> {
        self.inner.back()
    }

    /// Interval before the most recent one.
    pub fn previous(&self) -> Option<&Interval> {
        let len = self.inner.len();
        if len >= 2 {
            self.inner.get(len - 2)
        } else {
            None
        }
    }

    /// Sum of all durations in the log.
    pub fn total(&self) -> Duration {
        self.inner
            .iter()
            .fold(Duration::ZERO, |acc, iv| acc.saturating_add(iv.duration()))
    }

    /// Number of intervals held.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    fn iv(start: u64, end: u64) -> Interval {
        Interval::new(Timestamp::from_secs(start), Timestamp::from_secs(end)).unwrap()
    }

    #[test]
    fn test_push_and_latest() {
        let mut log = IntervalLog::with_window(usize::MAX);
        assert!(log.latest().is_none());
        assert!(log.previous().is_none());

        assert!(log.push(iv(10, 40)));
        assert!(log.push(iv(100, 130)));

        assert_eq!(log.latest(), Some(&iv(100, 130)));
        assert_eq!(log.previous(), Some(&iv(10, 40)));
        assert_eq!(log.total().as_secs(), 60);
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut log = IntervalLog::with_window(8);
        assert!(log.push(iv(10, 40)));
        // Overlaps the latest
        assert!(!log.push(iv(30, 50)));
        // Precedes the latest
        assert!(!log.push(iv(1, 5)));
        // Touching is fine
        assert!(log.push(iv(40, 41)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut log = IntervalLog::with_window(3);
        for i in 0..10 {
            log.push(iv(i * 10, i * 10 + 5));
        }
        assert_eq!(log.len(), 3);
        let starts: alloc::vec::Vec<u64> = log.iter().map(|i| i.start().as_secs()).collect();
        assert_eq!(starts, [70, 80, 90]);
    }

    #[test]
    fn test_zero_window_holds_one() {
        let mut log = IntervalLog::with_window(0);
        log.push(iv(0, 1));
        log.push(iv(2, 3));
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest(), Some(&iv(2, 3)));
    }
}
