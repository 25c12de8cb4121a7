//! Contact metric estimation.
//!
//! Reduces a peer's history to the short-horizon numbers behind the time
//! utility:
//!
//! - `t1`: duration of the most recent contact (0 if none)
//! - `t2`: duration of the contact before that (0 if none)
//! - `t3`: length of the current gap. While the peer is in range it is the
//!   gap that closed when the contact began. While it is out of range the
//!   open gap is measured up to the latest connection state change, not the
//!   wall clock, so the metrics only move on connect and disconnect events.
//! - `mu = t3 / t1 + t2`, evaluated with plain operator precedence, so `t2`
//!   is added after the division
//! - `U_time = exp(R * mu)`
//!
//! All durations are in seconds. With `t1 == 0` the division yields an
//! infinity or NaN; the combined utility guard deals with that downstream.

use crate::history::{ContactHistory, PeerHistory};
use crate::time::{Duration, Timestamp};

/// Short-horizon contact statistics for one peer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactMetrics {
    /// Latest contact duration (s).
    pub t1: f64,
    /// Previous contact duration (s).
    pub t2: f64,
    /// Current gap duration (s).
    pub t3: f64,
}

impl ContactMetrics {
    /// Metrics for one peer, with an open gap measured up to `at`.
    pub fn for_peer(history: &PeerHistory, at: Timestamp) -> Self {
        let secs = |d: Duration| d.as_secs_f64();

        let t1 = history
            .contacts()
            .latest()
            .map_or(0.0, |iv| secs(iv.duration()));
        let t2 = history
            .contacts()
            .previous()
            .map_or(0.0, |iv| secs(iv.duration()));
        let t3 = match history.disconnected_since() {
            Some(since) => secs(at.saturating_sub(since)),
            None => history
                .intercontacts()
                .latest()
                .map_or(0.0, |iv| secs(iv.duration())),
        };

        Self { t1, t2, t3 }
    }

    /// Node-level metrics: those of the peer whose contact closed last.
    ///
    /// All zeros if no contact has closed yet.
    pub fn for_node(history: &ContactHistory) -> Self {
        history
            .last_closed()
            .and_then(|peer| history.peer(&peer))
            .map(|peer| Self::for_peer(peer, history.last_change()))
            .unwrap_or_default()
    }

    /// Duty ratio `mu = t3 / t1 + t2`.
    pub fn mu(&self) -> f64 {
        self.t3 / self.t1 + self.t2
    }

    /// Time utility `exp(R * mu)`.
    pub fn time_utility(&self, smoothing_factor: f64) -> f64 {
        libm::exp(smoothing_factor * self.mu())
    }
}
