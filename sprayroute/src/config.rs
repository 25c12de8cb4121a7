//! Router configuration.
//!
//! Two layers:
//! - [`RouterConfig`]: compile-time memory bounds for the per-node maps.
//! - [`SprayConfig`]: runtime settings read once when a router is built and
//!   shared, immutable, by every router the factory produces.
//!
//! # Memory bounds
//!
//! | Config | Peers | Intervals per peer | Messages | Use |
//! |--------|------:|-------------------:|---------:|-----|
//! | `DefaultConfig` | unbounded | unbounded | unbounded | bounded-length simulation runs |
//! | `SmallConfig` | 32 | 16 | 64 | long-running or constrained nodes |
//!
//! Bounded histories evict the oldest interval first. The estimator only reads
//! the two most recent contacts and the most recent gap, so any window of at
//! least two intervals leaves utilities unchanged.
//!
//! # Example
//!
//! ```
//! use sprayroute::{SprayConfig, QueueMode, Duration};
//!
//! let cfg = SprayConfig::new(8, true)
//!     .with_utility_split()
//!     .with_queue_mode(QueueMode::Fifo)
//!     .with_message_ttl(Duration::from_mins(300));
//! assert!(cfg.validate().is_ok());
//! ```

use crate::time::Duration;
use crate::types::{
    Error, DEFAULT_BUFFER_CAPACITY, DEFAULT_INITIAL_COPIES, DEFAULT_REPLICATION_THRESHOLD,
    DEFAULT_SMOOTHING_FACTOR, DEFAULT_UTILITY_FLOOR,
};

/// Compile-time memory bounds.
///
/// All bounds must be non-zero; `MAX_INTERVALS_PER_PEER` must be at least 2.
pub trait RouterConfig {
    /// Maximum peers with tracked contact history. Beyond this the peer with
    /// the oldest activity is forgotten.
    const MAX_PEERS: usize;

    /// Maximum recorded intervals per peer, per sequence (contact and
    /// intercontact are bounded separately).
    const MAX_INTERVALS_PER_PEER: usize;

    /// Maximum messages held in the local store.
    const MAX_MESSAGES: usize;
}

/// Unbounded histories for bounded-duration simulation runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl RouterConfig for DefaultConfig {
    const MAX_PEERS: usize = usize::MAX;
    const MAX_INTERVALS_PER_PEER: usize = usize::MAX;
    const MAX_MESSAGES: usize = usize::MAX;
}

/// Windowed histories for long-running nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl RouterConfig for SmallConfig {
    const MAX_PEERS: usize = 32;
    const MAX_INTERVALS_PER_PEER: usize = 16;
    const MAX_MESSAGES: usize = 64;
}

/// Order in which replication candidates are offered each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Oldest received first.
    #[default]
    Fifo,
    /// Shuffled with the router's random source.
    Random,
}

/// What to do with a non-positive or non-finite utility operand.
///
/// `log10` is undefined for these, so one of the two has to be picked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UtilityGuard {
    /// Replace the bad operand with this value (must be > 0).
    Floor(f64),
    /// Report no utility; the split falls back to the unweighted rule.
    Skip,
}

impl Default for UtilityGuard {
    fn default() -> Self {
        UtilityGuard::Floor(DEFAULT_UTILITY_FLOOR)
    }
}

/// Start time assumed when a closing event has no pending opening timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstEncounter {
    /// Treat the missing timestamp as simulation start (`Timestamp::ZERO`).
    /// The first gap to a peer then spans from zero to the first contact.
    #[default]
    Epoch,
    /// Record nothing for an interval whose opening was never observed.
    Ignore,
}

/// Whether a replicated router inherits its prototype's contact history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryInheritance {
    /// Every replica starts with empty maps.
    #[default]
    Fresh,
    /// Replicas start with a copy of the prototype's histories and pending
    /// timestamps.
    ClonePrototype,
}

/// Runtime settings for a Spray and Wait router.
#[derive(Debug, Clone, PartialEq)]
pub struct SprayConfig {
    /// Copies issued to a message on origination (>= 1).
    pub initial_copies: u32,
    /// Binary mode: receiver gets `ceil(n/2)`, sender keeps `floor(n/2)`.
    /// Standard mode: receiver gets 1, sender keeps `n - 1`.
    pub binary_mode: bool,
    /// Split on receipt by relative combined utility instead of the fixed
    /// binary/standard rule. Sender-side accounting still follows
    /// `binary_mode`.
    pub utility_weighted: bool,
    /// `R` in `U_time = exp(R * mu)`.
    pub smoothing_factor: f64,
    /// A message is a replication candidate iff `copies_left > threshold`.
    pub replication_threshold: u32,
    /// Candidate ordering.
    pub queue_mode: QueueMode,
    /// TTL stamped on originated messages.
    pub message_ttl: Option<Duration>,
    /// Local buffer size in bytes.
    pub buffer_capacity: u64,
    /// Non-positive utility handling.
    pub utility_guard: UtilityGuard,
    /// Missing opening timestamp handling.
    pub first_encounter: FirstEncounter,
    /// History carried into replicated routers.
    pub history_inheritance: HistoryInheritance,
}

impl Default for SprayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_COPIES, true)
    }
}

impl SprayConfig {
    /// Settings with the given copy budget and mode; everything else default.
    pub fn new(initial_copies: u32, binary_mode: bool) -> Self {
        Self {
            initial_copies,
            binary_mode,
            utility_weighted: false,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            replication_threshold: DEFAULT_REPLICATION_THRESHOLD,
            queue_mode: QueueMode::default(),
            message_ttl: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            utility_guard: UtilityGuard::default(),
            first_encounter: FirstEncounter::default(),
            history_inheritance: HistoryInheritance::default(),
        }
    }

    /// Enable the utility-weighted receipt split.
    pub fn with_utility_split(mut self) -> Self {
        self.utility_weighted = true;
        self
    }

    /// Set the smoothing factor `R`.
    pub fn with_smoothing_factor(mut self, r: f64) -> Self {
        self.smoothing_factor = r;
        self
    }

    /// Set the replication threshold.
    pub fn with_replication_threshold(mut self, threshold: u32) -> Self {
        self.replication_threshold = threshold;
        self
    }

    /// Set the candidate ordering.
    pub fn with_queue_mode(mut self, mode: QueueMode) -> Self {
        self.queue_mode = mode;
        self
    }

    /// Set the TTL of originated messages.
    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = Some(ttl);
        self
    }

    /// Set the buffer capacity in bytes.
    pub fn with_buffer_capacity(mut self, bytes: u64) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    /// Set the non-positive utility policy.
    pub fn with_utility_guard(mut self, guard: UtilityGuard) -> Self {
        self.utility_guard = guard;
        self
    }

    /// Set the missing opening timestamp policy.
    pub fn with_first_encounter(mut self, policy: FirstEncounter) -> Self {
        self.first_encounter = policy;
        self
    }

    /// Set the history inheritance policy for replicated routers.
    pub fn with_history_inheritance(mut self, policy: HistoryInheritance) -> Self {
        self.history_inheritance = policy;
        self
    }

    /// Reject settings no router can run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.initial_copies == 0 {
            return Err(Error::InvalidConfig("initial_copies must be at least 1"));
        }
        if !self.smoothing_factor.is_finite() {
            return Err(Error::InvalidConfig("smoothing_factor must be finite"));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig("buffer_capacity must be non-zero"));
        }
        if let UtilityGuard::Floor(floor) = self.utility_guard {
            if !(floor.is_finite() && floor > 0.0) {
                return Err(Error::InvalidConfig("utility floor must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_unbounded() {
        assert_eq!(DefaultConfig::MAX_PEERS, usize::MAX);
        assert_eq!(DefaultConfig::MAX_INTERVALS_PER_PEER, usize::MAX);
        assert_eq!(DefaultConfig::MAX_MESSAGES, usize::MAX);
    }

    #[test]
    fn test_small_config_values() {
        assert_eq!(SmallConfig::MAX_PEERS, 32);
        assert_eq!(SmallConfig::MAX_INTERVALS_PER_PEER, 16);
        assert_eq!(SmallConfig::MAX_MESSAGES, 64);
        assert!(SmallConfig::MAX_INTERVALS_PER_PEER >= 2);
    }

    #[test]
    fn test_spray_config_defaults() {
        let cfg = SprayConfig::default();
        assert_eq!(cfg.initial_copies, DEFAULT_INITIAL_COPIES);
        assert!(cfg.binary_mode);
        assert!(!cfg.utility_weighted);
        assert_eq!(cfg.smoothing_factor, 0.5);
        assert_eq!(cfg.replication_threshold, 1);
        assert_eq!(cfg.queue_mode, QueueMode::Fifo);
        assert_eq!(cfg.utility_guard, UtilityGuard::Floor(1.0));
        assert_eq!(cfg.first_encounter, FirstEncounter::Epoch);
        assert_eq!(cfg.history_inheritance, HistoryInheritance::Fresh);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert_eq!(
            SprayConfig::new(0, true).validate(),
            Err(Error::InvalidConfig("initial_copies must be at least 1"))
        );
        assert!(SprayConfig::default()
            .with_smoothing_factor(f64::NAN)
            .validate()
            .is_err());
        assert!(SprayConfig::default()
            .with_buffer_capacity(0)
            .validate()
            .is_err());
        assert!(SprayConfig::default()
            .with_utility_guard(UtilityGuard::Floor(0.0))
            .validate()
            .is_err());
        assert!(SprayConfig::default()
            .with_utility_guard(UtilityGuard::Skip)
            .validate()
            .is_ok());
    }
}
