#![forbid(unsafe_code)]
//! sprayroute - Spray and Wait replication control for opportunistic networks
//!
//! Decides, for every message a node carries, how many forwardable copies
//! exist, how they split when a copy is handed to an encountered peer, and
//! how the peer's contact pattern and buffer occupancy bias that split.
//!
//! This crate is `no_std` but **requires the `alloc` crate**. Everything runs
//! single-threaded inside callbacks from a host (a simulator or a DTN daemon);
//! time is injected through [`Clock`].
//!
//! # Key Properties
//!
//! - A message starts with `initial_copies` copies
//! - Binary mode: receiver gets `ceil(n/2)`, sender keeps `floor(n/2)`
//! - Standard mode: receiver gets 1, sender keeps `n - 1`
//! - Utility mode: receiver gets `floor(U_r / (U_s + U_r) * n)`, where
//!   `U = log10(occupied bytes) + log10(exp(R * mu))`
//! - Aborted transfers never change a copy count
//!
//! # Example
//!
//! ```
//! use sprayroute::{RouterFactory, SprayConfig, DefaultConfig, Timestamp};
//! use sprayroute::traits::test_impls::{MockClock, MockRandom};
//!
//! let factory = RouterFactory::<DefaultConfig>::new(SprayConfig::new(6, true)).unwrap();
//! let mut node = factory.build([1u8; 16], MockClock::new(), MockRandom::new());
//!
//! assert_eq!(node.create_message(42, [9u8; 16], 1024).unwrap(), 6);
//!
//! // Nothing to do until a link comes up
//! assert!(node.on_tick().plan.is_idle());
//!
//! node.clock().set(Timestamp::from_secs(10));
//! node.connection_up([2u8; 16]);
//! let plan = node.on_tick().plan;
//! assert!(plan.deliveries().is_empty());
//! assert_eq!(plan.replications().len(), 1);
//! ```
//!
//! # Module Structure
//!
//! - [`time`] - Timestamp, Duration and Interval types
//! - [`types`] - Message, identifiers and errors
//! - [`config`] - Runtime settings and compile-time memory bounds
//! - [`traits`] - Clock, Buffer and Random seams
//! - [`history`] - Per-peer contact and intercontact history
//! - [`estimator`] - Contact metrics (t1, t2, t3, mu) and time utility
//! - [`utility`] - Buffer utility and combined utility
//! - [`policy`] - Copy records and split arithmetic
//! - [`store`] - Local message store
//! - [`scheduler`] - Per-tick transfer selection
//! - [`router`] - The per-node router tying it together

#![no_std]

// Prevent test features from being used in release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It exposes mock clocks and buffers intended only for tests."
);

extern crate alloc;

pub mod collections;
pub mod config;
#[macro_use]
pub mod debug;
pub mod estimator;
pub mod history;
pub mod policy;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod time;
pub mod traits;
pub mod types;
pub mod utility;

// Re-export main types at crate root
pub use config::{
    DefaultConfig, FirstEncounter, HistoryInheritance, QueueMode, RouterConfig, SmallConfig,
    SprayConfig, UtilityGuard,
};
pub use estimator::ContactMetrics;
pub use policy::{SplitRule, SprayPhase};
pub use router::{RouterFactory, SendOutcome, SprayRouter, TickReport, Transfer};
pub use scheduler::{Offer, TickPlan};
pub use time::{Duration, Interval, Timestamp};
pub use traits::{Buffer, Clock, Random};
pub use types::{Error, Message, MessageId, NodeId, Receipt};
pub use utility::UtilitySnapshot;

// Re-export constants
pub use types::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_INITIAL_COPIES, DEFAULT_REPLICATION_THRESHOLD,
    DEFAULT_SMOOTHING_FACTOR, DEFAULT_UTILITY_FLOOR,
};

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::traits::test_impls::{MockClock, MockRandom};

    type TestRouter = SprayRouter<MockClock, MockRandom>;

    fn node(n: u8, config: &SprayConfig) -> TestRouter {
        SprayRouter::new([n; 16], config.clone(), MockClock::new(), MockRandom::new()).unwrap()
    }

    /// Hand message `id` from `from` to `to` the way a host does.
    fn hop(from: &mut TestRouter, to: &mut TestRouter, id: MessageId) -> Option<SendOutcome> {
        let message = from
            .begin_transfer(Offer {
                message: id,
                to: *to.id(),
            })
            .unwrap();
        assert!(to.accepts(&message));
        let copies = from.outgoing_copies(id).unwrap();
        let utility = from.combined_utility();
        to.message_transferred(message, *from.id(), copies, utility)
            .unwrap();
        from.transfer_done(id).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = SprayConfig::default();
        assert_eq!(config.initial_copies, DEFAULT_INITIAL_COPIES);
        assert!(config.binary_mode);
        assert_eq!(config.smoothing_factor, DEFAULT_SMOOTHING_FACTOR);
        assert_eq!(config.replication_threshold, DEFAULT_REPLICATION_THRESHOLD);
    }

    #[test]
    fn test_first_hop_scenario() {
        // initial_copies = 6, binary: receiver ceil(6/2) = 3, sender floor(6/2) = 3
        let config = SprayConfig::new(6, true);
        let mut a = node(1, &config);
        let mut b = node(2, &config);

        assert_eq!(a.create_message(1, [9; 16], 64).unwrap(), 6);
        let outcome = hop(&mut a, &mut b, 1);

        assert_eq!(b.copies(1), Some(3));
        assert_eq!(outcome, Some(SendOutcome::Relayed { before: 6, after: 3 }));
    }

    #[test]
    fn test_copies_never_exceed_budget() {
        // Spray through a chain of relays; the sum held never exceeds the budget
        let config = SprayConfig::new(16, true);
        let mut nodes: Vec<TestRouter> = (1..=8).map(|n| node(n, &config)).collect();
        nodes[0].create_message(1, [99; 16], 10).unwrap();

        let total = |nodes: &[TestRouter]| -> u32 { nodes.iter().filter_map(|n| n.copies(1)).sum() };

        for (from, to) in [(0, 1), (0, 2), (1, 3), (3, 4), (2, 5), (4, 6), (1, 7)] {
            if nodes[from].copies(1).unwrap_or(0) <= 1 {
                continue;
            }
            let (head, tail) = nodes.split_at_mut(to);
            hop(&mut head[from], &mut tail[0], 1);
            assert!(total(&nodes[..]) <= 16);
        }
        assert_eq!(total(&nodes[..]), 16);
    }

    #[test]
    fn test_wait_phase_only_delivers() {
        let config = SprayConfig::new(2, true);
        let mut a = node(1, &config);
        let mut b = node(2, &config);
        a.create_message(1, [3; 16], 10).unwrap();

        hop(&mut a, &mut b, 1);
        assert_eq!(a.phase(1), Some(SprayPhase::Wait));
        assert_eq!(b.phase(1), Some(SprayPhase::Wait));

        // A relay link gets nothing; the destination link gets the delivery
        b.connection_up([4; 16]);
        assert!(b.on_tick().plan.is_idle());
        b.connection_up([3; 16]);
        let plan = b.on_tick().plan;
        assert_eq!(
            plan.offers(),
            &[Offer {
                message: 1,
                to: [3; 16]
            }]
        );
        assert_eq!(plan.deliveries().len(), 1);
    }
}
