//! Copy allocation policy.
//!
//! Every locally held message has a copy record: how many forwardable
//! replicas this node still controls. The record moves through:
//!
//! ```text
//! origination ──► Spraying (copies_left > 1) ──► Wait (copies_left <= 1)
//!                      │  send completes: sender keeps floor(n/2) or n-1
//!                      ▼
//!                 receiver: ceil(n/2), 1, or floor(U_r / (U_s + U_r) * n)
//! ```
//!
//! Delivery and drops are owned by the message store; the record is discarded
//! together with the message.

use hashbrown::HashMap;

use crate::config::SprayConfig;
use crate::time::Duration;
use crate::types::{Error, MessageId};
use crate::utility::receiver_share;

/// Copy record attached to one locally held message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRecord {
    /// Replicas this node may still hand out, itself included.
    pub copies_left: u32,
    /// TTL carried with the message.
    pub ttl: Option<Duration>,
}

/// Replication phase of a message on one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SprayPhase {
    /// More than one copy left: still handing out replicas.
    Spraying,
    /// One copy (or none) left: direct delivery only.
    Wait,
}

impl SprayPhase {
    /// Phase for a given copy count.
    pub fn of(copies_left: u32) -> Self {
        if copies_left > 1 {
            SprayPhase::Spraying
        } else {
            SprayPhase::Wait
        }
    }
}

/// Rule that produced a receiver's copy count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitRule {
    /// Receiver gets exactly one copy.
    Standard,
    /// Receiver gets `ceil(n/2)`.
    Binary,
    /// Receiver gets its utility share of `n`.
    Utility,
    /// Sender had a single copy; nothing to split.
    Single,
}

/// Copy arithmetic, fixed at router construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyPolicy {
    initial_copies: u32,
    binary_mode: bool,
    utility_weighted: bool,
    threshold: u32,
}

impl CopyPolicy {
    /// Build the policy from validated settings.
    pub fn from_config(config: &SprayConfig) -> Self {
        Self {
            initial_copies: config.initial_copies.max(1),
            binary_mode: config.binary_mode,
            utility_weighted: config.utility_weighted,
            threshold: config.replication_threshold,
        }
    }

    /// Copies issued on origination.
    pub fn initial_copies(&self) -> u32 {
        self.initial_copies
    }

    /// Copies a receiver gets from a sender holding `sender_copies` before
    /// the send.
    ///
    /// `utilities` is `(U_sender, U_receiver)` as seen at transfer time; it
    /// is only consulted in utility-weighted mode. If no share can be
    /// computed the fixed binary/standard rule applies.
    ///
    /// The result is at least 1: the arriving message is itself a copy.
    pub fn receiver_copies(
        &self,
        sender_copies: u32,
        utilities: (Option<f64>, Option<f64>),
    ) -> (u32, SplitRule) {
        if sender_copies <= 1 {
            return (1, SplitRule::Single);
        }
        if self.utility_weighted {
            if let Some(share) = receiver_share(utilities.0, utilities.1) {
                let copies = libm::floor(share * sender_copies as f64) as u32;
                // A negligible share still hands over the copy in transit
                return (copies.clamp(1, sender_copies), SplitRule::Utility);
            }
        }
        self.fixed_split(sender_copies)
    }

    fn fixed_split(&self, n: u32) -> (u32, SplitRule) {
        if self.binary_mode {
            (n.div_ceil(2), SplitRule::Binary)
        } else {
            (1, SplitRule::Standard)
        }
    }

    /// Sender's copies after a completed send.
    pub fn sender_copies_after_send(&self, before: u32) -> u32 {
        if self.binary_mode {
            before / 2
        } else {
            before.saturating_sub(1)
        }
    }

    /// Whether a message with this many copies may be replicated.
    pub fn is_candidate(&self, copies_left: u32) -> bool {
        copies_left > self.threshold
    }
}

/// Copy records of all messages held by one node, keyed by message.
#[derive(Clone, Debug, Default)]
pub struct CopyLedger {
    records: HashMap<MessageId, CopyRecord>,
}

impl CopyLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly originated message with the full copy budget.
    pub fn originate(&mut self, id: MessageId, ttl: Option<Duration>, policy: &CopyPolicy) -> u32 {
        let copies_left = policy.initial_copies();
        self.records.insert(id, CopyRecord { copies_left, ttl });
        copies_left
    }

    /// Record a message received from a peer with its split copy count.
    pub fn receive(&mut self, id: MessageId, ttl: Option<Duration>, copies_left: u32) {
        self.records.insert(id, CopyRecord { copies_left, ttl });
    }

    /// Apply the post-send decrement. Returns `(before, after)`.
    pub fn complete_send(
        &mut self,
        id: MessageId,
        policy: &CopyPolicy,
    ) -> Result<(u32, u32), Error> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(Error::MissingCopyCount(id))?;
        let before = record.copies_left;
        record.copies_left = policy.sender_copies_after_send(before);
        Ok((before, record.copies_left))
    }

    /// Copies left for a message.
    pub fn copies(&self, id: MessageId) -> Option<u32> {
        self.records.get(&id).map(|r| r.copies_left)
    }

    /// Copies left for a message that must have a record.
    pub fn require(&self, id: MessageId) -> Result<u32, Error> {
        self.copies(id).ok_or(Error::MissingCopyCount(id))
    }

    /// Full record for a message.
    pub fn record(&self, id: MessageId) -> Option<&CopyRecord> {
        self.records.get(&id)
    }

    /// Replication phase of a message.
    pub fn phase(&self, id: MessageId) -> Option<SprayPhase> {
        self.copies(id).map(SprayPhase::of)
    }

    /// Discard the record with its message.
    pub fn remove(&mut self, id: MessageId) -> Option<CopyRecord> {
        self.records.remove(&id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
