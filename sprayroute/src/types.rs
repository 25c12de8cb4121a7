//! Core types and constants for replication control.

use core::fmt;

use crate::time::{Duration, Timestamp};

/// Default number of copies issued to a newly created message.
pub const DEFAULT_INITIAL_COPIES: u32 = 6;

/// Default smoothing factor `R` in `U_time = exp(R * mu)`.
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.5;

/// Default replication threshold: replicate while `copies_left > 1`.
pub const DEFAULT_REPLICATION_THRESHOLD: u32 = 1;

/// Default local buffer capacity in bytes (5 MB).
pub const DEFAULT_BUFFER_CAPACITY: u64 = 5_000_000;

/// Default floor substituted for non-positive utility operands.
/// `log10(1.0) == 0`, so a floored operand contributes nothing.
pub const DEFAULT_UTILITY_FLOOR: f64 = 1.0;

/// Opaque 16-byte node identifier. Only used as a map key.
pub type NodeId = [u8; 16];

/// Message identifier, unique across the simulation.
pub type MessageId = u64;

/// A message carried by a node.
///
/// The copy count is deliberately absent: it lives in the
/// [`CopyLedger`](crate::policy::CopyLedger), keyed by `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Originating node.
    pub source: NodeId,
    /// Final recipient.
    pub destination: NodeId,
    /// Size in bytes (buffer accounting).
    pub size: u64,
    /// When the message was originated.
    pub created_at: Timestamp,
    /// Time to live from `created_at` (`None` = never expires).
    pub ttl: Option<Duration>,
}

impl Message {
    /// Create a message without TTL. The router stamps its configured TTL on
    /// origination.
    pub fn new(id: MessageId, source: NodeId, destination: NodeId, size: u64) -> Self {
        Self {
            id,
            source,
            destination,
            size,
            created_at: Timestamp::ZERO,
            ttl: None,
        }
    }

    /// Check whether the message has outlived its TTL.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.ttl {
            Some(ttl) => now >= self.created_at.saturating_add(ttl),
            None => false,
        }
    }
}

/// Result of offering a message to a receiving router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Receipt {
    /// Stored locally as a carried copy.
    Stored,
    /// This node is the final recipient; the message is consumed.
    Delivered,
}

/// Error type for router operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A stored message has no copy record. Integration bug.
    MissingCopyCount(MessageId),
    /// The message is already held or was already delivered here.
    DuplicateMessage(MessageId),
    /// Not enough free buffer space even after evicting what can be evicted.
    BufferFull { needed: u64, free: u64 },
    /// The message is larger than the whole buffer.
    MessageTooLarge,
    /// Rejected settings.
    InvalidConfig(&'static str),
    /// A transfer is already in flight on this router.
    TransferInProgress,
    /// Completion or abort for a transfer that was never started.
    UnknownTransfer(MessageId),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingCopyCount(id) => write!(f, "message {} has no copy count", id),
            Error::DuplicateMessage(id) => write!(f, "message {} already seen", id),
            Error::BufferFull { needed, free } => {
                write!(f, "buffer full: need {} bytes, {} free", needed, free)
            }
            Error::MessageTooLarge => write!(f, "message larger than buffer"),
            Error::InvalidConfig(reason) => write!(f, "invalid config: {}", reason),
            Error::TransferInProgress => write!(f, "transfer already in progress"),
            Error::UnknownTransfer(id) => write!(f, "no transfer in flight for message {}", id),
        }
    }
}
