//! Debug events for protocol tracing.
//!
//! Enabled in test builds and with the `debug` feature. Each router pushes
//! events onto its own bounded channel; when the channel is full new events
//! are dropped. The simulator drains it after every step.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::policy::SplitRule;
use crate::time::{Interval, Timestamp};
use crate::types::{MessageId, NodeId};
use crate::utility::UtilitySnapshot;

/// Debug channel depth per router.
pub const DEBUG_QUEUE_SIZE: usize = 256;

/// Per-router debug event channel. Routers are single-threaded, so no real
/// lock is needed.
pub type DebugChannel = Channel<NoopRawMutex, DebugEvent, DEBUG_QUEUE_SIZE>;

/// Emit a debug event on the router's channel.
///
/// The event expression is only evaluated when tracing is compiled in.
macro_rules! emit_debug {
    ($router:expr, $event:expr) => {
        #[cfg(any(test, feature = "debug"))]
        {
            let event = $event;
            let _ = $router.debug_channel().try_send(event);
        }
    };
}

/// Debug events emitted by the router.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    /// Message originated here.
    MessageCreated {
        timestamp: Timestamp,
        id: MessageId,
        copies: u32,
        evicted: usize,
    },
    /// Message stored after arriving from a peer.
    MessageReceived {
        timestamp: Timestamp,
        id: MessageId,
        from: NodeId,
        sender_copies: u32,
        copies: u32,
        rule: SplitRule,
    },
    /// Message arrived at its final recipient.
    MessageDelivered {
        timestamp: Timestamp,
        id: MessageId,
        from: NodeId,
    },
    /// Transfer handed to the host.
    TransferStarted { id: MessageId, to: NodeId },
    /// Sender-side accounting after a completed relay.
    SendCompleted {
        id: MessageId,
        to: NodeId,
        before: u32,
        after: u32,
    },
    /// Sender dropped its copy after a final delivery.
    DeliveryCompleted { id: MessageId, to: NodeId },
    /// Transfer aborted; copy counts untouched.
    TransferAborted { id: MessageId, to: NodeId },
    /// Transfer finished but the message was already gone.
    SendSkippedEvicted { id: MessageId },
    /// Message evicted to make room.
    MessageEvicted { id: MessageId },
    /// Message dropped on TTL.
    MessageExpired { timestamp: Timestamp, id: MessageId },
    /// Contact interval closed.
    ContactRecorded { peer: NodeId, interval: Interval },
    /// Gap interval closed.
    IntercontactRecorded { peer: NodeId, interval: Interval },
    /// Peer history dropped to stay within bounds.
    PeerEvicted { peer: NodeId },
    /// Utility recomputed.
    UtilityComputed {
        timestamp: Timestamp,
        snapshot: UtilitySnapshot,
    },
    /// A utility operand was floored or skipped.
    UtilityGuardApplied {
        timestamp: Timestamp,
        space_utility: f64,
        time_utility: f64,
    },
}
