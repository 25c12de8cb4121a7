//! Event types and priority queue ordering for the contact simulation.

use std::cmp::Ordering;

use sprayroute::{MessageId, NodeId, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Tear a link down outside the contact plan (interference, node failure).
    BreakLink { a: NodeId, b: NodeId },
    /// Record per-message copy totals.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Two nodes come into range.
    LinkUp {
        a: NodeId,
        b: NodeId,
        /// Bytes per second.
        bandwidth: u64,
    },
    /// Two nodes go out of range.
    LinkDown { a: NodeId, b: NodeId },
    /// Periodic router update for a node.
    Tick { node: NodeId },
    /// A node originates a message.
    CreateMessage {
        id: MessageId,
        from: NodeId,
        to: NodeId,
        size: u64,
    },
    /// A transfer finished arriving at the receiver.
    TransferComplete {
        from: NodeId,
        /// Identifies the transfer; stale after an abort.
        transfer: u64,
    },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Min-heap ordering (BinaryHeap is a max-heap, so compare reversed).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn tick(secs: u64, seq: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            Timestamp::from_secs(secs),
            SequenceNumber::new(seq),
            Event::Tick { node: [0u8; 16] },
        )
    }

    #[test]
    fn test_event_ordering() {
        // Earlier time is "greater" in min-heap terms
        assert!(tick(5, 2) > tick(10, 1));
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        assert!(tick(10, 1) > tick(10, 2));
    }

    #[test]
    fn test_heap_pops_in_time_order() {
        let mut heap = BinaryHeap::new();
        heap.push(tick(30, 0));
        heap.push(tick(10, 1));
        heap.push(tick(10, 2));
        heap.push(tick(20, 3));

        let order: Vec<(u64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.time.as_secs(), e.seq.value()))
            .collect();
        assert_eq!(order, [(10, 1), (10, 2), (20, 3), (30, 0)]);
    }
}
