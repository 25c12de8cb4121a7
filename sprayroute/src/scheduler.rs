//! Per-tick transfer selection.
//!
//! The router does not move bytes. Each tick it hands the host an ordered
//! list of offers; the host starts the first one the peer accepts and reports
//! back through `begin_transfer` / `transfer_done` / `transfer_aborted`.
//!
//! Order of preference:
//! 1. Skip the tick if a transfer is in flight or no link is open.
//! 2. Messages whose destination is directly reachable.
//! 3. Replication candidates (`copies_left > threshold`), ordered by
//!    [`QueueMode`], offered connection by connection.
//!
//! Both groups go into one list, so a refused delivery falls through to
//! replication in the same tick.

use alloc::vec::Vec;

use crate::config::QueueMode;
use crate::traits::Random;
use crate::types::{Message, MessageId, NodeId};

/// One proposed transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Offer {
    pub message: MessageId,
    pub to: NodeId,
}

/// What the router would like to send this tick.
///
/// Deliveries come first, replication offers after them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickPlan {
    offers: Vec<Offer>,
    /// Number of leading offers that are final deliveries.
    deliveries: usize,
}

impl TickPlan {
    /// Nothing to do (busy, no links, or nothing eligible).
    pub const fn idle() -> Self {
        Self {
            offers: Vec::new(),
            deliveries: 0,
        }
    }

    /// All offers in preference order.
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    /// Offers to a message's destination.
    pub fn deliveries(&self) -> &[Offer] {
        &self.offers[..self.deliveries]
    }

    /// Offers to intermediate nodes.
    pub fn replications(&self) -> &[Offer] {
        &self.offers[self.deliveries..]
    }

    /// Check if there is nothing to offer.
    pub fn is_idle(&self) -> bool {
        self.offers.is_empty()
    }
}

/// Shuffle in place (Fisher-Yates).
fn shuffle<T, R: Random + ?Sized>(items: &mut [T], random: &mut R) {
    for i in (1..items.len()).rev() {
        let j = random.gen_range(0, i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// Build this tick's plan.
///
/// `queue` is the local store in FIFO order. `is_candidate` tells whether a
/// message may be replicated (copy threshold).
pub fn plan<R, F>(
    busy: bool,
    connections: &[NodeId],
    queue: &[&Message],
    is_candidate: F,
    mode: QueueMode,
    random: &mut R,
) -> TickPlan
where
    R: Random + ?Sized,
    F: Fn(MessageId) -> bool,
{
    if busy || connections.is_empty() || queue.is_empty() {
        return TickPlan::idle();
    }

    let mut offers = Vec::new();
    for peer in connections {
        for m in queue.iter().filter(|m| m.destination == *peer) {
            offers.push(Offer {
                message: m.id,
                to: *peer,
            });
        }
    }
    let deliveries = offers.len();

    let mut candidates: Vec<&Message> = queue
        .iter()
        .copied()
        .filter(|m| is_candidate(m.id))
        .collect();
    if mode == QueueMode::Random {
        shuffle(&mut candidates, random);
    }

    for peer in connections {
        // The source already holds the message; the destination was offered above
        for m in candidates
            .iter()
            .filter(|m| m.source != *peer && m.destination != *peer)
        {
            offers.push(Offer {
                message: m.id,
                to: *peer,
            });
        }
    }

    TickPlan { offers, deliveries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::MockRandom;

    const ME: NodeId = [1u8; 16];
    const B: NodeId = [2u8; 16];
    const C: NodeId = [3u8; 16];
    const D: NodeId = [4u8; 16];

    fn msg(id: MessageId, destination: NodeId) -> Message {
        Message::new(id, ME, destination, 10)
    }

    fn any(_: MessageId) -> bool {
        true
    }

    #[test]
    fn test_idle_when_busy_or_unconnected() {
        let m = msg(1, D);
        let mut rng = MockRandom::new();
        assert!(plan(true, &[B], &[&m], any, QueueMode::Fifo, &mut rng).is_idle());
        assert!(plan(false, &[], &[&m], any, QueueMode::Fifo, &mut rng).is_idle());
        assert!(plan(false, &[B], &[], any, QueueMode::Fifo, &mut rng).is_idle());
    }

    #[test]
    fn test_delivery_preferred() {
        let relay = msg(1, D);
        let direct = msg(2, C);
        let mut rng = MockRandom::new();

        let p = plan(false, &[B, C], &[&relay, &direct], any, QueueMode::Fifo, &mut rng);
        assert_eq!(p.deliveries(), &[Offer { message: 2, to: C }]);
        assert_eq!(p.offers()[0], Offer { message: 2, to: C });
    }

    #[test]
    fn test_replication_follows_deliveries() {
        let relay = msg(1, D);
        let direct = msg(2, C);
        let mut rng = MockRandom::new();

        // A refused delivery to C still leaves replication offers to try
        let p = plan(false, &[B, C], &[&relay, &direct], any, QueueMode::Fifo, &mut rng);
        let order: Vec<(MessageId, NodeId)> = p.offers().iter().map(|o| (o.message, o.to)).collect();
        assert_eq!(order, [(2, C), (1, B), (2, B), (1, C)]);
        assert_eq!(p.replications().len(), 3);

        // Direct-only messages still produce just the delivery
        let p = plan(false, &[B, C], &[&relay, &direct], |id| id == 2, QueueMode::Fifo, &mut rng);
        assert_eq!(p.deliveries().len(), 1);
        assert_eq!(p.replications(), &[Offer { message: 2, to: B }]);

        let p = plan(false, &[C], &[&direct], |_| false, QueueMode::Fifo, &mut rng);
        assert_eq!(p.offers(), p.deliveries());
        assert!(p.replications().is_empty());
    }

    #[test]
    fn test_replication_connection_major() {
        let m1 = msg(1, D);
        let m2 = msg(2, D);
        let mut rng = MockRandom::new();

        let p = plan(false, &[B, C], &[&m1, &m2], any, QueueMode::Fifo, &mut rng);
        let order: Vec<(MessageId, NodeId)> = p.offers().iter().map(|o| (o.message, o.to)).collect();
        assert_eq!(order, [(1, B), (2, B), (1, C), (2, C)]);
    }

    #[test]
    fn test_threshold_filters_candidates() {
        let m1 = msg(1, D);
        let m2 = msg(2, D);
        let mut rng = MockRandom::new();

        let p = plan(false, &[B], &[&m1, &m2], |id| id == 2, QueueMode::Fifo, &mut rng);
        assert_eq!(p.offers(), &[Offer { message: 2, to: B }]);

        let none = plan(false, &[B], &[&m1, &m2], |_| false, QueueMode::Fifo, &mut rng);
        assert!(none.is_idle());
    }

    #[test]
    fn test_not_offered_back_to_source() {
        let from_b = Message::new(1, B, D, 10);
        let mut rng = MockRandom::new();
        let p = plan(false, &[B], &[&from_b], any, QueueMode::Fifo, &mut rng);
        assert!(p.is_idle());
    }

    #[test]
    fn test_random_mode_permutes() {
        let msgs: Vec<Message> = (0..8).map(|i| msg(i, D)).collect();
        let queue: Vec<&Message> = msgs.iter().collect();
        let mut rng = MockRandom::with_seed(99);

        let p = plan(false, &[B], &queue, any, QueueMode::Random, &mut rng);
        let mut ids: Vec<MessageId> = p.offers().iter().map(|o| o.message).collect();
        assert_eq!(ids.len(), 8);
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }
}
