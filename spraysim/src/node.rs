//! SimNode wrapper for simulated Spray and Wait nodes.

use std::cell::Cell;

use sprayroute::debug::DebugEvent;
use sprayroute::{
    Clock, DefaultConfig, Error, Message, MessageId, NodeId, Offer, Random, Receipt,
    RouterFactory, SendOutcome, SprayRouter, TickReport, Timestamp, Transfer,
};

/// Mock clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            current: Cell::new(Timestamp::ZERO),
        }
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}

/// Mock random for simulation (deterministic LCG).
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn new() -> Self {
        Self { state: 12345 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Default for SimRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let range = max.saturating_sub(min);
        if range == 0 {
            return min;
        }
        min + (self.state % range)
    }
}

/// Router type used for every simulated node.
pub type SimRouter = SprayRouter<SimClock, SimRandom, DefaultConfig>;

/// Deterministic node identity from a seed.
pub fn node_id_from_seed(seed: u64) -> NodeId {
    let mut id = [0u8; 16];
    id[..8].copy_from_slice(b"sprayn\0\0");
    id[8..].copy_from_slice(&seed.to_be_bytes());
    id
}

/// Wrapper around a router for simulation.
///
/// Every call takes the simulation time and sets the node's clock first, so
/// any code that reads `clock.now()` sees the right time.
pub struct SimNode {
    /// The underlying router.
    inner: SimRouter,
    /// When the node was created.
    pub created_at: Timestamp,
}

impl SimNode {
    /// Create a node with a deterministic identity from `seed`.
    pub fn new(factory: &RouterFactory<DefaultConfig>, seed: u64, created_at: Timestamp) -> Self {
        let inner = factory.build(
            node_id_from_seed(seed),
            SimClock::at(created_at),
            SimRandom::with_seed(seed),
        );
        Self { inner, created_at }
    }

    /// Get the node's ID.
    pub fn node_id(&self) -> NodeId {
        *self.inner.id()
    }

    /// Get a reference to the inner router.
    pub fn inner(&self) -> &SimRouter {
        &self.inner
    }

    /// Copies held for `id`, if carried.
    pub fn copies(&self, id: MessageId) -> Option<u32> {
        self.inner.copies(id)
    }

    /// Whether the node carries `id`.
    pub fn carries(&self, id: MessageId) -> bool {
        self.inner.store().contains(id)
    }

    pub fn in_flight(&self) -> Option<&Transfer> {
        self.inner.in_flight()
    }

    fn sync(&self, now: Timestamp) {
        self.inner.clock().set(now);
    }

    pub fn link_up(&mut self, peer: NodeId, now: Timestamp) {
        self.sync(now);
        self.inner.connection_up(peer);
    }

    /// Returns the transfer aborted by the link loss, if any.
    pub fn link_down(&mut self, peer: NodeId, now: Timestamp) -> Option<Transfer> {
        self.sync(now);
        self.inner.connection_down(peer)
    }

    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        self.sync(now);
        self.inner.on_tick()
    }

    pub fn create_message(
        &mut self,
        id: MessageId,
        destination: NodeId,
        size: u64,
        now: Timestamp,
    ) -> Result<u32, Error> {
        self.sync(now);
        self.inner.create_message(id, destination, size)
    }

    pub fn accepts(&self, message: &Message, now: Timestamp) -> bool {
        self.sync(now);
        self.inner.accepts(message)
    }

    pub fn begin_transfer(&mut self, offer: Offer, now: Timestamp) -> Result<Message, Error> {
        self.sync(now);
        self.inner.begin_transfer(offer)
    }

    /// Copy count and combined utility to hand a receiver, taken just before
    /// the sender's post-send decrement.
    pub fn handoff(&self, id: MessageId, now: Timestamp) -> Result<(u32, Option<f64>), Error> {
        self.sync(now);
        let copies = self.inner.outgoing_copies(id)?;
        Ok((copies, self.inner.combined_utility()))
    }

    pub fn receive(
        &mut self,
        message: Message,
        from: NodeId,
        sender_copies: u32,
        sender_utility: Option<f64>,
        now: Timestamp,
    ) -> Result<Receipt, Error> {
        self.sync(now);
        self.inner
            .message_transferred(message, from, sender_copies, sender_utility)
    }

    pub fn transfer_done(
        &mut self,
        id: MessageId,
        now: Timestamp,
    ) -> Result<Option<SendOutcome>, Error> {
        self.sync(now);
        self.inner.transfer_done(id)
    }

    pub fn transfer_aborted(&mut self, id: MessageId, now: Timestamp) -> Result<(), Error> {
        self.sync(now);
        self.inner.transfer_aborted(id)
    }

    /// Take all debug events from the router's debug channel.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.debug_channel().try_receive() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use sprayroute::SprayConfig;

    use super::*;

    fn factory() -> RouterFactory<DefaultConfig> {
        RouterFactory::new(SprayConfig::new(6, true)).unwrap()
    }

    #[test]
    fn test_simnode_identity_deterministic() {
        let f = factory();
        let node1 = SimNode::new(&f, 42, Timestamp::ZERO);
        let node2 = SimNode::new(&f, 42, Timestamp::ZERO);
        assert_eq!(node1.node_id(), node2.node_id());

        let node3 = SimNode::new(&f, 43, Timestamp::ZERO);
        assert_ne!(node1.node_id(), node3.node_id());
    }

    #[test]
    fn test_sim_random_in_range() {
        let mut rng = SimRandom::with_seed(7);
        for _ in 0..100 {
            let v = rng.gen_range(3, 9);
            assert!((3..9).contains(&v));
        }
        assert_eq!(rng.gen_range(5, 5), 5);
    }

    #[test]
    fn test_clock_follows_calls() {
        let f = factory();
        let mut node = SimNode::new(&f, 1, Timestamp::ZERO);
        node.link_up(node_id_from_seed(2), Timestamp::from_secs(10));
        assert_eq!(node.inner().clock().now(), Timestamp::from_secs(10));

        node.link_down(node_id_from_seed(2), Timestamp::from_secs(40));
        let history = node.inner().history().peer(&node_id_from_seed(2)).unwrap();
        assert_eq!(history.contacts().len(), 1);
        assert!(!history.is_connected());
    }

    #[test]
    fn test_hop_between_simnodes() {
        let f = factory();
        let mut a = SimNode::new(&f, 1, Timestamp::ZERO);
        let mut b = SimNode::new(&f, 2, Timestamp::ZERO);
        let now = Timestamp::from_secs(1);

        a.create_message(7, node_id_from_seed(9), 100, now).unwrap();
        a.link_up(b.node_id(), now);
        b.link_up(a.node_id(), now);

        let offer = a.tick(now).plan.offers()[0];
        let message = a.begin_transfer(offer, now).unwrap();
        assert!(b.accepts(&message, now));

        let later = Timestamp::from_secs(2);
        let (copies, utility) = a.handoff(7, later).unwrap();
        assert_eq!(copies, 6);
        assert_eq!(
            b.receive(message, a.node_id(), copies, utility, later),
            Ok(Receipt::Stored)
        );
        assert_eq!(
            a.transfer_done(7, later),
            Ok(Some(SendOutcome::Relayed { before: 6, after: 3 }))
        );
        assert_eq!(b.copies(7), Some(3));
    }

    #[test]
    fn test_take_debug_events_drains() {
        let f = factory();
        let mut node = SimNode::new(&f, 1, Timestamp::ZERO);
        node.create_message(1, node_id_from_seed(2), 10, Timestamp::ZERO)
            .unwrap();

        let events = node.take_debug_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, DebugEvent::MessageCreated { id: 1, copies: 6, .. })));
        assert!(node.take_debug_events().is_empty());
    }
}
