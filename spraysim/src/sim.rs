//! Discrete event simulator for Spray and Wait routing.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use sprayroute::debug::DebugEvent;
use sprayroute::{
    DefaultConfig, Duration, Error, Message, MessageId, NodeId, Offer, Receipt, RouterFactory,
    SendOutcome, SprayConfig, Timestamp,
};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{CopySnapshot, SimMetrics, SimulationResult};
use crate::node::SimNode;
use crate::topology::ContactPlan;

/// Default router tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A transfer occupying a sender.
#[derive(Debug, Clone)]
struct InFlight {
    id: u64,
    message: Message,
    to: NodeId,
}

/// Discrete event simulator for Spray and Wait networks.
pub struct Simulator {
    /// Shared router settings.
    factory: RouterFactory<DefaultConfig>,
    /// All nodes in the simulation.
    nodes: HashMap<NodeId, SimNode>,
    /// Node ids in insertion order, for deterministic iteration.
    order: Vec<NodeId>,
    /// Scheduled contacts and live links.
    plan: ContactPlan,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// In-flight transfer per sender.
    transfers: HashMap<NodeId, InFlight>,
    /// Next transfer identifier.
    next_transfer: u64,
    /// Interval between router ticks.
    tick_interval: Duration,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
    /// Keep drained debug events instead of discarding them.
    record_debug: bool,
    /// Debug events drained from the routers.
    debug_log: Vec<(Timestamp, NodeId, DebugEvent)>,
}

impl Simulator {
    /// Create a simulator whose nodes all run with `config`.
    pub fn new(config: SprayConfig) -> Result<Self, Error> {
        Ok(Self {
            factory: RouterFactory::new(config)?,
            nodes: HashMap::new(),
            order: Vec::new(),
            plan: ContactPlan::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            transfers: HashMap::new(),
            next_transfer: 0,
            tick_interval: DEFAULT_TICK_INTERVAL,
            snapshot_interval: None,
            next_snapshot: None,
            record_debug: false,
            debug_log: Vec::new(),
        })
    }

    /// Set the router tick interval. Applies to nodes added afterwards.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the snapshot interval for automatic copy recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Keep router debug events for inspection.
    pub fn with_debug_log(mut self) -> Self {
        self.record_debug = true;
        self
    }

    /// Schedule every window of `plan` as a link-up/link-down pair.
    pub fn with_contact_plan(mut self, plan: ContactPlan) -> Self {
        for window in plan.windows() {
            self.schedule(
                window.start,
                Event::LinkUp {
                    a: window.a,
                    b: window.b,
                    bandwidth: window.bandwidth,
                },
            );
            self.schedule(
                window.end,
                Event::LinkDown {
                    a: window.a,
                    b: window.b,
                },
            );
        }
        self.plan = plan;
        self
    }

    /// Add a node to the simulation.
    pub fn add_node(&mut self, seed: u64) -> NodeId {
        let node = SimNode::new(&self.factory, seed, self.current_time);
        let node_id = node.node_id();
        if self.nodes.insert(node_id, node).is_none() {
            self.order.push(node_id);
            self.schedule_tick(node_id, self.current_time + self.tick_interval);
        }
        node_id
    }

    /// Get a reference to a node.
    pub fn node(&self, id: &NodeId) -> Option<&SimNode> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut SimNode> {
        self.nodes.get_mut(id)
    }

    /// Get all node IDs, in the order they were added.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    /// Get the current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Get the contact plan and live link state.
    pub fn contact_plan(&self) -> &ContactPlan {
        &self.plan
    }

    /// Get collected metrics.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Debug events drained so far (empty unless enabled).
    pub fn debug_log(&self) -> &[(Timestamp, NodeId, DebugEvent)] {
        &self.debug_log
    }

    /// Sum of copy counts of `id` over every node.
    pub fn total_copies(&self, id: MessageId) -> u32 {
        self.order
            .iter()
            .filter_map(|n| self.nodes.get(n))
            .filter_map(|node| node.copies(id))
            .sum()
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a tick event for a node.
    fn schedule_tick(&mut self, node: NodeId, time: Timestamp) {
        self.schedule(time, Event::Tick { node });
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Schedule an origination.
    pub fn create_message_at(
        &mut self,
        time: Timestamp,
        id: MessageId,
        from: NodeId,
        to: NodeId,
        size: u64,
    ) {
        self.schedule(time, Event::CreateMessage { id, from, to, size });
    }

    // ==================== Run loop ====================

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|event| event.time <= end_time)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.step(event);
        }

        // Advance to end_time even if no more events
        self.advance_time(end_time);

        // Final snapshot
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until event queue is empty or max events processed.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        let mut processed = 0;

        while processed < max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.step(event);
            processed += 1;
        }

        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn step(&mut self, event: ScheduledEvent) {
        self.advance_time(event.time);
        self.process_event(event.event);
        self.drain_debug();
        self.maybe_take_snapshot();
    }

    /// Advance simulation time.
    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    /// Process a single event.
    fn process_event(&mut self, event: Event) {
        match event {
            Event::LinkUp { a, b, bandwidth } => self.link_up(a, b, bandwidth),
            Event::LinkDown { a, b } => self.link_down(a, b),
            Event::Tick { node } => {
                if self.nodes.contains_key(&node) {
                    self.try_start(node);
                    self.schedule_tick(node, self.current_time + self.tick_interval);
                }
            }
            Event::CreateMessage { id, from, to, size } => self.create_message(id, from, to, size),
            Event::TransferComplete { from, transfer } => self.complete_transfer(from, transfer),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    // ==================== Links ====================

    fn link_up(&mut self, a: NodeId, b: NodeId, bandwidth: u64) {
        if a == b || !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return;
        }
        if self.plan.is_up(a, b) {
            return;
        }
        let now = self.current_time;
        self.plan.set_up(a, b, bandwidth, now);

        for (node, peer) in [(a, b), (b, a)] {
            if let Some(sim_node) = self.nodes.get_mut(&node) {
                sim_node.link_up(peer, now);
            }
        }
        self.try_start(a);
        self.try_start(b);
    }

    fn link_down(&mut self, a: NodeId, b: NodeId) {
        if !self.plan.set_down(a, b) {
            return;
        }
        let now = self.current_time;

        for (node, peer) in [(a, b), (b, a)] {
            let aborted = self
                .nodes
                .get_mut(&node)
                .and_then(|sim_node| sim_node.link_down(peer, now));
            let ours = self.transfers.get(&node).is_some_and(|t| t.to == peer);
            if ours {
                self.transfers.remove(&node);
                self.metrics.transfers_aborted += 1;
            }
            debug_assert_eq!(aborted.is_some(), ours, "router and link disagree on abort");
        }

        // Either side may still have other links
        self.try_start(a);
        self.try_start(b);
    }

    // ==================== Messages ====================

    fn create_message(&mut self, id: MessageId, from: NodeId, to: NodeId, size: u64) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&from) else {
            self.metrics.creation_failed += 1;
            return;
        };
        match node.create_message(id, to, size, now) {
            Ok(copies) => self.metrics.record_created(id, now, copies),
            Err(_) => self.metrics.creation_failed += 1,
        }
        self.try_start(from);
    }

    /// Ask `sender` for offers and start the first one its peer accepts.
    fn try_start(&mut self, sender: NodeId) {
        if self.transfers.contains_key(&sender) {
            return;
        }
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&sender) else {
            return;
        };
        let report = node.tick(now);
        self.metrics.messages_expired += report.expired.len() as u64;

        for &offer in report.plan.offers() {
            if self.start_transfer(sender, offer) {
                break;
            }
        }
    }

    fn start_transfer(&mut self, sender: NodeId, offer: Offer) -> bool {
        let now = self.current_time;
        let Some(message) = self
            .nodes
            .get(&sender)
            .and_then(|node| node.inner().store().get(offer.message))
            .cloned()
        else {
            return false;
        };
        let Some(duration) = self
            .plan
            .link(sender, offer.to)
            .and_then(|link| link.transfer_time(message.size))
        else {
            return false;
        };
        let accepted = self
            .nodes
            .get(&offer.to)
            .is_some_and(|peer| peer.accepts(&message, now));
        if !accepted {
            return false;
        }

        let Some(node) = self.nodes.get_mut(&sender) else {
            return false;
        };
        let Ok(message) = node.begin_transfer(offer, now) else {
            return false;
        };

        let id = self.next_transfer;
        self.next_transfer += 1;
        self.transfers.insert(
            sender,
            InFlight {
                id,
                message,
                to: offer.to,
            },
        );
        self.metrics.transfers_started += 1;
        self.schedule(
            now.saturating_add(duration),
            Event::TransferComplete {
                from: sender,
                transfer: id,
            },
        );
        true
    }

    /// A transfer finished arriving. Stale completions (aborted transfers)
    /// are ignored.
    fn complete_transfer(&mut self, from: NodeId, transfer: u64) {
        if !self.transfers.get(&from).is_some_and(|t| t.id == transfer) {
            return;
        }
        let Some(InFlight { message, to, .. }) = self.transfers.remove(&from) else {
            return;
        };
        let now = self.current_time;
        let id = message.id;

        // Sender state just before its post-send decrement
        let handoff = self.nodes.get(&from).map(|node| node.handoff(id, now));
        let (copies, utility) = match handoff {
            Some(Ok(handoff)) => handoff,
            Some(Err(_)) => {
                // Evicted or expired while in flight
                if let Some(node) = self.nodes.get_mut(&from) {
                    let skipped = node.transfer_done(id, now);
                    debug_assert_eq!(skipped, Ok(None));
                }
                self.metrics.transfers_skipped += 1;
                self.try_start(from);
                return;
            }
            None => return,
        };

        let receipt = match self.nodes.get_mut(&to) {
            Some(receiver) => receiver.receive(message, from, copies, utility, now),
            None => Err(Error::UnknownTransfer(id)),
        };

        let Some(sender) = self.nodes.get_mut(&from) else {
            return;
        };
        match receipt {
            Ok(receipt) => {
                let outcome = sender.transfer_done(id, now);
                match (receipt, outcome) {
                    (Receipt::Delivered, Ok(Some(SendOutcome::Delivered))) => {
                        self.metrics.record_delivery(id, now);
                    }
                    (Receipt::Stored, Ok(Some(SendOutcome::Relayed { .. }))) => {
                        self.metrics.relays += 1;
                    }
                    (receipt, outcome) => {
                        debug_assert!(
                            outcome.is_ok(),
                            "transfer completion failed after {:?}: {:?}",
                            receipt,
                            outcome
                        );
                    }
                }
            }
            Err(_) => {
                self.metrics.transfers_rejected += 1;
                let aborted = sender.transfer_aborted(id, now);
                debug_assert!(aborted.is_ok());
            }
        }

        let total = self.total_copies(id);
        self.metrics.observe_copies(id, total);

        self.try_start(from);
        self.try_start(to);
    }

    // ==================== Actions ====================

    /// Execute a scenario action.
    fn execute_action(&mut self, action: ScenarioAction) {
        match action {
            ScenarioAction::BreakLink { a, b } => self.link_down(a, b),
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    /// Check if we should take a snapshot and do so.
    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Take a copy-count snapshot.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = CopySnapshot::new(self.current_time);

        for node_id in &self.order {
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            for message in node.inner().store().fifo() {
                snapshot.record_carrier(message.id, node.copies(message.id).unwrap_or(0));
            }
        }

        self.metrics.add_snapshot(snapshot);
    }

    /// Move router debug events out of their bounded channels.
    fn drain_debug(&mut self) {
        for node_id in &self.order {
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            let events = node.take_debug_events();
            if self.record_debug {
                let now = self.current_time;
                self.debug_log
                    .extend(events.into_iter().map(|event| (now, *node_id, event)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ContactPlan;

    fn secs(s: u64) -> Timestamp {
        Timestamp::from_secs(s)
    }

    /// Two nodes plus an unreachable destination; one window a-b.
    fn pair(window: (Timestamp, Timestamp)) -> (Simulator, NodeId, NodeId, NodeId) {
        let mut sim = Simulator::new(SprayConfig::new(6, true)).unwrap();
        let a = sim.add_node(1);
        let b = sim.add_node(2);
        let c = sim.add_node(3);

        let mut plan = ContactPlan::new();
        plan.add_window(a, b, window.0, window.1, 1000);
        let mut sim = sim.with_contact_plan(plan);
        sim.create_message_at(Timestamp::ZERO, 1, a, c, 1000);
        (sim, a, b, c)
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Simulator::new(SprayConfig::new(0, true)).is_err());
    }

    #[test]
    fn test_add_nodes() {
        let mut sim = Simulator::new(SprayConfig::default()).unwrap();
        let n1 = sim.add_node(1);
        let n2 = sim.add_node(2);

        assert_ne!(n1, n2);
        assert_eq!(sim.node_ids(), [n1, n2]);
        assert!(sim.node(&n1).is_some());
    }

    #[test]
    fn test_relay_on_contact() {
        let (mut sim, a, b, _) = pair((secs(10), secs(40)));

        // 1000 bytes at 1000 B/s: starts at 10s, lands at 11s
        sim.run_until(Timestamp::from_millis(10_999));
        assert!(sim.node(&a).unwrap().in_flight().is_some());
        assert_eq!(sim.node(&b).unwrap().copies(1), None);

        let result = sim.run_until(secs(60));
        assert_eq!(sim.node(&a).unwrap().copies(1), Some(3));
        assert_eq!(sim.node(&b).unwrap().copies(1), Some(3));
        assert_eq!(result.metrics.relays, 1);
        assert_eq!(result.metrics.transfers_started, 1);
        assert!(result.metrics.copies_conserved());
    }

    #[test]
    fn test_link_down_aborts_transfer() {
        let (mut sim, a, b, _) = pair((secs(10), Timestamp::from_millis(10_500)));

        let result = sim.run_until(secs(20));
        assert_eq!(result.metrics.transfers_aborted, 1);
        assert_eq!(result.metrics.relays, 0);
        assert_eq!(sim.node(&a).unwrap().copies(1), Some(6));
        assert!(sim.node(&a).unwrap().in_flight().is_none());
        assert!(!sim.node(&b).unwrap().carries(1));
    }

    #[test]
    fn test_delivery_to_destination() {
        let mut sim = Simulator::new(SprayConfig::new(4, true)).unwrap();
        let a = sim.add_node(1);
        let b = sim.add_node(2);

        let mut plan = ContactPlan::new();
        plan.add_window(a, b, secs(10), secs(40), 1000);
        let mut sim = sim.with_contact_plan(plan);
        sim.create_message_at(Timestamp::ZERO, 1, a, b, 1000);

        let result = sim.run_until(secs(60));
        assert!(result.metrics.is_delivered(1));
        assert_eq!(result.metrics.latency(1), Some(Duration::from_secs(11)));
        assert!(!sim.node(&a).unwrap().carries(1));
        assert!(sim.node(&b).unwrap().inner().has_delivered(1));
        assert!(result.all_delivered());
    }

    #[test]
    fn test_break_link_action() {
        let (mut sim, a, b, _) = pair((secs(10), secs(40)));
        sim.schedule_action(
            Timestamp::from_millis(10_200),
            ScenarioAction::BreakLink { a, b },
        );

        let result = sim.run_until(secs(60));
        assert!(!sim.contact_plan().is_up(a, b));
        assert_eq!(result.metrics.transfers_aborted, 1);
        assert_eq!(sim.node(&a).unwrap().copies(1), Some(6));
    }

    #[test]
    fn test_duplicate_creation_counted() {
        let mut sim = Simulator::new(SprayConfig::default()).unwrap();
        let a = sim.add_node(1);
        sim.create_message_at(secs(1), 5, a, [9; 16], 10);
        sim.create_message_at(secs(2), 5, a, [9; 16], 10);

        let result = sim.run_until(secs(3));
        assert_eq!(result.metrics.messages_created, 1);
        assert_eq!(result.metrics.creation_failed, 1);
    }

    #[test]
    fn test_snapshots() {
        let (sim, _, _, _) = pair((secs(10), secs(40)));
        let mut sim = sim.with_snapshot_interval(Duration::from_secs(5));
        let result = sim.run_until(secs(20));

        let first = &result.metrics.snapshots[0];
        assert_eq!(first.total(1), 6);
        assert_eq!(first.carrier_count(1), 1);

        let last = result.metrics.latest_snapshot().unwrap();
        assert_eq!(last.total(1), 6);
        assert_eq!(last.carrier_count(1), 2);
    }

    #[test]
    fn test_debug_log() {
        let (sim, a, _, _) = pair((secs(10), secs(40)));
        let mut sim = sim.with_debug_log();
        sim.run_until(secs(20));

        assert!(sim.debug_log().iter().any(|(_, node, event)| *node == a
            && matches!(event, DebugEvent::SendCompleted { before: 6, after: 3, .. })));
    }
}
