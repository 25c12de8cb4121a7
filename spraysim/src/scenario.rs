//! Scenario builder for setting up and running simulations.

use sprayroute::{Duration, Error, MessageId, NodeId, SprayConfig, Timestamp};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::sim::{Simulator, DEFAULT_TICK_INTERVAL};
use crate::topology::{ContactPlan, DEFAULT_BANDWIDTH};

/// Contact pattern described by node index.
#[derive(Debug, Clone)]
enum Contacts {
    /// A single window.
    Window {
        a: usize,
        b: usize,
        start: Timestamp,
        end: Timestamp,
    },
    /// Repeating windows.
    Periodic {
        a: usize,
        b: usize,
        first: Timestamp,
        up: Duration,
        period: Duration,
        count: usize,
    },
    /// Node i meets node i+1 one after another.
    Chain {
        start: Timestamp,
        up: Duration,
        gap: Duration,
    },
    /// Random pairwise contacts until `horizon`.
    Random {
        horizon: Timestamp,
        mean_gap: Duration,
        mean_contact: Duration,
    },
}

/// Scheduled action described by node index.
#[derive(Debug, Clone)]
enum IndexedAction {
    BreakLink { a: usize, b: usize },
    TakeSnapshot,
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    /// Number of nodes to create.
    num_nodes: usize,
    /// RNG seed for determinism.
    seed: u64,
    /// Router settings shared by every node.
    config: SprayConfig,
    /// Link bandwidth in bytes per second.
    bandwidth: u64,
    /// Router tick interval.
    tick_interval: Duration,
    /// Contact patterns.
    contacts: Vec<Contacts>,
    /// Messages: (time, id, from, to, size).
    messages: Vec<(Timestamp, MessageId, usize, usize, u64)>,
    /// Scheduled actions.
    actions: Vec<(Timestamp, IndexedAction)>,
    /// Snapshot interval.
    snapshot_interval: Option<Duration>,
    /// Keep router debug events.
    debug_log: bool,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// Create a new scenario with the specified number of nodes.
    ///
    /// Nodes never meet unless contacts are added.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            config: SprayConfig::default(),
            bandwidth: DEFAULT_BANDWIDTH,
            tick_interval: DEFAULT_TICK_INTERVAL,
            contacts: Vec::new(),
            messages: Vec::new(),
            actions: Vec::new(),
            snapshot_interval: None,
            debug_log: false,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the router settings.
    pub fn with_config(mut self, config: SprayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set link bandwidth in bytes per second.
    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Set the router tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set snapshot interval for metrics collection.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Keep router debug events in the simulator.
    pub fn with_debug_log(mut self) -> Self {
        self.debug_log = true;
        self
    }

    /// Nodes `a` and `b` are in range from `start` to `end`.
    pub fn contact(mut self, a: usize, b: usize, start: Timestamp, end: Timestamp) -> Self {
        self.contacts.push(Contacts::Window { a, b, start, end });
        self
    }

    /// Nodes `a` and `b` meet `count` times, for `up` every `period`.
    pub fn periodic_contact(
        mut self,
        a: usize,
        b: usize,
        first: Timestamp,
        up: Duration,
        period: Duration,
        count: usize,
    ) -> Self {
        self.contacts.push(Contacts::Periodic {
            a,
            b,
            first,
            up,
            period,
            count,
        });
        self
    }

    /// Node 0 meets node 1, then node 1 meets node 2, and so on.
    pub fn chain_contacts(mut self, start: Timestamp, up: Duration, gap: Duration) -> Self {
        self.contacts.push(Contacts::Chain { start, up, gap });
        self
    }

    /// Random contacts between every pair until `horizon`.
    pub fn random_contacts(
        mut self,
        horizon: Timestamp,
        mean_gap: Duration,
        mean_contact: Duration,
    ) -> Self {
        self.contacts.push(Contacts::Random {
            horizon,
            mean_gap,
            mean_contact,
        });
        self
    }

    /// Node `from` originates a message to node `to` at `time`.
    ///
    /// Message ids are assigned from 1 in call order.
    pub fn message(mut self, time: Timestamp, from: usize, to: usize, size: u64) -> Self {
        let id = self.messages.len() as MessageId + 1;
        self.messages.push((time, id, from, to, size));
        self
    }

    /// Tear the link between `a` and `b` down at `time`.
    pub fn break_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((time, IndexedAction::BreakLink { a, b }));
        self
    }

    /// Schedule a snapshot at the specified time.
    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, IndexedAction::TakeSnapshot));
        self
    }

    /// Build the simulator with all nodes, contacts and messages.
    ///
    /// Contacts, messages and actions naming an index past `num_nodes` are
    /// skipped.
    pub fn build(self) -> Result<(Simulator, Vec<NodeId>), Error> {
        let mut sim = Simulator::new(self.config)?.with_tick_interval(self.tick_interval);

        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }
        if self.debug_log {
            sim = sim.with_debug_log();
        }

        let node_ids: Vec<NodeId> = (0..self.num_nodes)
            .map(|i| sim.add_node(self.seed.wrapping_add(i as u64 * 1000)))
            .collect();
        let node = |i: usize| node_ids.get(i).copied();

        let mut plan = ContactPlan::new();
        for contacts in &self.contacts {
            match *contacts {
                Contacts::Window { a, b, start, end } => {
                    if let (Some(a), Some(b)) = (node(a), node(b)) {
                        plan.add_window(a, b, start, end, self.bandwidth);
                    }
                }
                Contacts::Periodic {
                    a,
                    b,
                    first,
                    up,
                    period,
                    count,
                } => {
                    if let (Some(a), Some(b)) = (node(a), node(b)) {
                        plan.add_periodic(a, b, first, up, period, count, self.bandwidth);
                    }
                }
                Contacts::Chain { start, up, gap } => {
                    let mut t = start;
                    for pair in node_ids.windows(2) {
                        plan.add_window(pair[0], pair[1], t, t + up, self.bandwidth);
                        t = t + up + gap;
                    }
                }
                Contacts::Random {
                    horizon,
                    mean_gap,
                    mean_contact,
                } => {
                    let random = ContactPlan::random(
                        &node_ids,
                        self.seed,
                        horizon,
                        mean_gap,
                        mean_contact,
                        self.bandwidth,
                    );
                    for w in random.windows() {
                        plan.add_window(w.a, w.b, w.start, w.end, w.bandwidth);
                    }
                }
            }
        }
        let mut sim = sim.with_contact_plan(plan);

        for &(time, id, from, to, size) in &self.messages {
            if let (Some(from), Some(to)) = (node(from), node(to)) {
                sim.create_message_at(time, id, from, to, size);
            }
        }

        for (time, action) in self.actions {
            let action = match action {
                IndexedAction::BreakLink { a, b } => match (node(a), node(b)) {
                    (Some(a), Some(b)) => ScenarioAction::BreakLink { a, b },
                    _ => continue,
                },
                IndexedAction::TakeSnapshot => ScenarioAction::TakeSnapshot,
            };
            sim.schedule_action(time, action);
        }

        Ok((sim, node_ids))
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> Result<SimulationResult, Error> {
        let (mut sim, _) = self.build()?;
        Ok(sim.run_for(duration))
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> Result<SimulationResult, Error> {
        let (mut sim, _) = self.build()?;
        Ok(sim.run_until(time))
    }
}

/// Messages hop down a line of nodes, one contact at a time.
pub fn chain_scenario(num_nodes: usize) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes)
        .chain_contacts(
            Timestamp::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(30),
        )
        .message(Timestamp::ZERO, 0, num_nodes.saturating_sub(1), 1000)
}

/// Every pair meets at random for an hour.
pub fn random_scenario(num_nodes: usize) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes).random_contacts(
        Timestamp::from_secs(3600),
        Duration::from_secs(300),
        Duration::from_secs(30),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_builder_basic() {
        let (sim, nodes) = ScenarioBuilder::new(3).with_seed(123).build().unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(sim.node_ids(), nodes);
    }

    #[test]
    fn test_invalid_config() {
        let result = ScenarioBuilder::new(2)
            .with_config(SprayConfig::new(0, false))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_scenario_run_for() {
        let result = ScenarioBuilder::new(2)
            .run_for(Duration::from_secs(1))
            .unwrap();

        assert!(result.end_time >= Timestamp::from_secs(1));
        assert!(!result.metrics.snapshots.is_empty());
    }

    #[test]
    fn test_out_of_range_indices_skipped() {
        let (sim, _) = ScenarioBuilder::new(2)
            .contact(0, 5, Timestamp::ZERO, Timestamp::from_secs(10))
            .message(Timestamp::ZERO, 0, 7, 10)
            .break_link_at(Timestamp::from_secs(1), 0, 9)
            .build()
            .unwrap();
        assert!(sim.contact_plan().windows().is_empty());
    }

    #[test]
    fn test_chain_contacts_layout() {
        let (sim, nodes) = ScenarioBuilder::new(4)
            .chain_contacts(
                Timestamp::from_secs(10),
                Duration::from_secs(5),
                Duration::from_secs(20),
            )
            .build()
            .unwrap();

        let windows = sim.contact_plan().windows();
        assert_eq!(windows.len(), 3);
        assert_eq!((windows[1].a, windows[1].b), (nodes[1], nodes[2]));
        assert_eq!(windows[1].start, Timestamp::from_secs(35));
        assert_eq!(windows[2].end, Timestamp::from_secs(65));
    }

    #[test]
    fn test_chain_scenario_delivers() {
        let result = chain_scenario(4)
            .run_until(Timestamp::from_secs(300))
            .unwrap();
        assert!(result.all_delivered());
        assert!(result.metrics.copies_conserved());
    }
}
