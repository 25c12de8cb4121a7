//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use sprayroute::{Duration, MessageId, Timestamp};

/// Network-wide copy totals at a point in time.
#[derive(Debug, Clone)]
pub struct CopySnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Sum of copy counts over all carriers, per message.
    pub copies: HashMap<MessageId, u32>,
    /// Number of nodes carrying each message.
    pub carriers: HashMap<MessageId, usize>,
}

impl CopySnapshot {
    /// Create a new empty snapshot.
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            copies: HashMap::new(),
            carriers: HashMap::new(),
        }
    }

    /// Record one carrier holding `copies` of `id`.
    pub fn record_carrier(&mut self, id: MessageId, copies: u32) {
        *self.copies.entry(id).or_insert(0) += copies;
        *self.carriers.entry(id).or_insert(0) += 1;
    }

    /// Total copies of `id` in the network.
    pub fn total(&self, id: MessageId) -> u32 {
        self.copies.get(&id).copied().unwrap_or(0)
    }

    /// Number of nodes carrying `id`.
    pub fn carrier_count(&self, id: MessageId) -> usize {
        self.carriers.get(&id).copied().unwrap_or(0)
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Messages originated.
    pub messages_created: u64,
    /// Originations refused by the router (duplicate id, buffer).
    pub creation_failed: u64,
    /// Transfers handed to a link.
    pub transfers_started: u64,
    /// Completed transfers to an intermediate node.
    pub relays: u64,
    /// Completed transfers to the destination.
    pub deliveries: u64,
    /// Transfers cut by a link going down.
    pub transfers_aborted: u64,
    /// Transfers that arrived but the receiver refused.
    pub transfers_rejected: u64,
    /// Transfers whose message was gone from the sender on completion.
    pub transfers_skipped: u64,
    /// Messages dropped on TTL (summed over nodes).
    pub messages_expired: u64,
    /// Copy count each message was originated with.
    pub initial_copies: HashMap<MessageId, u32>,
    /// Origination time per message.
    pub created_at: HashMap<MessageId, Timestamp>,
    /// First delivery time per message.
    pub delivered_at: HashMap<MessageId, Timestamp>,
    /// Highest network-wide copy total seen per message.
    pub peak_copies: HashMap<MessageId, u32>,
    /// Copy snapshots taken at intervals.
    pub snapshots: Vec<CopySnapshot>,
}

impl SimMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an origination.
    pub fn record_created(&mut self, id: MessageId, at: Timestamp, copies: u32) {
        self.messages_created += 1;
        self.created_at.insert(id, at);
        self.initial_copies.insert(id, copies);
        self.observe_copies(id, copies);
    }

    /// Record a delivery. Returns false for a repeat delivery of the same id.
    pub fn record_delivery(&mut self, id: MessageId, at: Timestamp) -> bool {
        self.deliveries += 1;
        if self.delivered_at.contains_key(&id) {
            return false;
        }
        self.delivered_at.insert(id, at);
        true
    }

    /// Track the network-wide copy total of `id`.
    pub fn observe_copies(&mut self, id: MessageId, total: u32) {
        let peak = self.peak_copies.entry(id).or_insert(0);
        *peak = (*peak).max(total);
    }

    /// Add a snapshot.
    pub fn add_snapshot(&mut self, snapshot: CopySnapshot) {
        for (&id, &total) in &snapshot.copies {
            self.observe_copies(id, total);
        }
        self.snapshots.push(snapshot);
    }

    /// Get the latest snapshot.
    pub fn latest_snapshot(&self) -> Option<&CopySnapshot> {
        self.snapshots.last()
    }

    /// Whether `id` reached its destination.
    pub fn is_delivered(&self, id: MessageId) -> bool {
        self.delivered_at.contains_key(&id)
    }

    /// Creation-to-first-delivery latency of `id`.
    pub fn latency(&self, id: MessageId) -> Option<Duration> {
        let created = self.created_at.get(&id)?;
        let delivered = self.delivered_at.get(&id)?;
        Some(delivered.saturating_sub(*created))
    }

    /// Fraction of originated messages that were delivered.
    pub fn delivery_ratio(&self) -> f64 {
        if self.created_at.is_empty() {
            return 0.0;
        }
        self.delivered_at.len() as f64 / self.created_at.len() as f64
    }

    /// Mean latency over delivered messages.
    pub fn mean_latency(&self) -> Option<Duration> {
        let latencies: Vec<u64> = self
            .delivered_at
            .keys()
            .filter_map(|id| self.latency(*id))
            .map(Duration::as_millis)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        let sum: u64 = latencies.iter().sum();
        Some(Duration::from_millis(sum / latencies.len() as u64))
    }

    /// Relay transfers per delivered message.
    pub fn overhead_ratio(&self) -> Option<f64> {
        let delivered = self.delivered_at.len();
        if delivered == 0 {
            return None;
        }
        Some(self.relays as f64 / delivered as f64)
    }

    /// Check that no message ever had more copies in the network than it was
    /// originated with.
    pub fn copies_conserved(&self) -> bool {
        self.peak_copies.iter().all(|(id, peak)| {
            self.initial_copies
                .get(id)
                .is_some_and(|initial| peak <= initial)
        })
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Fraction of messages delivered.
    pub fn delivery_ratio(&self) -> f64 {
        self.metrics.delivery_ratio()
    }

    /// Check if every originated message was delivered.
    pub fn all_delivered(&self) -> bool {
        !self.metrics.created_at.is_empty()
            && self.metrics.delivered_at.len() == self.metrics.created_at.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_snapshot_totals() {
        let mut snapshot = CopySnapshot::new(Timestamp::ZERO);
        snapshot.record_carrier(1, 3);
        snapshot.record_carrier(1, 2);
        snapshot.record_carrier(2, 1);

        assert_eq!(snapshot.total(1), 5);
        assert_eq!(snapshot.carrier_count(1), 2);
        assert_eq!(snapshot.total(3), 0);
    }

    #[test]
    fn test_latency_and_ratio() {
        let mut metrics = SimMetrics::new();
        metrics.record_created(1, Timestamp::from_secs(10), 4);
        metrics.record_created(2, Timestamp::from_secs(20), 4);

        assert!(metrics.record_delivery(1, Timestamp::from_secs(70)));
        assert!(!metrics.record_delivery(1, Timestamp::from_secs(90)));

        assert_eq!(metrics.latency(1), Some(Duration::from_secs(60)));
        assert_eq!(metrics.latency(2), None);
        assert_eq!(metrics.delivery_ratio(), 0.5);
        assert_eq!(metrics.mean_latency(), Some(Duration::from_secs(60)));
        assert_eq!(metrics.deliveries, 2);
    }

    #[test]
    fn test_copies_conserved() {
        let mut metrics = SimMetrics::new();
        metrics.record_created(1, Timestamp::ZERO, 4);

        let mut snapshot = CopySnapshot::new(Timestamp::from_secs(1));
        snapshot.record_carrier(1, 2);
        snapshot.record_carrier(1, 2);
        metrics.add_snapshot(snapshot);
        assert!(metrics.copies_conserved());

        metrics.observe_copies(1, 5);
        assert!(!metrics.copies_conserved());
    }

    #[test]
    fn test_overhead_ratio() {
        let mut metrics = SimMetrics::new();
        assert_eq!(metrics.overhead_ratio(), None);

        metrics.record_created(1, Timestamp::ZERO, 8);
        metrics.relays = 6;
        metrics.record_delivery(1, Timestamp::from_secs(5));
        assert_eq!(metrics.overhead_ratio(), Some(6.0));
    }
}
