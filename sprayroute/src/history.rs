//! Per-peer contact history.
//!
//! For every peer this node has met, the tracker keeps two chronological
//! logs: completed contacts (link up to link down) and completed gaps (link
//! down to the next link up). Each log has at most one pending opening
//! timestamp waiting for its closing event.

use hashbrown::HashMap;

use crate::collections::IntervalLog;
use crate::config::FirstEncounter;
use crate::time::{Duration, Interval, Timestamp};
use crate::types::NodeId;

/// History of one peer as seen from this node.
#[derive(Clone, Debug)]
pub struct PeerHistory {
    contacts: IntervalLog,
    intercontacts: IntervalLog,
    /// Pending: link up moment of the current contact.
    connected_since: Option<Timestamp>,
    /// Pending: link down moment opening the current gap.
    disconnected_since: Option<Timestamp>,
    /// Last up/down event, for eviction.
    last_activity: Timestamp,
}

impl PeerHistory {
    fn new(window: usize) -> Self {
        Self {
            contacts: IntervalLog::with_window(window),
            intercontacts: IntervalLog::with_window(window),
            connected_since: None,
            disconnected_since: None,
            last_activity: Timestamp::ZERO,
        }
    }

    /// Completed contacts, oldest first.
    pub fn contacts(&self) -> &IntervalLog {
        &self.contacts
    }

    /// Completed gaps between contacts, oldest first.
    pub fn intercontacts(&self) -> &IntervalLog {
        &self.intercontacts
    }

    /// Link up time of the contact in progress, if any.
    pub fn connected_since(&self) -> Option<Timestamp> {
        self.connected_since
    }

    /// Link down time opening the gap in progress, if any.
    pub fn disconnected_since(&self) -> Option<Timestamp> {
        self.disconnected_since
    }

    /// True while a contact is open.
    pub fn is_connected(&self) -> bool {
        self.connected_since.is_some()
    }
}

/// Outcome of a connection state change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryUpdate {
    /// Interval closed by this event, if it had positive length.
    pub recorded: Option<Interval>,
    /// Peer dropped to stay within the peer bound.
    pub evicted: Option<NodeId>,
}

/// Contact history tracker for one node.
#[derive(Clone, Debug)]
pub struct ContactHistory {
    peers: HashMap<NodeId, PeerHistory>,
    /// Peer whose contact closed most recently.
    last_closed: Option<NodeId>,
    /// Time of the latest up or down event.
    last_change: Timestamp,
    max_peers: usize,
    window: usize,
    first_encounter: FirstEncounter,
}

impl ContactHistory {
    /// Create an empty tracker.
    ///
    /// `max_peers` bounds the number of tracked peers, `window` the intervals
    /// kept per peer and per log.
    pub fn new(max_peers: usize, window: usize, first_encounter: FirstEncounter) -> Self {
        Self {
            peers: HashMap::new(),
            last_closed: None,
            last_change: Timestamp::ZERO,
            max_peers: max_peers.max(1),
            window,
            first_encounter,
        }
    }

    /// A link to `peer` came up at `now`.
    ///
    /// Closes the pending gap (if any, and if positive) into the intercontact
    /// log and opens a contact.
    pub fn on_connection_up(&mut self, peer: NodeId, now: Timestamp) -> HistoryUpdate {
        let first_encounter = self.first_encounter;
        let (history, evicted) = self.entry(peer);

        let opened = history
            .disconnected_since
            .take()
            .or_else(|| assumed_start(first_encounter));
        let recorded = match opened.and_then(|start| Interval::new(start, now)) {
            Some(iv) if history.intercontacts.push(iv) => Some(iv),
            _ => None,
        };

        history.connected_since = Some(now);
        history.last_activity = now;
        self.last_change = self.last_change.max(now);

        HistoryUpdate { recorded, evicted }
    }

    /// A link to `peer` went down at `now`.
    ///
    /// Closes the pending contact (if any, and if positive) into the contact
    /// log and opens a gap.
    pub fn on_connection_down(&mut self, peer: NodeId, now: Timestamp) -> HistoryUpdate {
        let first_encounter = self.first_encounter;
        let (history, evicted) = self.entry(peer);

        let opened = history
            .connected_since
            .take()
            .or_else(|| assumed_start(first_encounter));
        let recorded = match opened.and_then(|start| Interval::new(start, now)) {
            Some(iv) if history.contacts.push(iv) => Some(iv),
            _ => None,
        };

        history.disconnected_since = Some(now);
        history.last_activity = now;
        self.last_closed = Some(peer);
        self.last_change = self.last_change.max(now);

        HistoryUpdate { recorded, evicted }
    }

    /// Get or create the history for `peer`, evicting the least recently
    /// active peer if the bound is reached.
    fn entry(&mut self, peer: NodeId) -> (&mut PeerHistory, Option<NodeId>) {
        let mut evicted = None;
        if !self.peers.contains_key(&peer) && self.peers.len() >= self.max_peers {
            let oldest = self
                .peers
                .iter()
                .min_by_key(|(_, h)| (h.is_connected(), h.last_activity))
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                self.peers.remove(&oldest);
                if self.last_closed == Some(oldest) {
                    self.last_closed = None;
                }
                evicted = Some(oldest);
            }
        }
        let window = self.window;
        let history = self
            .peers
            .entry(peer)
            .or_insert_with(|| PeerHistory::new(window));
        (history, evicted)
    }

    /// History for one peer.
    pub fn peer(&self, peer: &NodeId) -> Option<&PeerHistory> {
        self.peers.get(peer)
    }

    /// Peer whose contact closed most recently, if still tracked.
    pub fn last_closed(&self) -> Option<NodeId> {
        self.last_closed
    }

    /// Time of the latest connection state change, for any peer.
    ///
    /// [`Timestamp::ZERO`] before the first event.
    pub fn last_change(&self) -> Timestamp {
        self.last_change
    }

    /// Number of tracked peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Iterate tracked peers.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &PeerHistory)> {
        self.peers.iter()
    }

    /// Total time spent in contact, over all peers.
    pub fn total_contact_time(&self) -> Duration {
        self.peers
            .values()
            .fold(Duration::ZERO, |acc, h| acc.saturating_add(h.contacts.total()))
    }

    /// Per-peer mean gap, summed over all peers with at least one gap.
    ///
    /// Returned in seconds.
    pub fn mean_intercontact_time(&self) -> f64 {
        self.peers
            .values()
            .filter(|h| !h.intercontacts.is_empty())
            .map(|h| h.intercontacts.total().as_secs_f64() / h.intercontacts.len() as f64)
            .sum()
    }
}

fn assumed_start(policy: FirstEncounter) -> Option<Timestamp> {
    match policy {
        FirstEncounter::Epoch => Some(Timestamp::ZERO),
        FirstEncounter::Ignore => None,
    }
}
