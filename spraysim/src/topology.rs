//! Contact plans and live link state.
//!
//! Nodes in an opportunistic network are out of range most of the time. A
//! [`ContactPlan`] lists the windows during which two nodes can talk and at
//! what bandwidth; the simulator turns each window into a `LinkUp` and a
//! `LinkDown` event and tracks which links are currently up.

use hashbrown::HashMap;
use sprayroute::{Duration, NodeId, Timestamp};

/// Default link bandwidth: 250 kB/s (Bluetooth-class).
pub const DEFAULT_BANDWIDTH: u64 = 250_000;

/// One scheduled contact between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactWindow {
    pub a: NodeId,
    pub b: NodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Bytes per second while the window is open.
    pub bandwidth: u64,
}

/// Properties of a link that is currently up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Bytes per second.
    pub bandwidth: u64,
    /// When the link came up.
    pub since: Timestamp,
}

impl Link {
    /// Time to push `size` bytes over this link (at least 1 ms). `None` on a
    /// zero-bandwidth link.
    pub fn transfer_time(&self, size: u64) -> Option<Duration> {
        if self.bandwidth == 0 {
            return None;
        }
        let ms = size.saturating_mul(1000).div_ceil(self.bandwidth);
        Some(Duration::from_millis(ms.max(1)))
    }
}

/// Scheduled contacts plus the set of links currently up.
#[derive(Debug, Clone, Default)]
pub struct ContactPlan {
    windows: Vec<ContactWindow>,
    links: HashMap<(NodeId, NodeId), Link>,
}

impl ContactPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a contact window. Windows with `end <= start` or between a
    /// node and itself are ignored.
    pub fn add_window(
        &mut self,
        a: NodeId,
        b: NodeId,
        start: Timestamp,
        end: Timestamp,
        bandwidth: u64,
    ) -> &mut Self {
        if end > start && a != b {
            self.windows.push(ContactWindow {
                a,
                b,
                start,
                end,
                bandwidth,
            });
        }
        self
    }

    /// Schedule `count` contacts of length `up` every `period`, starting at
    /// `first`.
    pub fn add_periodic(
        &mut self,
        a: NodeId,
        b: NodeId,
        first: Timestamp,
        up: Duration,
        period: Duration,
        count: usize,
        bandwidth: u64,
    ) -> &mut Self {
        let mut start = first;
        for _ in 0..count {
            self.add_window(a, b, start, start + up, bandwidth);
            start = start + period;
        }
        self
    }

    /// Random contacts between every pair of nodes until `horizon`.
    ///
    /// Gaps and contact lengths are drawn uniformly from `[mean/2, 3*mean/2)`
    /// with a deterministic LCG seeded by `seed`.
    pub fn random(
        nodes: &[NodeId],
        seed: u64,
        horizon: Timestamp,
        mean_gap: Duration,
        mean_contact: Duration,
        bandwidth: u64,
    ) -> Self {
        let mut plan = Self::new();
        let mut state = seed;
        let mut draw = |mean: Duration| -> Duration {
            // LCG parameters (same as glibc)
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let unit = ((state >> 16) & 0x7FFF) as u64;
            let mean = mean.as_millis().max(2);
            Duration::from_millis(mean / 2 + unit * mean / 32768)
        };

        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                let mut t = Timestamp::ZERO + draw(mean_gap);
                while t < horizon {
                    let end = t + draw(mean_contact);
                    plan.add_window(a, b, t, end, bandwidth);
                    t = end + draw(mean_gap);
                }
            }
        }
        plan
    }

    /// All scheduled windows.
    pub fn windows(&self) -> &[ContactWindow] {
        &self.windows
    }

    /// Mark a link as up.
    pub fn set_up(&mut self, a: NodeId, b: NodeId, bandwidth: u64, now: Timestamp) {
        self.links.insert(
            Self::canonical_pair(a, b),
            Link {
                bandwidth,
                since: now,
            },
        );
    }

    /// Mark a link as down. Returns false if it was not up.
    pub fn set_down(&mut self, a: NodeId, b: NodeId) -> bool {
        self.links.remove(&Self::canonical_pair(a, b)).is_some()
    }

    /// Get a live link.
    pub fn link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    /// Check if two nodes can currently talk.
    pub fn is_up(&self, a: NodeId, b: NodeId) -> bool {
        self.link(a, b).is_some()
    }

    /// Nodes currently in range of `node`.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for &(a, b) in self.links.keys() {
            if a == node {
                result.push(b);
            } else if b == node {
                result.push(a);
            }
        }
        result.sort_unstable();
        result
    }

    /// Canonical pair ordering for consistent link storage.
    fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
