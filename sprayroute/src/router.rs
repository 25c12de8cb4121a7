//! Spray and Wait router - per-node replication control.
//!
//! The router owns everything one node knows: contact history, carried
//! messages and their copy records, open links, and the transfer in flight.
//! It never moves bytes itself. The host drives it through a small set of
//! callbacks, always from one thread and never re-entrantly:
//!
//! - [`connection_up`](SprayRouter::connection_up) /
//!   [`connection_down`](SprayRouter::connection_down)
//! - [`on_tick`](SprayRouter::on_tick), which returns offers to try
//! - [`begin_transfer`](SprayRouter::begin_transfer) once the host picked an
//!   offer the peer [`accepts`](SprayRouter::accepts)
//! - [`message_transferred`](SprayRouter::message_transferred) on the
//!   receiving router, then [`transfer_done`](SprayRouter::transfer_done)
//!   on the sending one
//! - [`transfer_aborted`](SprayRouter::transfer_aborted) if the link failed
//!
//! # Example
//!
//! ```
//! use sprayroute::{SprayRouter, SprayConfig, Receipt, SendOutcome};
//! use sprayroute::traits::test_impls::{MockClock, MockRandom};
//!
//! let a_id = [1u8; 16];
//! let b_id = [2u8; 16];
//! let dest = [9u8; 16];
//!
//! let mut a: SprayRouter<_, _> =
//!     SprayRouter::new(a_id, SprayConfig::new(6, true), MockClock::new(), MockRandom::new()).unwrap();
//! let mut b: SprayRouter<_, _> =
//!     SprayRouter::new(b_id, SprayConfig::new(6, true), MockClock::new(), MockRandom::new()).unwrap();
//!
//! a.create_message(1, dest, 100).unwrap();
//! a.connection_up(b_id);
//! b.connection_up(a_id);
//!
//! let offer = a.on_tick().plan.offers()[0];
//! let message = a.begin_transfer(offer).unwrap();
//! let copies = a.outgoing_copies(message.id).unwrap();
//! let utility = a.combined_utility();
//!
//! assert!(b.accepts(&message));
//! assert_eq!(b.message_transferred(message, a_id, copies, utility), Ok(Receipt::Stored));
//! assert_eq!(b.copies(1), Some(3));
//! assert_eq!(a.transfer_done(1), Ok(Some(SendOutcome::Relayed { before: 6, after: 3 })));
//! ```

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::marker::PhantomData;
use hashbrown::HashSet;

use crate::config::{DefaultConfig, HistoryInheritance, RouterConfig, SprayConfig};
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugChannel;
use crate::estimator::ContactMetrics;
use crate::history::{ContactHistory, HistoryUpdate};
use crate::policy::{CopyLedger, CopyPolicy, SprayPhase};
use crate::scheduler::{self, Offer, TickPlan};
use crate::store::MessageStore;
use crate::time::Timestamp;
use crate::traits::{Clock, Random};
use crate::types::{Error, Message, MessageId, NodeId, Receipt};
use crate::utility::UtilitySnapshot;

/// Transfer currently handed to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub message: MessageId,
    pub to: NodeId,
    pub started_at: Timestamp,
}

/// Sender-side result of a completed transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Relayed to an intermediate node; copy count reduced.
    Relayed { before: u32, after: u32 },
    /// Handed to the destination; local copy dropped.
    Delivered,
}

/// Result of one scheduling tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Messages dropped on TTL before planning.
    pub expired: Vec<MessageId>,
    /// Offers for the host to try.
    pub plan: TickPlan,
}

/// Spray and Wait router for one node.
///
/// Generic over:
/// - `Clk`: injected time source
/// - `R`: random source (candidate shuffling)
/// - `Cfg`: compile-time memory bounds
pub struct SprayRouter<Clk, R, Cfg = DefaultConfig> {
    id: NodeId,
    config: Rc<SprayConfig>,
    policy: CopyPolicy,
    clock: Clk,
    random: R,

    history: ContactHistory,
    ledger: CopyLedger,
    store: MessageStore,
    connections: Vec<NodeId>,
    transfer: Option<Transfer>,
    /// Messages this node was the final recipient of.
    delivered: HashSet<MessageId>,

    #[cfg(any(test, feature = "debug"))]
    debug: DebugChannel,

    _config: PhantomData<Cfg>,
}

impl<Clk, R, Cfg> SprayRouter<Clk, R, Cfg>
where
    Clk: Clock,
    R: Random,
    Cfg: RouterConfig,
{
    /// Create a router with its own copy of the settings.
    pub fn new(id: NodeId, config: SprayConfig, clock: Clk, random: R) -> Result<Self, Error> {
        Self::with_shared(id, Rc::new(config), clock, random)
    }

    /// Create a router on settings shared with other routers.
    pub fn with_shared(
        id: NodeId,
        config: Rc<SprayConfig>,
        clock: Clk,
        random: R,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::build(id, config, clock, random))
    }

    /// Construct without validation.
    fn build(id: NodeId, config: Rc<SprayConfig>, clock: Clk, random: R) -> Self {
        Self {
            id,
            policy: CopyPolicy::from_config(&config),
            history: ContactHistory::new(
                Cfg::MAX_PEERS,
                Cfg::MAX_INTERVALS_PER_PEER,
                config.first_encounter,
            ),
            ledger: CopyLedger::new(),
            store: MessageStore::new(config.buffer_capacity, Cfg::MAX_MESSAGES),
            connections: Vec::new(),
            transfer: None,
            delivered: HashSet::new(),
            #[cfg(any(test, feature = "debug"))]
            debug: DebugChannel::new(),
            config,
            clock,
            random,
            _config: PhantomData,
        }
    }

    /// Build a router for another node from this one.
    ///
    /// Settings are shared. Contact history is copied only under
    /// [`HistoryInheritance::ClonePrototype`]; messages, copy records and
    /// links are never inherited.
    pub fn replicate(&self, id: NodeId, clock: Clk, random: R) -> Self {
        let mut router = Self::build(id, Rc::clone(&self.config), clock, random);
        if self.config.history_inheritance == HistoryInheritance::ClonePrototype {
            router.history = self.history.clone();
        }
        router
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &SprayConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn history(&self) -> &ContactHistory {
        &self.history
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Peers with an open link, in link-up order.
    pub fn connections(&self) -> &[NodeId] {
        &self.connections
    }

    pub fn in_flight(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// Copies left for a held message.
    pub fn copies(&self, id: MessageId) -> Option<u32> {
        self.ledger.copies(id)
    }

    /// Replication phase of a held message.
    pub fn phase(&self, id: MessageId) -> Option<SprayPhase> {
        self.ledger.phase(id)
    }

    /// Whether this node has consumed `id` as its final recipient.
    pub fn has_delivered(&self, id: MessageId) -> bool {
        self.delivered.contains(&id)
    }

    /// Debug event channel.
    #[cfg(any(test, feature = "debug"))]
    pub fn debug_channel(&self) -> &DebugChannel {
        &self.debug
    }

    // ==================== Connections ====================

    /// A link to `peer` came up.
    pub fn connection_up(&mut self, peer: NodeId) {
        let now = self.clock.now();
        let update = self.history.on_connection_up(peer, now);
        self.trace_history(peer, update, false);

        if !self.connections.contains(&peer) {
            self.connections.push(peer);
        }
    }

    /// A link to `peer` went down.
    ///
    /// Aborts the in-flight transfer if it was going to `peer` and returns it.
    pub fn connection_down(&mut self, peer: NodeId) -> Option<Transfer> {
        let now = self.clock.now();
        let update = self.history.on_connection_down(peer, now);
        self.trace_history(peer, update, true);

        self.connections.retain(|p| *p != peer);

        let transfer = self.transfer.filter(|t| t.to == peer)?;
        self.transfer = None;
        emit_debug!(
            self,
            crate::debug::DebugEvent::TransferAborted {
                id: transfer.message,
                to: peer,
            }
        );
        Some(transfer)
    }

    #[cfg_attr(not(any(test, feature = "debug")), allow(unused_variables))]
    fn trace_history(&self, peer: NodeId, update: HistoryUpdate, contact: bool) {
        if let Some(interval) = update.recorded {
            emit_debug!(self, {
                if contact {
                    crate::debug::DebugEvent::ContactRecorded { peer, interval }
                } else {
                    crate::debug::DebugEvent::IntercontactRecorded { peer, interval }
                }
            });
        }
        if let Some(evicted) = update.evicted {
            emit_debug!(self, crate::debug::DebugEvent::PeerEvicted { peer: evicted });
        }
    }

    // ==================== Messages ====================

    /// Originate a message to `destination`.
    ///
    /// Evicts the oldest carried messages (never the one in transfer) until
    /// it fits. Returns the copies issued.
    #[cfg_attr(not(any(test, feature = "debug")), allow(unused_variables))]
    pub fn create_message(
        &mut self,
        id: MessageId,
        destination: NodeId,
        size: u64,
    ) -> Result<u32, Error> {
        if self.store.contains(id) || self.delivered.contains(&id) {
            return Err(Error::DuplicateMessage(id));
        }

        let now = self.clock.now();
        let mut message = Message::new(id, self.id, destination, size);
        message.created_at = now;
        message.ttl = self.config.message_ttl;

        let evicted = self.make_room(size)?;
        self.store.insert(message, now)?;
        let copies = self
            .ledger
            .originate(id, self.config.message_ttl, &self.policy);

        emit_debug!(
            self,
            crate::debug::DebugEvent::MessageCreated {
                timestamp: now,
                id,
                copies,
                evicted,
            }
        );
        Ok(copies)
    }

    /// Evict oldest messages until `size` bytes fit. Returns how many went.
    fn make_room(&mut self, size: u64) -> Result<usize, Error> {
        let pinned = self.transfer.map(|t| t.message);
        let evicted = self.store.make_room(size, pinned)?;
        for id in &evicted {
            self.ledger.remove(*id);
            emit_debug!(self, crate::debug::DebugEvent::MessageEvicted { id: *id });
        }
        Ok(evicted.len())
    }

    /// Whether this node would take `message` if offered.
    ///
    /// Refuses messages already held or already delivered here, expired
    /// messages, and relays that could never fit the buffer.
    pub fn accepts(&self, message: &Message) -> bool {
        if self.store.contains(message.id) || self.delivered.contains(&message.id) {
            return false;
        }
        if message.is_expired(self.clock.now()) {
            return false;
        }
        message.destination == self.id || self.store.fits(message.size)
    }

    /// A message arrived from `from`.
    ///
    /// `sender_copies` and `sender_utility` are the sender's copy count and
    /// combined utility taken just before its post-send decrement. If this
    /// node is the destination the message is consumed; otherwise it is
    /// stored with its share of the sender's copies.
    #[cfg_attr(not(any(test, feature = "debug")), allow(unused_variables))]
    pub fn message_transferred(
        &mut self,
        message: Message,
        from: NodeId,
        sender_copies: u32,
        sender_utility: Option<f64>,
    ) -> Result<Receipt, Error> {
        let id = message.id;
        if self.store.contains(id) || self.delivered.contains(&id) {
            return Err(Error::DuplicateMessage(id));
        }

        let now = self.clock.now();
        if message.destination == self.id {
            self.delivered.insert(id);
            emit_debug!(
                self,
                crate::debug::DebugEvent::MessageDelivered {
                    timestamp: now,
                    id,
                    from,
                }
            );
            return Ok(Receipt::Delivered);
        }

        let own_utility = if self.config.utility_weighted {
            self.combined_utility()
        } else {
            None
        };
        let (copies, rule) = self
            .policy
            .receiver_copies(sender_copies, (sender_utility, own_utility));

        self.make_room(message.size)?;
        let ttl = message.ttl;
        self.store.insert(message, now)?;
        self.ledger.receive(id, ttl, copies);

        emit_debug!(
            self,
            crate::debug::DebugEvent::MessageReceived {
                timestamp: now,
                id,
                from,
                sender_copies,
                copies,
                rule,
            }
        );
        Ok(Receipt::Stored)
    }

    // ==================== Transfers ====================

    /// The host is starting `offer`. Returns the message to carry.
    pub fn begin_transfer(&mut self, offer: Offer) -> Result<Message, Error> {
        if self.transfer.is_some() {
            return Err(Error::TransferInProgress);
        }
        let message = self
            .store
            .get(offer.message)
            .cloned()
            .ok_or(Error::UnknownTransfer(offer.message))?;

        self.transfer = Some(Transfer {
            message: offer.message,
            to: offer.to,
            started_at: self.clock.now(),
        });
        emit_debug!(
            self,
            crate::debug::DebugEvent::TransferStarted {
                id: offer.message,
                to: offer.to,
            }
        );
        Ok(message)
    }

    /// Copy count to hand a receiver along with `id`.
    pub fn outgoing_copies(&self, id: MessageId) -> Result<u32, Error> {
        let copies = self.ledger.require(id);
        debug_assert!(
            copies.is_ok() || !self.store.contains(id),
            "stored message without copy count"
        );
        copies
    }

    /// The in-flight transfer of `id` completed.
    ///
    /// Returns `Ok(None)` if the message was evicted or expired while in
    /// flight; nothing is changed in that case.
    pub fn transfer_done(&mut self, id: MessageId) -> Result<Option<SendOutcome>, Error> {
        let transfer = match self.transfer {
            Some(t) if t.message == id => t,
            _ => return Err(Error::UnknownTransfer(id)),
        };
        self.transfer = None;

        let Some(destination) = self.store.get(id).map(|m| m.destination) else {
            emit_debug!(self, crate::debug::DebugEvent::SendSkippedEvicted { id });
            return Ok(None);
        };

        if destination == transfer.to {
            self.store.remove(id);
            self.ledger.remove(id);
            emit_debug!(
                self,
                crate::debug::DebugEvent::DeliveryCompleted {
                    id,
                    to: transfer.to,
                }
            );
            return Ok(Some(SendOutcome::Delivered));
        }

        debug_assert!(
            self.ledger.copies(id).is_some(),
            "stored message without copy count"
        );
        let (before, after) = self.ledger.complete_send(id, &self.policy)?;
        emit_debug!(
            self,
            crate::debug::DebugEvent::SendCompleted {
                id,
                to: transfer.to,
                before,
                after,
            }
        );
        Ok(Some(SendOutcome::Relayed { before, after }))
    }

    /// The in-flight transfer of `id` was aborted. Copy counts are untouched.
    pub fn transfer_aborted(&mut self, id: MessageId) -> Result<(), Error> {
        match self.transfer {
            Some(t) if t.message == id => {
                self.transfer = None;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::TransferAborted { id, to: t.to }
                );
                Ok(())
            }
            _ => Err(Error::UnknownTransfer(id)),
        }
    }

    // ==================== Scheduling ====================

    /// Periodic tick: drop expired messages, then plan transfers.
    pub fn on_tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let expired = self.drop_expired(now);

        let queue = self.store.fifo();
        let ledger = &self.ledger;
        let policy = &self.policy;
        let plan = scheduler::plan(
            self.transfer.is_some(),
            &self.connections,
            &queue,
            |id| ledger.copies(id).is_some_and(|c| policy.is_candidate(c)),
            self.config.queue_mode,
            &mut self.random,
        );

        TickReport { expired, plan }
    }

    /// Drop messages past their TTL, with their copy records.
    pub fn drop_expired(&mut self, now: Timestamp) -> Vec<MessageId> {
        let expired = self.store.expired(now);
        for id in &expired {
            self.store.remove(*id);
            self.ledger.remove(*id);
            emit_debug!(
                self,
                crate::debug::DebugEvent::MessageExpired {
                    timestamp: now,
                    id: *id,
                }
            );
        }
        expired
    }

    // ==================== Utility ====================

    /// Node-level contact metrics (peer whose contact closed last).
    ///
    /// Only connection events move these; see [`ContactMetrics::for_node`].
    pub fn contact_metrics(&self) -> ContactMetrics {
        ContactMetrics::for_node(&self.history)
    }

    /// Contact metrics towards one peer, as of the latest connection event.
    pub fn contact_metrics_for(&self, peer: &NodeId) -> Option<ContactMetrics> {
        let at = self.history.last_change();
        self.history
            .peer(peer)
            .map(|h| ContactMetrics::for_peer(h, at))
    }

    /// Recompute the full utility snapshot.
    pub fn utility_snapshot(&self) -> UtilitySnapshot {
        let snapshot = UtilitySnapshot::compute(
            ContactMetrics::for_node(&self.history),
            &self.store,
            self.config.smoothing_factor,
            self.config.utility_guard,
        );

        emit_debug!(
            self,
            crate::debug::DebugEvent::UtilityComputed {
                timestamp: self.clock.now(),
                snapshot,
            }
        );
        if snapshot.guarded {
            emit_debug!(
                self,
                crate::debug::DebugEvent::UtilityGuardApplied {
                    timestamp: self.clock.now(),
                    space_utility: snapshot.space_utility,
                    time_utility: snapshot.time_utility,
                }
            );
        }
        snapshot
    }

    /// Guarded combined utility of this node.
    pub fn combined_utility(&self) -> Option<f64> {
        self.utility_snapshot().combined
    }
}

/// Builds routers for many nodes from one validated, shared configuration.
///
/// Every router starts with empty maps.
pub struct RouterFactory<Cfg = DefaultConfig> {
    config: Rc<SprayConfig>,
    _config: PhantomData<Cfg>,
}

impl<Cfg: RouterConfig> RouterFactory<Cfg> {
    /// Validate the settings once.
    pub fn new(config: SprayConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config: Rc::new(config),
            _config: PhantomData,
        })
    }

    pub fn config(&self) -> &SprayConfig {
        &self.config
    }

    /// Build a fresh router for node `id`.
    pub fn build<Clk: Clock, R: Random>(
        &self,
        id: NodeId,
        clock: Clk,
        random: R,
    ) -> SprayRouter<Clk, R, Cfg> {
        SprayRouter::build(id, Rc::clone(&self.config), clock, random)
    }
}
