//! Local message store.
//!
//! Holds the messages this node carries, accounts their bytes against the
//! configured buffer capacity and a slot bound, and remembers arrival order
//! for FIFO scheduling. Copy counts are not kept here; see
//! [`CopyLedger`](crate::policy::CopyLedger).

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::time::Timestamp;
use crate::traits::Buffer;
use crate::types::{Error, Message, MessageId};

/// A message held in the store.
#[derive(Clone, Debug)]
struct StoredMessage {
    message: Message,
    /// When this node took the message (originated or received).
    received_at: Timestamp,
    /// Insertion sequence, breaks ties between equal arrival times.
    seq: u64,
}

impl StoredMessage {
    fn order_key(&self) -> (Timestamp, u64) {
        (self.received_at, self.seq)
    }
}

/// Byte- and slot-bounded message store.
#[derive(Clone, Debug)]
pub struct MessageStore {
    messages: HashMap<MessageId, StoredMessage>,
    capacity: u64,
    used: u64,
    max_messages: usize,
    next_seq: u64,
}

impl MessageStore {
    /// Create an empty store of `capacity` bytes and at most `max_messages`
    /// entries.
    pub fn new(capacity: u64, max_messages: usize) -> Self {
        Self {
            messages: HashMap::new(),
            capacity,
            used: 0,
            max_messages,
            next_seq: 0,
        }
    }

    /// Check whether a message is held.
    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.contains_key(&id)
    }

    /// Look up a held message.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id).map(|s| &s.message)
    }

    /// Number of held messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a message of `size` bytes could ever be stored.
    pub fn fits(&self, size: u64) -> bool {
        size <= self.capacity && self.max_messages > 0
    }

    /// Insert a message. Fails if it is already held or does not fit right
    /// now; use [`make_room`](Self::make_room) first to evict.
    pub fn insert(&mut self, message: Message, now: Timestamp) -> Result<(), Error> {
        if self.contains(message.id) {
            return Err(Error::DuplicateMessage(message.id));
        }
        if !self.fits(message.size) {
            return Err(Error::MessageTooLarge);
        }
        if message.size > self.free_space() || self.messages.len() >= self.max_messages {
            return Err(Error::BufferFull {
                needed: message.size,
                free: self.free_space(),
            });
        }

        self.used += message.size;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.messages.insert(
            message.id,
            StoredMessage {
                message,
                received_at: now,
                seq,
            },
        );
        Ok(())
    }

    /// Remove a message, returning it.
    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let stored = self.messages.remove(&id)?;
        self.used = self.used.saturating_sub(stored.message.size);
        Some(stored.message)
    }

    /// Evict the oldest messages until `size` more bytes and one more slot
    /// are available. `pinned` (the message in transfer) is never evicted.
    ///
    /// Either evicts enough or nothing: if even evicting every unpinned
    /// message would not make room, returns `BufferFull` without touching
    /// the store.
    pub fn make_room(
        &mut self,
        size: u64,
        pinned: Option<MessageId>,
    ) -> Result<Vec<MessageId>, Error> {
        if !self.fits(size) {
            return Err(Error::MessageTooLarge);
        }

        let mut evictable: Vec<&StoredMessage> = self
            .messages
            .values()
            .filter(|s| Some(s.message.id) != pinned)
            .collect();
        evictable.sort_by_key(|s| s.order_key());

        let mut free = self.free_space();
        let mut slots = self.max_messages.saturating_sub(self.messages.len());
        let mut victims = Vec::new();
        for stored in evictable {
            if free >= size && slots > 0 {
                break;
            }
            free += stored.message.size;
            slots += 1;
            victims.push(stored.message.id);
        }
        if free < size || slots == 0 {
            return Err(Error::BufferFull {
                needed: size,
                free: self.free_space(),
            });
        }

        for id in &victims {
            self.remove(*id);
        }
        Ok(victims)
    }

    /// IDs of messages past their TTL.
    pub fn expired(&self, now: Timestamp) -> Vec<MessageId> {
        let mut ids: Vec<&StoredMessage> = self
            .messages
            .values()
            .filter(|s| s.message.is_expired(now))
            .collect();
        ids.sort_by_key(|s| s.order_key());
        ids.into_iter().map(|s| s.message.id).collect()
    }

    /// Held messages, oldest arrival first.
    pub fn fifo(&self) -> Vec<&Message> {
        let mut all: Vec<&StoredMessage> = self.messages.values().collect();
        all.sort_by_key(|s| s.order_key());
        all.into_iter().map(|s| &s.message).collect()
    }
}

impl Buffer for MessageStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn free_space(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    const A: [u8; 16] = [1u8; 16];
    const B: [u8; 16] = [2u8; 16];

    fn msg(id: MessageId, size: u64) -> Message {
        Message::new(id, A, B, size)
    }

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_insert_accounts_bytes() {
        let mut store = MessageStore::new(1000, usize::MAX);
        store.insert(msg(1, 300), at(0)).unwrap();
        store.insert(msg(2, 200), at(1)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.free_space(), 500);
        assert_eq!(store.occupied(), 500);

        assert_eq!(store.remove(1).map(|m| m.id), Some(1));
        assert_eq!(store.free_space(), 800);
        assert!(store.remove(1).is_none());
    }

    #[test]
    fn test_insert_rejections() {
        let mut store = MessageStore::new(1000, 2);
        store.insert(msg(1, 600), at(0)).unwrap();

        assert_eq!(store.insert(msg(1, 10), at(1)), Err(Error::DuplicateMessage(1)));
        assert_eq!(store.insert(msg(2, 2000), at(1)), Err(Error::MessageTooLarge));
        assert_eq!(
            store.insert(msg(2, 500), at(1)),
            Err(Error::BufferFull {
                needed: 500,
                free: 400
            })
        );

        store.insert(msg(3, 100), at(1)).unwrap();
        // Slots exhausted even though bytes are free
        assert!(matches!(store.insert(msg(4, 1), at(2)), Err(Error::BufferFull { .. })));
    }

    #[test]
    fn test_make_room_evicts_oldest_unpinned() {
        let mut store = MessageStore::new(1000, usize::MAX);
        store.insert(msg(1, 400), at(0)).unwrap();
        store.insert(msg(2, 400), at(1)).unwrap();
        store.insert(msg(3, 200), at(2)).unwrap();

        // Oldest (1) is in transfer, so 2 goes
        let evicted = store.make_room(300, Some(1)).unwrap();
        assert_eq!(evicted, [2]);
        assert!(store.contains(1));
        assert_eq!(store.free_space(), 400);

        // Nothing to do when there is already room
        assert!(store.make_room(400, None).unwrap().is_empty());
    }

    #[test]
    fn test_make_room_all_or_nothing() {
        let mut store = MessageStore::new(1000, usize::MAX);
        store.insert(msg(1, 900), at(0)).unwrap();
        store.insert(msg(2, 100), at(1)).unwrap();

        assert!(matches!(store.make_room(500, Some(1)), Err(Error::BufferFull { .. })));
        assert_eq!(store.len(), 2);
        assert_eq!(store.make_room(1001, None), Err(Error::MessageTooLarge));
    }

    #[test]
    fn test_make_room_frees_slot() {
        let mut store = MessageStore::new(1000, 2);
        store.insert(msg(1, 1), at(0)).unwrap();
        store.insert(msg(2, 1), at(1)).unwrap();

        assert_eq!(store.make_room(1, None).unwrap(), [1]);
        store.insert(msg(3, 1), at(2)).unwrap();
    }

    #[test]
    fn test_fifo_and_expiry() {
        let mut store = MessageStore::new(1000, usize::MAX);
        let mut short = msg(7, 10);
        short.ttl = Some(Duration::from_secs(5));
        store.insert(msg(9, 10), at(3)).unwrap();
        store.insert(short, at(3)).unwrap();
        store.insert(msg(8, 10), at(1)).unwrap();

        let order: Vec<MessageId> = store.fifo().iter().map(|m| m.id).collect();
        assert_eq!(order, [8, 9, 7]);

        assert!(store.expired(at(4)).is_empty());
        assert_eq!(store.expired(at(5)), [7]);
    }
}
