//! Store queue.
//!
//! Stores hold their slot from dispatch until the memory system acknowledges the
//! drain. Committed stores are always the oldest entries in the queue, so a flush
//! (which only ever cuts at or after the ROB head) removes a suffix of
//! uncommitted stores and never touches committed ones.

use serde::Serialize;

use crate::common::{AccessSize, RobId, SeqNum, StoreSlot};

/// Lifecycle state of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum StoreState {
    /// Allocated at dispatch.
    #[default]
    Allocated,
    /// Address computed, data pending.
    AddressKnown,
    /// Data available, address pending.
    DataKnown,
    /// Address and data both available.
    DataReady,
    /// Retired by the ROB, queued for drain.
    Committed,
    /// Write request handed to memory.
    Draining,
    /// Write acknowledged; the slot is about to be freed.
    Drained,
}

impl StoreState {
    /// True once the ROB has retired the store.
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Committed | Self::Draining | Self::Drained)
    }
}

/// A single store queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StoreEntry {
    /// Owning ROB entry.
    pub rob: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Access width.
    pub size: AccessSize,
    /// Effective address.
    pub addr: Option<u64>,
    /// Data to write, already truncated to `size`.
    pub data: Option<u64>,
    /// Current lifecycle state.
    pub state: StoreState,
}

impl StoreEntry {
    /// Byte range `[start, end)` once the address is known.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.addr.and_then(|a| Some((a, self.size.end(a)?)))
    }
}

/// Program-ordered ring of stores.
#[derive(Clone, Debug)]
pub struct StoreQueue {
    entries: Vec<Option<StoreEntry>>,
    head: u64,
    tail: u64,
}

impl StoreQueue {
    /// Creates an empty queue.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "store queue capacity must be non-zero");
        Self {
            entries: vec![None; capacity],
            head: 0,
            tail: 0,
        }
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of occupied entries.
    #[inline]
    pub const fn len(&self) -> usize {
        (self.tail - self.head) as usize
    }

    /// Returns true if no store is in flight.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Returns the number of free slots.
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity() - self.len()
    }

    #[inline]
    fn slot(&self, counter: u64) -> StoreSlot {
        StoreSlot((counter % self.entries.len() as u64) as u32)
    }

    /// Reserves the next slot. Returns `None` if the queue is full.
    pub fn allocate(&mut self, rob: RobId, seq: SeqNum, size: AccessSize) -> Option<StoreSlot> {
        if self.free_slots() == 0 {
            return None;
        }
        let slot = self.slot(self.tail);
        self.entries[slot.index()] = Some(StoreEntry {
            rob,
            seq,
            size,
            addr: None,
            data: None,
            state: StoreState::Allocated,
        });
        self.tail += 1;
        Some(slot)
    }

    /// Looks up an occupied slot.
    pub fn get(&self, slot: StoreSlot) -> Option<&StoreEntry> {
        self.entries.get(slot.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, slot: StoreSlot) -> &mut StoreEntry {
        match self.entries.get_mut(slot.index()).and_then(Option::as_mut) {
            Some(e) => e,
            None => panic!("access to empty store queue slot {slot}"),
        }
    }

    /// Records the effective address. Returns false if it was already known.
    pub fn set_address(&mut self, slot: StoreSlot, addr: u64) -> bool {
        let e = self.get_mut(slot);
        if e.addr.is_some() {
            return false;
        }
        e.addr = Some(addr);
        e.state = match e.state {
            StoreState::Allocated => StoreState::AddressKnown,
            StoreState::DataKnown => StoreState::DataReady,
            other => other,
        };
        true
    }

    /// Records the store data.
    pub fn set_data(&mut self, slot: StoreSlot, data: u64) {
        let e = self.get_mut(slot);
        e.data = Some(data & e.size.mask());
        e.state = match e.state {
            StoreState::Allocated => StoreState::DataKnown,
            StoreState::AddressKnown => StoreState::DataReady,
            other => other,
        };
    }

    /// Moves a fully resolved store to `Committed`.
    pub fn mark_committed(&mut self, slot: StoreSlot) {
        let e = self.get_mut(slot);
        assert_eq!(
            e.state,
            StoreState::DataReady,
            "store {slot} committed before address and data were known"
        );
        e.state = StoreState::Committed;
    }

    /// Moves a committed store to `Draining` and returns it.
    pub fn mark_draining(&mut self, slot: StoreSlot) -> StoreEntry {
        let e = self.get_mut(slot);
        assert_eq!(e.state, StoreState::Committed, "drain of uncommitted store {slot}");
        e.state = StoreState::Draining;
        *e
    }

    /// Frees the oldest slot once its drain is acknowledged.
    pub fn pop_drained(&mut self, slot: StoreSlot) -> StoreEntry {
        assert!(!self.is_empty(), "drain ack {slot} on empty store queue");
        assert_eq!(self.slot(self.head), slot, "stores must drain in program order");
        let mut entry = match self.entries[slot.index()].take() {
            Some(e) => e,
            None => panic!("drain ack for empty store queue slot {slot}"),
        };
        assert_eq!(entry.state, StoreState::Draining, "drain ack for idle store {slot}");
        entry.state = StoreState::Drained;
        self.head += 1;
        entry
    }

    /// Occupied entries in program order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (StoreSlot, &StoreEntry)> + '_ {
        (self.head..self.tail).filter_map(move |c| {
            let slot = self.slot(c);
            self.entries[slot.index()].as_ref().map(|e| (slot, e))
        })
    }

    /// Stores strictly older than `rob`, youngest first.
    pub fn older_than(&self, rob: RobId) -> impl Iterator<Item = (StoreSlot, &StoreEntry)> + '_ {
        self.iter().rev().filter(move |(_, e)| e.rob < rob)
    }

    /// Discards every uncommitted store whose ROB id is at or after `from`, youngest first.
    pub fn flush(&mut self, from: RobId) -> Vec<StoreEntry> {
        let mut dropped = Vec::new();
        while self.tail > self.head {
            let slot = self.slot(self.tail - 1);
            match self.entries[slot.index()] {
                Some(e) if e.rob >= from => {
                    assert!(
                        !e.state.is_committed(),
                        "flush would discard committed store {slot}"
                    );
                    self.entries[slot.index()] = None;
                    self.tail -= 1;
                    dropped.push(e);
                }
                _ => break,
            }
        }
        dropped
    }
}
