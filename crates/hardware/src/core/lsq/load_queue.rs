//! Load queue.
//!
//! Loads occupy program-order slots from dispatch until they retire at commit.
//! Each entry remembers which store (if any) supplied its value so a later store
//! address resolution can tell whether the load read stale data.

use serde::Serialize;

use crate::common::{AccessSize, LoadSlot, RobId, SeqNum};

/// Lifecycle state of a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum LoadState {
    /// Allocated at dispatch.
    #[default]
    Allocated,
    /// Address computed, value not yet obtained.
    AddressKnown,
    /// Value obtained from a store or memory.
    Completed,
}

/// A single load queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoadEntry {
    /// Owning ROB entry.
    pub rob: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Access width.
    pub size: AccessSize,
    /// Sign-extend the result.
    pub signed: bool,
    /// Effective address.
    pub addr: Option<u64>,
    /// Current lifecycle state.
    pub state: LoadState,
    /// ROB id of the store the value was forwarded from.
    pub forwarded_from: Option<RobId>,
}

impl LoadEntry {
    /// Byte range `[start, end)` once the address is known.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.addr.and_then(|a| Some((a, self.size.end(a)?)))
    }
}

/// Program-ordered ring of loads.
#[derive(Clone, Debug)]
pub struct LoadQueue {
    entries: Vec<Option<LoadEntry>>,
    head: u64,
    tail: u64,
}

impl LoadQueue {
    /// Creates an empty queue.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "load queue capacity must be non-zero");
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

    /// Returns true if no load is in flight.
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
    fn slot(&self, counter: u64) -> LoadSlot {
        LoadSlot((counter % self.entries.len() as u64) as u32)
    }

    /// Reserves the next slot. Returns `None` if the queue is full.
    pub fn allocate(
        &mut self,
        rob: RobId,
        seq: SeqNum,
        size: AccessSize,
        signed: bool,
    ) -> Option<LoadSlot> {
        if self.free_slots() == 0 {
            return None;
        }
        let slot = self.slot(self.tail);
        self.entries[slot.index()] = Some(LoadEntry {
            rob,
            seq,
            size,
            signed,
            addr: None,
            state: LoadState::Allocated,
            forwarded_from: None,
        });
        self.tail += 1;
        Some(slot)
    }

    /// Looks up an occupied slot.
    pub fn get(&self, slot: LoadSlot) -> Option<&LoadEntry> {
        self.entries.get(slot.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, slot: LoadSlot) -> &mut LoadEntry {
        match self.entries.get_mut(slot.index()).and_then(Option::as_mut) {
            Some(e) => e,
            None => panic!("access to empty load queue slot {slot}"),
        }
    }

    /// Records the effective address. A completed load keeps its state.
    pub fn set_address(&mut self, slot: LoadSlot, addr: u64) {
        let e = self.get_mut(slot);
        e.addr = Some(addr);
        if e.state == LoadState::Allocated {
            e.state = LoadState::AddressKnown;
        }
    }

    /// Marks the load as having obtained its value.
    pub fn complete(&mut self, slot: LoadSlot, forwarded_from: Option<RobId>) {
        let e = self.get_mut(slot);
        assert!(e.addr.is_some(), "load {slot} completed without an address");
        e.state = LoadState::Completed;
        e.forwarded_from = forwarded_from;
    }

    /// Frees the oldest slot at commit.
    pub fn retire(&mut self, slot: LoadSlot) -> LoadEntry {
        assert!(!self.is_empty(), "retire {slot} from empty load queue");
        let head = self.slot(self.head);
        assert_eq!(head, slot, "loads must retire in program order");
        self.head += 1;
        match self.entries[slot.index()].take() {
            Some(e) => e,
            None => panic!("retire of empty load queue slot {slot}"),
        }
    }

    /// Occupied entries in program order.
    pub fn iter(&self) -> impl Iterator<Item = (LoadSlot, &LoadEntry)> + '_ {
        (self.head..self.tail).filter_map(move |c| {
            let slot = self.slot(c);
            self.entries[slot.index()].as_ref().map(|e| (slot, e))
        })
    }

    /// Discards every load whose ROB id is at or after `from`, youngest first.
    pub fn flush(&mut self, from: RobId) -> Vec<LoadEntry> {
        let mut dropped = Vec::new();
        while self.tail > self.head {
            let slot = self.slot(self.tail - 1);
            match self.entries[slot.index()] {
                Some(e) if e.rob >= from => {
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
