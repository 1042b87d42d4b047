//! Memory Disambiguation Unit.
//!
//! A small hashed table indexed by 8-byte granule. Each entry counts the
//! in-flight stores with a known address touching any granule that hashes there,
//! and keeps the most recent access for inspection. A load whose granules all
//! have a zero count cannot overlap any known-address store, so the store queue
//! scan can be skipped. Aliasing only ever inflates counts, so the filter can
//! report a false conflict but never miss a real one.

use serde::Serialize;

use crate::common::constants::MDU_GRANULE_BYTES;
use crate::common::{AccessSize, RobId};

/// Most recent access recorded in a table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    /// Start address.
    pub addr: u64,
    /// Access width.
    pub size: AccessSize,
    /// Store (true) or load (false).
    pub is_store: bool,
    /// Program-order id of the access.
    pub rob: RobId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct MduEntry {
    stores: u32,
    last: Option<AccessRecord>,
}

/// Hashed disambiguation table.
#[derive(Clone, Debug)]
pub struct Mdu {
    table: Vec<MduEntry>,
}

impl Mdu {
    /// Creates a table with `entries` slots.
    pub fn new(entries: usize) -> Self {
        assert!(entries > 0, "MDU table must have at least one entry");
        Self {
            table: vec![MduEntry::default(); entries],
        }
    }

    #[inline]
    fn index(&self, granule: u64) -> usize {
        let h = (granule ^ (granule >> 17)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        ((h >> 32) % self.table.len() as u64) as usize
    }

    fn granules(addr: u64, size: AccessSize) -> std::ops::RangeInclusive<u64> {
        let first = addr / MDU_GRANULE_BYTES;
        let last = size.end(addr).map_or(u64::MAX, |end| end - 1) / MDU_GRANULE_BYTES;
        first..=last
    }

    fn slots(&self, addr: u64, size: AccessSize) -> Vec<usize> {
        let mut slots: Vec<usize> = Self::granules(addr, size).map(|g| self.index(g)).collect();
        slots.dedup();
        slots
    }

    /// Registers a store whose address just became known.
    pub fn add_store(&mut self, addr: u64, size: AccessSize, rob: RobId) {
        for i in self.slots(addr, size) {
            let e = &mut self.table[i];
            e.stores += 1;
            e.last = Some(AccessRecord {
                addr,
                size,
                is_store: true,
                rob,
            });
        }
    }

    /// Unregisters a store that drained or was flushed.
    pub fn remove_store(&mut self, addr: u64, size: AccessSize) {
        for i in self.slots(addr, size) {
            let e = &mut self.table[i];
            assert!(e.stores > 0, "MDU store count underflow at {addr:#x}");
            e.stores -= 1;
        }
    }

    /// Records a load access.
    pub fn record_load(&mut self, addr: u64, size: AccessSize, rob: RobId) {
        for i in self.slots(addr, size) {
            self.table[i].last = Some(AccessRecord {
                addr,
                size,
                is_store: false,
                rob,
            });
        }
    }

    /// Returns false only if no known-address store can overlap `[addr, addr+size)`.
    pub fn may_conflict(&self, addr: u64, size: AccessSize) -> bool {
        self.slots(addr, size).into_iter().any(|i| self.table[i].stores > 0)
    }

    /// Most recent access recorded for the granule containing `addr`.
    pub fn recent(&self, addr: u64) -> Option<AccessRecord> {
        self.table[self.index(addr / MDU_GRANULE_BYTES)].last
    }

    /// Total registered store-granule references.
    pub fn tracked(&self) -> u64 {
        self.table.iter().map(|e| u64::from(e.stores)).sum()
    }
}
