//! Load/Store Queue with memory disambiguation.
//!
//! Tracks every in-flight memory operation in program order. It provides:
//! 1. **Allocation:** Bounded load and store queues, one slot per memory op.
//! 2. **Forwarding:** An MDU pre-check followed by an authoritative scan of older
//!    stores, youngest first. Only a store whose bytes fully cover the load may
//!    forward; a partial overlap waits for that store to drain.
//! 3. **Ordering checks:** When a store address resolves, younger loads that
//!    already obtained a value from an older source are reported as violations.
//! 4. **Drain:** Committed stores enter a small bounded drain queue and are written
//!    to memory in program order.
//! 5. **Flush:** Loads and uncommitted stores at or after a cut line are discarded.
//!
//! Stores whose address is still unknown are speculatively bypassed by loads; the
//! ordering check catches the cases where that guess was wrong.

/// Load queue.
pub mod load_queue;

/// Hashed memory disambiguation table.
pub mod mdu;

/// Store queue.
pub mod store_queue;

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, trace};

use self::load_queue::{LoadEntry, LoadQueue, LoadState};
use self::mdu::Mdu;
use self::store_queue::{StoreEntry, StoreQueue, StoreState};
use crate::common::data::{range_covers, ranges_overlap};
use crate::common::{AccessSize, ExceptionCause, LoadSlot, RobId, SeqNum, StallReason, StoreSlot};

/// Result of store-to-load forwarding check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ForwardResult {
    /// An older store fully covers the load; `data` holds the covered bytes,
    /// zero-extended.
    Forward {
        /// Supplying store.
        store: StoreSlot,
        /// Its ROB id.
        rob: RobId,
        /// Covered bytes.
        data: u64,
    },
    /// No older store with a known address overlaps; read memory.
    Memory,
    /// A covering store exists but its data is not yet known.
    WaitData(StoreSlot),
    /// A store overlaps only partially; wait until it drains.
    WaitDrain(StoreSlot),
}

impl ForwardResult {
    /// True if the load can take its value from a store right now.
    pub const fn can_forward(self) -> bool {
        matches!(self, Self::Forward { .. })
    }

    /// Forwarded bytes, if any.
    pub const fn value(self) -> Option<u64> {
        match self {
            Self::Forward { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Forwarding decision plus whether the MDU filter resolved it without a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardCheck {
    /// Decision.
    pub result: ForwardResult,
    /// The MDU proved there was nothing to scan.
    pub filtered: bool,
}

/// A committed store ready to be written to memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DrainRequest {
    /// Store queue slot, used to acknowledge the drain.
    pub slot: StoreSlot,
    /// ROB id the store committed under.
    pub rob: RobId,
    /// Target address.
    pub addr: u64,
    /// Access width.
    pub size: AccessSize,
    /// Data to write.
    pub data: u64,
}

/// Entries discarded by a flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LsqFlush {
    /// Discarded loads, youngest first.
    pub loads: Vec<LoadEntry>,
    /// Discarded stores, youngest first.
    pub stores: Vec<StoreEntry>,
}

/// Load/Store Queue plus disambiguation table and drain queue.
#[derive(Clone, Debug)]
pub struct Lsq {
    loads: LoadQueue,
    stores: StoreQueue,
    mdu: Mdu,
    drain: VecDeque<StoreSlot>,
    drain_capacity: usize,
}

impl Lsq {
    /// Creates empty queues.
    pub fn new(load_queue: usize, store_queue: usize, drain_queue: usize, mdu_entries: usize) -> Self {
        assert!(drain_queue > 0, "drain queue capacity must be non-zero");
        Self {
            loads: LoadQueue::new(load_queue),
            stores: StoreQueue::new(store_queue),
            mdu: Mdu::new(mdu_entries),
            drain: VecDeque::with_capacity(drain_queue),
            drain_capacity: drain_queue,
        }
    }

    /// Load queue.
    pub fn loads(&self) -> &LoadQueue {
        &self.loads
    }

    /// Store queue.
    pub fn stores(&self) -> &StoreQueue {
        &self.stores
    }

    /// Disambiguation table.
    pub fn mdu(&self) -> &Mdu {
        &self.mdu
    }

    /// Stores committed but not yet acknowledged by memory, oldest first.
    pub fn drain_queue(&self) -> impl Iterator<Item = StoreSlot> + '_ {
        self.drain.iter().copied()
    }

    /// Free drain queue slots.
    pub fn drain_free(&self) -> usize {
        self.drain_capacity - self.drain.len()
    }

    /// Reserves a load queue slot.
    pub fn allocate_load(
        &mut self,
        rob: RobId,
        seq: SeqNum,
        size: AccessSize,
        signed: bool,
    ) -> Result<LoadSlot, StallReason> {
        self.loads
            .allocate(rob, seq, size, signed)
            .ok_or(StallReason::LoadQueueFull)
    }

    /// Reserves a store queue slot.
    pub fn allocate_store(
        &mut self,
        rob: RobId,
        seq: SeqNum,
        size: AccessSize,
    ) -> Result<StoreSlot, StallReason> {
        self.stores
            .allocate(rob, seq, size)
            .ok_or(StallReason::StoreQueueFull)
    }

    /// Records a load's effective address.
    ///
    /// An access that would run past the top of the address space is refused with
    /// a load access fault and leaves the entry untouched.
    pub fn set_load_address(&mut self, slot: LoadSlot, addr: u64) -> Result<(), ExceptionCause> {
        let size = self.loads.get(slot).map_or(AccessSize::Byte, |l| l.size);
        if size.end(addr).is_none() {
            return Err(ExceptionCause::LoadAccessFault(addr));
        }
        self.loads.set_address(slot, addr);
        Ok(())
    }

    /// Records a store's effective address and checks younger loads.
    ///
    /// Returns the oldest younger load that already obtained a value without
    /// seeing this store, if any. That load and everything after it must be flushed.
    /// An access that would run past the top of the address space is refused with a
    /// store access fault.
    pub fn set_store_address(
        &mut self,
        slot: StoreSlot,
        addr: u64,
    ) -> Result<Option<RobId>, ExceptionCause> {
        let size = self.stores.get(slot).map_or(AccessSize::Byte, |s| s.size);
        if size.end(addr).is_none() {
            return Err(ExceptionCause::StoreAccessFault(addr));
        }
        if !self.stores.set_address(slot, addr) {
            return Ok(None);
        }
        let Some(store) = self.stores.get(slot).copied() else {
            return Ok(None);
        };
        let Some((start, end)) = store.range() else {
            return Ok(None);
        };
        self.mdu.add_store(addr, store.size, store.rob);

        let violator = self
            .loads
            .iter()
            .map(|(_, l)| l)
            .filter(|l| l.rob > store.rob && l.state == LoadState::Completed)
            .filter(|l| l.forwarded_from.is_none_or(|src| src < store.rob))
            .find(|l| l.range().is_some_and(|(ls, le)| ranges_overlap(start, end, ls, le)))
            .map(|l| l.rob);
        if let Some(load) = violator {
            debug!(store = %store.rob, %load, addr = format_args!("{addr:#x}"), "memory ordering violation");
        }
        Ok(violator)
    }

    /// Records a store's data.
    pub fn set_store_data(&mut self, slot: StoreSlot, data: u64) {
        self.stores.set_data(slot, data);
    }

    /// Returns true once a store has both address and data.
    pub fn store_resolved(&self, slot: StoreSlot) -> bool {
        self.stores
            .get(slot)
            .is_some_and(|s| s.state == StoreState::DataReady)
    }

    /// Decides where a load gets its value. The load's address must be known.
    pub fn check_forwarding(&mut self, slot: LoadSlot) -> ForwardCheck {
        let load = match self.loads.get(slot) {
            Some(l) => *l,
            None => panic!("forwarding check for empty load slot {slot}"),
        };
        let Some((start, end)) = load.range() else {
            panic!("forwarding check for {slot} before its address is known");
        };
        self.mdu.record_load(start, load.size, load.rob);
        if !self.mdu.may_conflict(start, load.size) {
            return ForwardCheck {
                result: ForwardResult::Memory,
                filtered: true,
            };
        }

        let mut result = ForwardResult::Memory;
        for (sslot, store) in self.stores.older_than(load.rob) {
            let Some((ss, se)) = store.range() else {
                continue;
            };
            if !ranges_overlap(ss, se, start, end) {
                continue;
            }
            result = if !range_covers(ss, se, start, end) {
                ForwardResult::WaitDrain(sslot)
            } else if let Some(data) = store.data {
                let shifted = data >> ((start - ss) * 8);
                ForwardResult::Forward {
                    store: sslot,
                    rob: store.rob,
                    data: shifted & load.size.mask(),
                }
            } else {
                ForwardResult::WaitData(sslot)
            };
            break;
        }
        trace!(load = %load.rob, ?result, "forwarding check");
        ForwardCheck {
            result,
            filtered: false,
        }
    }

    /// Marks a load as having obtained its value.
    pub fn complete_load(&mut self, slot: LoadSlot, forwarded_from: Option<RobId>) {
        self.loads.complete(slot, forwarded_from);
    }

    /// Frees a load's slot at commit.
    pub fn retire_load(&mut self, slot: LoadSlot) {
        let _ = self.loads.retire(slot);
    }

    /// Queues a store for drain at commit. Fails if the drain queue is full.
    pub fn commit_store(&mut self, slot: StoreSlot) -> Result<(), StallReason> {
        if self.drain.len() == self.drain_capacity {
            return Err(StallReason::DrainQueueFull);
        }
        self.stores.mark_committed(slot);
        self.drain.push_back(slot);
        Ok(())
    }

    /// Starts draining up to `max` committed stores, oldest first.
    pub fn begin_drain(&mut self, max: usize) -> Vec<DrainRequest> {
        let mut out = Vec::new();
        for &slot in &self.drain {
            if out.len() == max {
                break;
            }
            let Some(entry) = self.stores.get(slot) else {
                continue;
            };
            if entry.state != StoreState::Committed {
                continue;
            }
            let entry = self.stores.mark_draining(slot);
            if let (Some(addr), Some(data)) = (entry.addr, entry.data) {
                out.push(DrainRequest {
                    slot,
                    rob: entry.rob,
                    addr,
                    size: entry.size,
                    data,
                });
            }
        }
        out
    }

    /// Acknowledges a drain; frees the slot and unregisters it from the MDU.
    pub fn store_drained(&mut self, slot: StoreSlot) -> StoreEntry {
        assert_eq!(
            self.drain.front(),
            Some(&slot),
            "drain acknowledgements must arrive in program order"
        );
        let _ = self.drain.pop_front();
        let entry = self.stores.pop_drained(slot);
        if let Some(addr) = entry.addr {
            self.mdu.remove_store(addr, entry.size);
        }
        entry
    }

    /// Discards loads and uncommitted stores at or after `from`.
    pub fn flush(&mut self, from: RobId) -> LsqFlush {
        let loads = self.loads.flush(from);
        let stores = self.stores.flush(from);
        for s in &stores {
            if let Some(addr) = s.addr {
                self.mdu.remove_store(addr, s.size);
            }
        }
        LsqFlush { loads, stores }
    }
}
