//! Reorder Buffer (ROB) for in-order commit.
//!
//! The ROB is a circular ledger of in-flight instructions from dispatch through
//! commit. It provides:
//! 1. **Allocation:** Reserves contiguous program-order ids for a whole batch or none.
//! 2. **Completion:** Records results, exceptions and branch outcomes, validated by
//!    sequence number so a completion from a flushed instruction cannot land on the
//!    instruction that reused its id.
//! 3. **In-order Commit:** Retires completed entries from the head and reports the
//!    first entry that needs recovery instead of committing it.
//! 4. **Flush:** Drops every entry from a cut line to the tail and rewinds allocation.
//!
//! Ids are monotonically increasing `u64` counters; the slot is `id % capacity`.
//! A flush rewinds the allocation counter, so ids are reused after recovery.

use serde::Serialize;

use crate::common::{
    CheckpointId, ExceptionCause, FlushCause, LoadSlot, RobId, SeqNum, StallReason, StoreSlot,
};
use crate::core::rename::DestMapping;
use crate::core::uop::{BranchInfo, FuClass};

/// Lifecycle state of an ROB entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum RobState {
    /// Allocated, waiting in the scheduler.
    #[default]
    Dispatched,
    /// Issued to an execution unit.
    Executing,
    /// Result available, waiting to commit.
    Completed,
    /// Faulted; the exception is taken when the entry reaches the head.
    Excepted,
    /// Retired.
    Committed,
    /// Discarded by a flush.
    Flushed,
}

/// Memory queue slot held by a load or store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MemSlot {
    /// Load queue entry.
    Load(LoadSlot),
    /// Store queue entry.
    Store(StoreSlot),
}

/// Prediction captured at dispatch and the outcome observed at execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BranchRecord {
    /// Predicted direction.
    pub predicted_taken: bool,
    /// Predicted target when taken.
    pub predicted_target: u64,
    /// Resolved `(taken, next pc)`.
    pub resolved: Option<(bool, u64)>,
    /// Outcome disagreed with the prediction and recovery is still pending.
    pub mispredicted: bool,
}

impl From<BranchInfo> for BranchRecord {
    fn from(info: BranchInfo) -> Self {
        Self {
            predicted_taken: info.predicted_taken,
            predicted_target: info.predicted_target,
            resolved: None,
            mispredicted: false,
        }
    }
}

/// Dispatch-time contents of a new entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RobAlloc {
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Program counter.
    pub pc: u64,
    /// Functional-unit class.
    pub class: FuClass,
    /// Destination rename.
    pub dest: Option<DestMapping>,
    /// Checkpoint taken after this branch.
    pub checkpoint: Option<CheckpointId>,
    /// Branch prediction.
    pub branch: Option<BranchInfo>,
    /// Memory queue slot.
    pub mem: Option<MemSlot>,
}

/// A single entry in the Reorder Buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RobEntry {
    /// Program-order id.
    pub id: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Program counter.
    pub pc: u64,
    /// Functional-unit class.
    pub class: FuClass,
    /// Destination rename (new and displaced register).
    pub dest: Option<DestMapping>,
    /// Checkpoint owned by this branch.
    pub checkpoint: Option<CheckpointId>,
    /// Branch prediction and outcome.
    pub branch: Option<BranchRecord>,
    /// Memory queue slot.
    pub mem: Option<MemSlot>,
    /// Current lifecycle state.
    pub state: RobState,
    /// Exception raised by execution.
    pub exception: Option<ExceptionCause>,
    /// A load that read memory before an older overlapping store resolved.
    pub ordering_violation: bool,
}

impl RobEntry {
    /// True once the entry has finished executing (successfully or not).
    #[inline]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, RobState::Completed | RobState::Excepted)
    }
}

/// Entry at which commit stopped because recovery is required.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FlushPoint {
    /// Offending entry.
    pub id: RobId,
    /// Its sequence number.
    pub seq: SeqNum,
    /// Its program counter.
    pub pc: u64,
    /// Why recovery is needed.
    pub cause: FlushCause,
    /// Where the front end must resume (for mispredictions, the resolved next pc).
    pub target: u64,
}

/// Why a commit scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CommitStop {
    /// ROB drained.
    Empty,
    /// Commit bandwidth used up.
    Bandwidth,
    /// Head has not finished executing.
    NotReady(RobId),
    /// Head is ready but an external resource (e.g. the drain queue) refused it.
    Blocked(RobId),
    /// Head needs recovery.
    Flush(FlushPoint),
}

/// Result of one commit scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReport {
    /// Entries retired this call, oldest first.
    pub committed: Vec<RobEntry>,
    /// Why the scan stopped.
    pub stop: CommitStop,
}

/// Reorder Buffer: circular buffer for in-order commit.
#[derive(Clone, Debug)]
pub struct Rob {
    /// Fixed-size slot array, indexed by `id % capacity`.
    entries: Vec<Option<RobEntry>>,
    /// Oldest live id (commit point).
    head: RobId,
    /// Next id to allocate.
    tail: RobId,
}

impl Rob {
    /// Creates an empty ROB with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ROB capacity must be non-zero");
        Self {
            entries: vec![None; capacity],
            head: RobId(0),
            tail: RobId(0),
        }
    }

    /// Returns the ROB capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of occupied entries.
    #[inline]
    pub const fn len(&self) -> usize {
        (self.tail.0 - self.head.0) as usize
    }

    /// Returns true if the ROB is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head.0 == self.tail.0
    }

    /// Returns the number of free slots.
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Oldest live id.
    #[inline]
    pub const fn head(&self) -> RobId {
        self.head
    }

    /// Id the next allocation will receive.
    #[inline]
    pub const fn tail(&self) -> RobId {
        self.tail
    }

    #[inline]
    fn slot(&self, id: RobId) -> usize {
        (id.0 % self.entries.len() as u64) as usize
    }

    #[inline]
    const fn is_live(&self, id: RobId) -> bool {
        id.0 >= self.head.0 && id.0 < self.tail.0
    }

    /// Reserves `batch.len()` contiguous ids, or nothing if they do not all fit.
    pub fn allocate(&mut self, batch: &[RobAlloc]) -> Result<Vec<RobId>, StallReason> {
        if batch.len() > self.free_slots() {
            return Err(StallReason::RobFull);
        }
        let mut ids = Vec::with_capacity(batch.len());
        for alloc in batch {
            let id = self.tail;
            let idx = self.slot(id);
            self.entries[idx] = Some(RobEntry {
                id,
                seq: alloc.seq,
                pc: alloc.pc,
                class: alloc.class,
                dest: alloc.dest,
                checkpoint: alloc.checkpoint,
                branch: alloc.branch.map(BranchRecord::from),
                mem: alloc.mem,
                state: RobState::Dispatched,
                exception: None,
                ordering_violation: false,
            });
            self.tail = id.next();
            ids.push(id);
        }
        Ok(ids)
    }

    /// Looks up a live entry.
    pub fn entry(&self, id: RobId) -> Option<&RobEntry> {
        if !self.is_live(id) {
            return None;
        }
        self.entries[self.slot(id)].as_ref()
    }

    /// Looks up a live entry, requiring its sequence number to match.
    fn entry_checked_mut(&mut self, id: RobId, seq: SeqNum) -> Option<&mut RobEntry> {
        if !self.is_live(id) {
            return None;
        }
        let idx = self.slot(id);
        self.entries[idx].as_mut().filter(|e| e.seq == seq)
    }

    /// Returns the head entry, if any.
    pub fn peek_head(&self) -> Option<&RobEntry> {
        self.entry(self.head)
    }

    /// Iterates live entries from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &RobEntry> + '_ {
        (self.head.0..self.tail.0).filter_map(|raw| self.entries[self.slot(RobId(raw))].as_ref())
    }

    /// Marks an entry as issued. Returns false for a stale `(id, seq)` pair.
    pub fn mark_executing(&mut self, id: RobId, seq: SeqNum) -> bool {
        match self.entry_checked_mut(id, seq) {
            Some(e) => {
                if e.state == RobState::Dispatched {
                    e.state = RobState::Executing;
                }
                true
            }
            None => false,
        }
    }

    /// Marks an entry as completed. Idempotent; never overrides an exception.
    pub fn mark_completed(&mut self, id: RobId, seq: SeqNum) -> bool {
        match self.entry_checked_mut(id, seq) {
            Some(e) => {
                if !e.is_done() {
                    e.state = RobState::Completed;
                }
                true
            }
            None => false,
        }
    }

    /// Marks an entry as excepted. Idempotent; the first cause wins.
    pub fn mark_exception(&mut self, id: RobId, seq: SeqNum, cause: ExceptionCause) -> bool {
        match self.entry_checked_mut(id, seq) {
            Some(e) => {
                if e.state != RobState::Excepted {
                    e.state = RobState::Excepted;
                    e.exception = Some(cause);
                }
                true
            }
            None => false,
        }
    }

    /// Records a branch outcome and completes the entry. Returns `Some(mispredicted)`,
    /// or `None` for a stale pair or a non-branch entry.
    pub fn mark_branch_resolved(
        &mut self,
        id: RobId,
        seq: SeqNum,
        taken: bool,
        next_pc: u64,
    ) -> Option<bool> {
        let e = self.entry_checked_mut(id, seq)?;
        let br = e.branch.as_mut()?;
        if br.resolved.is_none() {
            br.resolved = Some((taken, next_pc));
            br.mispredicted =
                taken != br.predicted_taken || (taken && next_pc != br.predicted_target);
        }
        let mispredicted = br.mispredicted;
        if !e.is_done() {
            e.state = RobState::Completed;
        }
        Some(mispredicted)
    }

    /// Clears a pending misprediction once recovery has redirected the front end.
    pub fn clear_misprediction(&mut self, id: RobId) {
        if !self.is_live(id) {
            return;
        }
        let idx = self.slot(id);
        if let Some(br) = self.entries[idx].as_mut().and_then(|e| e.branch.as_mut()) {
            br.mispredicted = false;
        }
    }

    /// Flags a load as having violated memory ordering.
    pub fn mark_ordering_violation(&mut self, id: RobId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let idx = self.slot(id);
        match self.entries[idx].as_mut() {
            Some(e) => {
                e.ordering_violation = true;
                true
            }
            None => false,
        }
    }

    /// Flush point for the head entry, if it needs recovery.
    fn recovery_for(entry: &RobEntry) -> Option<FlushPoint> {
        let point = |cause, target| FlushPoint {
            id: entry.id,
            seq: entry.seq,
            pc: entry.pc,
            cause,
            target,
        };
        if let (RobState::Excepted, Some(cause)) = (entry.state, entry.exception) {
            return Some(point(FlushCause::Exception(cause), entry.pc));
        }
        if entry.ordering_violation {
            return Some(point(FlushCause::MemoryOrdering, entry.pc));
        }
        match entry.branch {
            Some(BranchRecord {
                mispredicted: true,
                resolved: Some((_, next_pc)),
                ..
            }) => Some(point(FlushCause::Misprediction, next_pc)),
            _ => None,
        }
    }

    /// Retires up to `max` entries from the head in program order.
    ///
    /// `admit` is consulted for each ready entry just before it retires; returning
    /// false ends the scan with [`CommitStop::Blocked`] and leaves the entry in place.
    pub fn commit(&mut self, max: usize, mut admit: impl FnMut(&RobEntry) -> bool) -> CommitReport {
        let mut committed = Vec::new();
        let stop = loop {
            if committed.len() == max {
                break CommitStop::Bandwidth;
            }
            let head = self.head;
            let Some(entry) = self.entry(head).copied() else {
                break CommitStop::Empty;
            };
            if let Some(point) = Self::recovery_for(&entry) {
                break CommitStop::Flush(point);
            }
            if entry.state != RobState::Completed {
                break CommitStop::NotReady(head);
            }
            if !admit(&entry) {
                break CommitStop::Blocked(head);
            }
            let idx = self.slot(head);
            self.entries[idx] = None;
            self.head = head.next();
            committed.push(RobEntry {
                state: RobState::Committed,
                ..entry
            });
        };
        CommitReport { committed, stop }
    }

    /// Invalidates every entry from `from` to the tail and rewinds allocation to `from`.
    ///
    /// Returns the flushed entries youngest first, the order rename walk-back needs.
    pub fn flush(&mut self, from: RobId) -> Vec<RobEntry> {
        assert!(
            from.0 >= self.head.0,
            "flush from {from} would discard committed state (head {})",
            self.head
        );
        if from.0 >= self.tail.0 {
            return Vec::new();
        }
        let mut flushed = Vec::with_capacity((self.tail.0 - from.0) as usize);
        for raw in (from.0..self.tail.0).rev() {
            let idx = self.slot(RobId(raw));
            if let Some(entry) = self.entries[idx].take() {
                flushed.push(RobEntry {
                    state: RobState::Flushed,
                    ..entry
                });
            }
        }
        self.tail = from;
        flushed
    }
}
