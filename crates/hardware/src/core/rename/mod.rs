//! Register Alias Table with speculative checkpointing.
//!
//! Rename maps every architectural register to the physical register holding its
//! youngest value. It provides:
//! 1. **Batch rename:** Up to three sources per op resolved through the table, with
//!    same-batch forwarding from earlier destinations; a fresh register per destination.
//! 2. **All-or-nothing:** A batch that needs more registers (or checkpoint slots) than
//!    are free allocates nothing.
//! 3. **Checkpoints:** O(1) snapshot/restore tagged by the originating branch.
//! 4. **Walk-back:** Undo of individual renames, youngest first, for flushes that
//!    have no checkpoint.
//! 5. **Reclamation:** Old destinations return to the pool only at commit.

/// Rename checkpoint slots.
pub mod checkpoint;

/// Ring free list with restorable allocation pointer.
pub mod free_list;

/// Physical register ready/owner table.
pub mod pool;

use serde::Serialize;
use tracing::debug;

use self::checkpoint::{Checkpoint, CheckpointTable};
use self::free_list::FreeList;
use self::pool::RegisterPool;
use crate::common::constants::MAX_SRCS;
use crate::common::{ArchReg, CheckpointId, PhysReg, RobId, SeqNum, StallReason};
use crate::core::uop::MicroOp;

/// One op's rename inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenameRequest {
    /// Architectural sources.
    pub srcs: [Option<ArchReg>; MAX_SRCS],
    /// Architectural destination.
    pub dest: Option<ArchReg>,
    /// Writer recorded as owner of the new destination register.
    pub owner: SeqNum,
    /// Snapshot the table after this op, tagging it with this ROB id.
    pub checkpoint: Option<RobId>,
}

impl RenameRequest {
    /// Builds the request for `op`, which will occupy ROB slot `rob`.
    pub fn for_op(op: &MicroOp, rob: RobId) -> Self {
        Self {
            srcs: op.srcs,
            dest: op.dest,
            owner: op.seq,
            checkpoint: op.wants_checkpoint().then_some(rob),
        }
    }
}

/// Architectural mapping as seen by a reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Mapping {
    /// Physical register holding the youngest value.
    pub preg: PhysReg,
    /// Whether that value has been produced.
    pub ready: bool,
}

/// Renamed source operand.
pub type SourceTag = Mapping;

/// A destination rename: the new register and the one it displaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DestMapping {
    /// Architectural destination.
    pub arch: ArchReg,
    /// Freshly allocated physical register.
    pub new: PhysReg,
    /// Previous mapping, reclaimed when this op commits.
    pub old: PhysReg,
}

/// Result of renaming one op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenamedOp {
    /// Physical sources with readiness at rename time.
    pub srcs: [Option<SourceTag>; MAX_SRCS],
    /// Destination rename, if the op writes a register.
    pub dest: Option<DestMapping>,
    /// Checkpoint taken after this op.
    pub checkpoint: Option<CheckpointId>,
}

/// Comparable dump of the mapping table and free list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenameState {
    /// Architectural to physical mapping.
    pub map: Vec<PhysReg>,
    /// Free registers in allocation order.
    pub free: Vec<PhysReg>,
    /// Raw free-list `(head, tail)` counters.
    pub free_counters: (u64, u64),
}

/// The Register Alias Table together with its free list, register pool and checkpoints.
#[derive(Clone, Debug)]
pub struct RenameUnit {
    map: Vec<PhysReg>,
    free_list: FreeList,
    pool: RegisterPool,
    checkpoints: CheckpointTable,
}

impl RenameUnit {
    /// Creates a table where architectural register `i` maps to physical register `i`.
    pub fn new(arch_regs: usize, phys_regs: usize, checkpoints: usize) -> Self {
        assert!(phys_regs > arch_regs, "need more physical than architectural registers");
        let map = (0..arch_regs).map(|i| PhysReg(i as u16)).collect();
        let free = (arch_regs..phys_regs).map(|i| PhysReg(i as u16));
        Self {
            map,
            free_list: FreeList::new(phys_regs, free),
            pool: RegisterPool::new(phys_regs, arch_regs),
            checkpoints: CheckpointTable::new(checkpoints),
        }
    }

    /// Number of architectural registers.
    pub fn arch_regs(&self) -> usize {
        self.map.len()
    }

    /// Registers available for allocation.
    pub fn free_registers(&self) -> usize {
        self.free_list.len()
    }

    /// Checkpoint slots available.
    pub fn free_checkpoints(&self) -> usize {
        self.checkpoints.free_slots()
    }

    /// Current mapping of `arch`.
    pub fn lookup(&self, arch: ArchReg) -> Mapping {
        let preg = self.map[arch.index()];
        Mapping {
            preg,
            ready: self.pool.is_ready(preg),
        }
    }

    /// True once `preg` holds its value.
    #[inline]
    pub fn is_ready(&self, preg: PhysReg) -> bool {
        self.pool.is_ready(preg)
    }

    /// Owner bookkeeping for `preg`.
    pub fn register_state(&self, preg: PhysReg) -> pool::PhysRegState {
        self.pool.get(preg)
    }

    /// Marks `preg` ready on behalf of `writer`; ignored if `writer` no longer owns it.
    pub fn mark_ready(&mut self, preg: PhysReg, writer: SeqNum) -> bool {
        self.pool.mark_ready(preg, writer)
    }

    /// Renames a batch, all or nothing.
    ///
    /// Sources are resolved before the op's own destination is applied, so an op that
    /// reads and writes the same register sees the previous producer.
    pub fn rename(&mut self, batch: &[RenameRequest]) -> Result<Vec<RenamedOp>, StallReason> {
        let needed = batch.iter().filter(|r| r.dest.is_some()).count();
        if needed > self.free_list.len() {
            return Err(StallReason::NoFreeRegisters);
        }
        let checkpoints = batch.iter().filter(|r| r.checkpoint.is_some()).count();
        if checkpoints > self.checkpoints.free_slots() {
            return Err(StallReason::NoCheckpointSlot);
        }

        let mut out = Vec::with_capacity(batch.len());
        for req in batch {
            let srcs = req.srcs.map(|s| s.map(|arch| self.lookup(arch)));
            let dest = req.dest.map(|arch| {
                let new = match self.free_list.allocate() {
                    Some(reg) => reg,
                    None => unreachable!("free list drained after precheck"),
                };
                self.pool.claim(new, req.owner);
                let old = std::mem::replace(&mut self.map[arch.index()], new);
                DestMapping { arch, new, old }
            });
            let checkpoint = match req.checkpoint {
                Some(origin) => Some(self.create_checkpoint(origin)?),
                None => None,
            };
            out.push(RenamedOp {
                srcs,
                dest,
                checkpoint,
            });
        }
        Ok(out)
    }

    /// Snapshots the mapping and free-list position, tagged with `origin`.
    pub fn create_checkpoint(&mut self, origin: RobId) -> Result<CheckpointId, StallReason> {
        let cp = Checkpoint {
            origin,
            map: self.map.clone(),
            free_ptr: self.free_list.pointer(),
        };
        let id = self
            .checkpoints
            .insert(cp)
            .ok_or(StallReason::NoCheckpointSlot)?;
        debug!(%id, %origin, "checkpoint created");
        Ok(id)
    }

    /// Origin branch of a live checkpoint.
    pub fn checkpoint_origin(&self, id: CheckpointId) -> RobId {
        self.checkpoints.get(id).origin
    }

    /// Returns true if `id` is still live.
    pub fn checkpoint_is_live(&self, id: CheckpointId) -> bool {
        self.checkpoints.is_live(id)
    }

    /// Overwrites the current state with checkpoint `id` and invalidates every
    /// checkpoint with a younger origin. `id` itself stays live until committed.
    ///
    /// Registers allocated after the snapshot go back to the pool.
    pub fn restore_checkpoint(&mut self, id: CheckpointId) {
        let cp = self.checkpoints.get(id);
        let origin = cp.origin;
        let free_ptr = cp.free_ptr;
        self.map.clone_from(&cp.map);
        for reg in self.free_list.restore(free_ptr) {
            self.pool.release(reg);
        }
        let dropped = self.checkpoints.invalidate_from(origin.next());
        debug!(%id, %origin, dropped, "checkpoint restored");
    }

    /// Discards checkpoint `id` without restoring (its branch committed).
    pub fn commit_checkpoint(&mut self, id: CheckpointId) {
        let cp = self.checkpoints.remove(id);
        debug!(%id, origin = %cp.origin, "checkpoint released");
    }

    /// Drops every checkpoint whose origin is at or after `from`.
    pub fn invalidate_checkpoints_from(&mut self, from: RobId) -> usize {
        self.checkpoints.invalidate_from(from)
    }

    /// Returns a displaced register to the pool. Only legal when the op that
    /// displaced it commits.
    pub fn reclaim(&mut self, old: PhysReg) {
        self.pool.release(old);
        self.free_list.release(old);
    }

    /// Undoes one destination rename. Must be applied youngest first.
    pub fn rollback(&mut self, dest: DestMapping) {
        let slot = &mut self.map[dest.arch.index()];
        assert_eq!(
            *slot, dest.new,
            "rollback of {} expected mapping {}, found {}",
            dest.arch, dest.new, *slot
        );
        *slot = dest.old;
        self.free_list.unallocate(dest.new);
        self.pool.release(dest.new);
    }

    /// Comparable dump of the mapping table and free list.
    pub fn state(&self) -> RenameState {
        RenameState {
            map: self.map.clone(),
            free: self.free_list.contents(),
            free_counters: self.free_list.counters(),
        }
    }

    /// Live checkpoints, oldest origin first.
    pub fn live_checkpoints(&self) -> Vec<(CheckpointId, RobId)> {
        self.checkpoints.origins()
    }
}
