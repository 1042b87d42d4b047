//! Out-of-order core engine.
//!
//! `OooCore` owns the rename unit, ROB, scheduler and load/store queue and applies
//! every cross-component protocol in one place:
//! 1. **Dispatch:** All-or-nothing admission of a front-end batch, then rename, ROB
//!    and LSQ allocation, checkpoint creation and per-entry scheduler insertion.
//! 2. **Wakeup:** Completions mark their destination ready immediately and are
//!    broadcast to the scheduler at the start of the next cycle.
//! 3. **Memory:** Load forwarding decisions, store address/data resolution and
//!    ordering-violation flagging.
//! 4. **Commit:** In-order retirement with register reclamation, store drain
//!    enqueueing and checkpoint release.
//! 5. **Recovery:** A single flush primitive applied to all four components at once,
//!    driven by a checkpoint restore or a youngest-first rename walk-back.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::common::{
    CheckpointId, ExceptionCause, FlushCause, PhysReg, RobId, SeqNum, StallReason, StoreSlot,
};
use crate::config::Config;
use crate::context::SimContext;
use crate::core::lsq::load_queue::LoadEntry;
use crate::core::lsq::store_queue::StoreEntry;
use crate::core::lsq::{DrainRequest, ForwardResult, Lsq};
use crate::core::rename::{RenameRequest, RenameState, RenameUnit};
use crate::core::rob::{CommitStop, FlushPoint, MemSlot, Rob, RobAlloc, RobEntry};
use crate::core::scheduler::{Issued, SchedEntry, SchedRequest, Scheduler, SchedulerParams};
use crate::core::uop::{MemInfo, MicroOp};

/// Front-end redirect produced by commit-time recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Redirect {
    /// Instruction the recovery was triggered by.
    pub flush_point: RobId,
    /// Its sequence number.
    pub seq: SeqNum,
    /// Its program counter.
    pub pc: u64,
    /// Where fetch resumes.
    pub target: u64,
    /// Why.
    pub cause: FlushCause,
}

impl From<FlushPoint> for Redirect {
    fn from(p: FlushPoint) -> Self {
        Self {
            flush_point: p.id,
            seq: p.seq,
            pc: p.pc,
            target: p.target,
            cause: p.cause,
        }
    }
}

/// Result of one commit step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Entries retired, oldest first.
    pub retired: Vec<RobEntry>,
    /// Recovery performed this step, if any.
    pub redirect: Option<Redirect>,
}

/// Where an executing load gets its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Value supplied by an older in-flight store, already extended to 64 bits.
    Forwarded(u64),
    /// No conflicting store; the caller reads memory now.
    Memory,
    /// The load must be retried later.
    Wait(ForwardResult),
    /// The address was refused; the exception is already recorded in the ROB.
    Faulted(ExceptionCause),
    /// The `(rob, seq)` pair no longer names a live load.
    Stale,
}

/// Debug dump of all four components, for state comparison in tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoreSnapshot {
    /// Rename map and free list.
    pub rename: RenameState,
    /// Live checkpoints with their origins.
    pub checkpoints: Vec<(CheckpointId, RobId)>,
    /// ROB entries from head to tail.
    pub rob: Vec<RobEntry>,
    /// Waiting scheduler entries ordered by ROB id.
    pub scheduler: Vec<SchedEntry>,
    /// Entries waiting for scheduler space, in order.
    pub retry: Vec<RobId>,
    /// Load queue in program order.
    pub loads: Vec<LoadEntry>,
    /// Store queue in program order.
    pub stores: Vec<StoreEntry>,
}

/// The out-of-order execution engine.
#[derive(Clone, Debug)]
pub struct OooCore {
    rename: RenameUnit,
    rob: Rob,
    scheduler: Scheduler,
    lsq: Lsq,
    retry: VecDeque<SchedRequest>,
    broadcasts: Vec<(PhysReg, SeqNum)>,
    dispatch_width: usize,
    commit_width: usize,
    drain_width: usize,
}

impl OooCore {
    /// Builds an idle core from `config`.
    pub fn new(config: &Config) -> Self {
        let c = &config.core;
        Self {
            rename: RenameUnit::new(c.arch_regs, c.phys_regs, c.checkpoints),
            rob: Rob::new(c.rob_size),
            scheduler: Scheduler::new(SchedulerParams {
                capacity: c.scheduler_size,
                issue_width: c.issue_width,
                age_bands: c.age_bands,
                rob_capacity: c.rob_size,
                ports: config.units.ports(),
            }),
            lsq: Lsq::new(
                c.load_queue_size,
                c.store_queue_size,
                c.drain_queue_size,
                c.mdu_entries,
            ),
            retry: VecDeque::new(),
            broadcasts: Vec::new(),
            dispatch_width: c.dispatch_width,
            commit_width: c.commit_width,
            drain_width: c.drain_width,
        }
    }

    /// Rename unit.
    pub fn rename(&self) -> &RenameUnit {
        &self.rename
    }

    /// Reorder buffer.
    pub fn rob(&self) -> &Rob {
        &self.rob
    }

    /// Scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Load/store queue.
    pub fn lsq(&self) -> &Lsq {
        &self.lsq
    }

    /// Number of entries waiting for scheduler space.
    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// True when nothing is in flight and every committed store has drained.
    pub fn is_idle(&self) -> bool {
        self.rob.is_empty() && self.lsq.stores().is_empty() && self.retry.is_empty()
    }

    /// True if `(rob, seq)` still names a live instruction.
    pub fn is_current(&self, rob: RobId, seq: SeqNum) -> bool {
        self.rob.entry(rob).is_some_and(|e| e.seq == seq)
    }

    /// Starts a cycle: applies last cycle's wakeup broadcasts, then re-presents
    /// entries the scheduler could not take earlier.
    pub fn begin_cycle(&mut self, ctx: &mut SimContext) {
        let tags: Vec<PhysReg> = std::mem::take(&mut self.broadcasts)
            .into_iter()
            .filter(|&(preg, writer)| {
                let state = self.rename.register_state(preg);
                state.ready && state.owner == Some(writer)
            })
            .map(|(preg, _)| preg)
            .collect();
        if !tags.is_empty() {
            let woken = self.scheduler.wakeup(&tags);
            ctx.stats.wakeups += woken as u64;
        }

        if self.retry.is_empty() {
            return;
        }
        let pending: Vec<SchedRequest> = self
            .retry
            .drain(..)
            .map(|mut req| {
                for tag in req.srcs.iter_mut().flatten() {
                    tag.ready = self.rename.is_ready(tag.preg);
                }
                req
            })
            .collect();
        let outcome = self.scheduler.insert(&pending);
        if !outcome.rejected.is_empty() {
            ctx.stats.record_stall(StallReason::SchedulerFull);
        }
        self.retry.extend(outcome.rejected);
    }

    fn admission(&self, batch: &[MicroOp]) -> Result<(), StallReason> {
        let count = |f: fn(&MicroOp) -> bool| batch.iter().filter(|op| f(op)).count();
        if batch.len() > self.dispatch_width {
            return Err(StallReason::DispatchWidth);
        }
        if batch.len() > self.rob.free_slots() {
            return Err(StallReason::RobFull);
        }
        if count(MicroOp::is_load) > self.lsq.loads().free_slots() {
            return Err(StallReason::LoadQueueFull);
        }
        if count(MicroOp::is_store) > self.lsq.stores().free_slots() {
            return Err(StallReason::StoreQueueFull);
        }
        if count(MicroOp::wants_checkpoint) > self.rename.free_checkpoints() {
            return Err(StallReason::NoCheckpointSlot);
        }
        if count(|op| op.dest.is_some()) > self.rename.free_registers() {
            return Err(StallReason::NoFreeRegisters);
        }
        Ok(())
    }

    /// Admits a batch of micro-ops in program order, all or nothing.
    ///
    /// On success every op has a ROB entry; ops the scheduler cannot hold yet are
    /// queued and re-presented by [`OooCore::begin_cycle`].
    pub fn dispatch(
        &mut self,
        ctx: &mut SimContext,
        batch: &[MicroOp],
    ) -> Result<Vec<RobId>, StallReason> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        if let Err(reason) = self.admission(batch) {
            ctx.stats.record_stall(reason);
            return Err(reason);
        }

        let base = self.rob.tail();
        let ids: Vec<RobId> = (0..batch.len() as u64).map(|i| RobId(base.0 + i)).collect();
        let requests: Vec<RenameRequest> = batch
            .iter()
            .zip(&ids)
            .map(|(op, &id)| RenameRequest::for_op(op, id))
            .collect();
        let renamed = self.rename.rename(&requests)?;

        let mut allocs = Vec::with_capacity(batch.len());
        for ((op, &id), r) in batch.iter().zip(&ids).zip(&renamed) {
            let mem = match op.mem_info() {
                Some(MemInfo::Load { size, signed }) => Some(MemSlot::Load(
                    self.lsq.allocate_load(id, op.seq, size, signed)?,
                )),
                Some(MemInfo::Store { size }) => {
                    Some(MemSlot::Store(self.lsq.allocate_store(id, op.seq, size)?))
                }
                None => None,
            };
            allocs.push(RobAlloc {
                seq: op.seq,
                pc: op.pc,
                class: op.fu_class(),
                dest: r.dest,
                checkpoint: r.checkpoint,
                branch: op.branch_info(),
                mem,
            });
        }
        let allocated = self.rob.allocate(&allocs)?;
        debug_assert_eq!(allocated, ids);

        let requests: Vec<SchedRequest> = batch
            .iter()
            .zip(&ids)
            .zip(&renamed)
            .map(|((op, &rob), r)| SchedRequest {
                rob,
                seq: op.seq,
                class: op.fu_class(),
                criticality: op.effective_criticality(),
                srcs: r.srcs,
                dest: r.dest.map(|d| d.new),
            })
            .collect();
        if self.retry.is_empty() {
            let outcome = self.scheduler.insert(&requests);
            if !outcome.rejected.is_empty() {
                ctx.stats.record_stall(StallReason::SchedulerFull);
            }
            self.retry.extend(outcome.rejected);
        } else {
            self.retry.extend(requests);
        }

        ctx.stats.dispatched += batch.len() as u64;
        ctx.stats.checkpoints_created += renamed.iter().filter(|r| r.checkpoint.is_some()).count() as u64;
        trace!(first = %base, count = batch.len(), "dispatch");
        Ok(ids)
    }

    /// Selects this cycle's issue group and marks the ROB entries executing.
    pub fn select(&mut self, ctx: &mut SimContext) -> Vec<Issued> {
        let issued = self.scheduler.select(self.rob.head());
        for op in &issued {
            let _ = self.rob.mark_executing(op.rob, op.seq);
        }
        ctx.stats.issued += issued.len() as u64;
        issued
    }

    fn stale(ctx: &mut SimContext, rob: RobId, seq: SeqNum, what: &str) {
        ctx.stats.stale_completions += 1;
        warn!(%rob, %seq, what, "ignoring completion for flushed instruction");
    }

    fn publish(&mut self, rob: RobId, seq: SeqNum) {
        let dest = self.rob.entry(rob).and_then(|e| e.dest);
        if let Some(d) = dest
            && self.rename.mark_ready(d.new, seq)
        {
            self.broadcasts.push((d.new, seq));
        }
    }

    /// Records a successful result. Stale `(rob, seq)` pairs are ignored.
    pub fn complete(&mut self, ctx: &mut SimContext, rob: RobId, seq: SeqNum) -> bool {
        if !self.is_current(rob, seq) {
            Self::stale(ctx, rob, seq, "complete");
            return false;
        }
        self.publish(rob, seq);
        self.rob.mark_completed(rob, seq)
    }

    /// Records an exception. It is taken when the instruction reaches commit.
    pub fn fault(
        &mut self,
        ctx: &mut SimContext,
        rob: RobId,
        seq: SeqNum,
        cause: ExceptionCause,
    ) -> bool {
        if !self.rob.mark_exception(rob, seq, cause) {
            Self::stale(ctx, rob, seq, "fault");
            return false;
        }
        trace!(%rob, %cause, "exception recorded");
        true
    }

    /// Records a branch outcome; returns `Some(mispredicted)` for a live branch.
    pub fn resolve_branch(
        &mut self,
        ctx: &mut SimContext,
        rob: RobId,
        seq: SeqNum,
        taken: bool,
        next_pc: u64,
    ) -> Option<bool> {
        let Some(mispredicted) = self.rob.mark_branch_resolved(rob, seq, taken, next_pc) else {
            Self::stale(ctx, rob, seq, "branch");
            return None;
        };
        self.publish(rob, seq);
        if mispredicted {
            debug!(%rob, taken, next_pc = format_args!("{next_pc:#x}"), "branch mispredicted");
        }
        Some(mispredicted)
    }

    fn mem_slot(&self, rob: RobId, seq: SeqNum) -> Option<MemSlot> {
        self.rob.entry(rob).filter(|e| e.seq == seq).and_then(|e| e.mem)
    }

    /// Sets a load's address and decides where its value comes from.
    ///
    /// For [`LoadOutcome::Memory`] the caller must read memory in the same cycle;
    /// the load counts as having observed memory from this point on.
    pub fn execute_load(
        &mut self,
        ctx: &mut SimContext,
        rob: RobId,
        seq: SeqNum,
        addr: u64,
    ) -> LoadOutcome {
        let Some(MemSlot::Load(slot)) = self.mem_slot(rob, seq) else {
            Self::stale(ctx, rob, seq, "load");
            return LoadOutcome::Stale;
        };
        if let Err(cause) = self.lsq.set_load_address(slot, addr) {
            let _ = self.fault(ctx, rob, seq, cause);
            return LoadOutcome::Faulted(cause);
        }
        let check = self.lsq.check_forwarding(slot);
        if check.filtered {
            ctx.stats.mdu_filtered += 1;
        } else {
            ctx.stats.mdu_scans += 1;
        }
        match check.result {
            ForwardResult::Forward { rob: src, data, .. } => {
                self.lsq.complete_load(slot, Some(src));
                ctx.stats.loads_forwarded += 1;
                let (size, signed) = self
                    .lsq
                    .loads()
                    .get(slot)
                    .map_or((Default::default(), false), |l| (l.size, l.signed));
                LoadOutcome::Forwarded(size.extend(data, signed))
            }
            ForwardResult::Memory => {
                self.lsq.complete_load(slot, None);
                ctx.stats.loads_from_memory += 1;
                LoadOutcome::Memory
            }
            wait @ ForwardResult::WaitData(_) => {
                ctx.stats.loads_wait_data += 1;
                LoadOutcome::Wait(wait)
            }
            wait @ ForwardResult::WaitDrain(_) => {
                ctx.stats.loads_wait_drain += 1;
                LoadOutcome::Wait(wait)
            }
        }
    }

    fn store_progress(&mut self, rob: RobId, seq: SeqNum, slot: StoreSlot) {
        if self.lsq.store_resolved(slot) {
            let _ = self.rob.mark_completed(rob, seq);
        }
    }

    /// Resolves a store's address, flagging any younger load that read stale data.
    ///
    /// Returns false for a stale pair or a refused address; the latter is recorded
    /// as a store access fault.
    pub fn store_address(&mut self, ctx: &mut SimContext, rob: RobId, seq: SeqNum, addr: u64) -> bool {
        let Some(MemSlot::Store(slot)) = self.mem_slot(rob, seq) else {
            Self::stale(ctx, rob, seq, "store address");
            return false;
        };
        match self.lsq.set_store_address(slot, addr) {
            Ok(Some(load)) => {
                ctx.stats.ordering_violations += 1;
                let _ = self.rob.mark_ordering_violation(load);
            }
            Ok(None) => {}
            Err(cause) => {
                let _ = self.fault(ctx, rob, seq, cause);
                return false;
            }
        }
        self.store_progress(rob, seq, slot);
        true
    }

    /// Resolves a store's data.
    pub fn store_data(&mut self, ctx: &mut SimContext, rob: RobId, seq: SeqNum, data: u64) -> bool {
        let Some(MemSlot::Store(slot)) = self.mem_slot(rob, seq) else {
            Self::stale(ctx, rob, seq, "store data");
            return false;
        };
        self.lsq.set_store_data(slot, data);
        self.store_progress(rob, seq, slot);
        true
    }

    /// Retires completed instructions in program order and performs recovery when
    /// the head needs it.
    pub fn commit(&mut self, ctx: &mut SimContext) -> CommitOutcome {
        let mut drain_room = self.lsq.drain_free();
        let report = self.rob.commit(self.commit_width, |e| match e.mem {
            Some(MemSlot::Store(_)) if drain_room == 0 => false,
            Some(MemSlot::Store(_)) => {
                drain_room -= 1;
                true
            }
            _ => true,
        });

        for e in &report.committed {
            match e.mem {
                Some(MemSlot::Load(slot)) => self.lsq.retire_load(slot),
                Some(MemSlot::Store(slot)) => {
                    let queued = self.lsq.commit_store(slot);
                    assert!(queued.is_ok(), "drain queue overflow committing {}", e.id);
                }
                None => {}
            }
            if let Some(d) = e.dest {
                self.rename.reclaim(d.old);
            }
            if let Some(cp) = e.checkpoint {
                self.rename.commit_checkpoint(cp);
            }
            ctx.stats.committed += 1;
            ctx.stats.retired_by_class[e.class.index()] += 1;
        }

        let redirect = match report.stop {
            CommitStop::Flush(point) => Some(self.recover(ctx, point)),
            CommitStop::Blocked(_) => {
                ctx.stats.record_stall(StallReason::DrainQueueFull);
                None
            }
            CommitStop::Empty | CommitStop::Bandwidth | CommitStop::NotReady(_) => None,
        };
        CommitOutcome {
            retired: report.committed,
            redirect,
        }
    }

    fn recover(&mut self, ctx: &mut SimContext, point: FlushPoint) -> Redirect {
        match point.cause {
            FlushCause::Misprediction => {
                ctx.stats.flushes_mispredict += 1;
                let checkpoint = self.rob.entry(point.id).and_then(|e| e.checkpoint);
                match checkpoint {
                    Some(cp) => {
                        self.rename.restore_checkpoint(cp);
                        let _ = self.discard(ctx, point.id.next(), false);
                        ctx.stats.checkpoint_restores += 1;
                    }
                    None => {
                        let _ = self.discard(ctx, point.id.next(), true);
                        ctx.stats.walkback_recoveries += 1;
                    }
                }
                self.rob.clear_misprediction(point.id);
            }
            FlushCause::Exception(_) => {
                ctx.stats.flushes_exception += 1;
                let _ = self.flush(ctx, point.id);
            }
            FlushCause::MemoryOrdering => {
                ctx.stats.flushes_ordering += 1;
                let _ = self.flush(ctx, point.id);
            }
        }
        debug!(
            point = %point.id,
            cause = ?point.cause,
            target = format_args!("{:#x}", point.target),
            "recovered"
        );
        Redirect::from(point)
    }

    /// Discards every instruction at or after `from` in all four components and
    /// walks the rename map back youngest first. Returns how many were discarded.
    pub fn flush(&mut self, ctx: &mut SimContext, from: RobId) -> usize {
        let n = self.discard(ctx, from, true);
        ctx.stats.walkback_recoveries += 1;
        n
    }

    fn discard(&mut self, ctx: &mut SimContext, from: RobId, walk_back: bool) -> usize {
        let flushed = self.rob.flush(from);
        if walk_back {
            for e in &flushed {
                if let Some(d) = e.dest {
                    self.rename.rollback(d);
                }
            }
        }
        let _ = self.rename.invalidate_checkpoints_from(from);
        let _ = self.scheduler.flush(from);
        let _ = self.lsq.flush(from);
        self.retry.retain(|r| r.rob < from);
        ctx.stats.flushed_insts += flushed.len() as u64;
        debug!(%from, count = flushed.len(), walk_back, "flush");
        flushed.len()
    }

    /// Starts draining committed stores, up to the drain width.
    pub fn drain_stores(&mut self) -> Vec<DrainRequest> {
        self.lsq.begin_drain(self.drain_width)
    }

    /// Acknowledges a completed store drain.
    pub fn store_drained(&mut self, ctx: &mut SimContext, slot: StoreSlot) {
        let _ = self.lsq.store_drained(slot);
        ctx.stats.stores_drained += 1;
    }

    /// Debug dump of every component.
    pub fn snapshot(&self) -> CoreSnapshot {
        let mut scheduler: Vec<SchedEntry> = self.scheduler.entries().copied().collect();
        scheduler.sort_by_key(|e| e.rob);
        CoreSnapshot {
            rename: self.rename.state(),
            checkpoints: self.rename.live_checkpoints(),
            rob: self.rob.iter().copied().collect(),
            scheduler,
            retry: self.retry.iter().map(|r| r.rob).collect(),
            loads: self.lsq.loads().iter().map(|(_, e)| *e).collect(),
            stores: self.lsq.stores().iter().map(|(_, e)| *e).collect(),
        }
    }
}
