//! Simulator: drives the out-of-order core from an oracle trace.
//!
//! The core models only the bookkeeping of speculation. Everything around it lives
//! here, side by side with the core:
//! 1. **Front end:** Trace replay with wrong-path fetch after mispredicted branches.
//! 2. **Execution:** Fixed-latency units fed by the scheduler's issue group.
//! 3. **Memory:** Load reads and store drains through a [`MemoryPort`].
//! 4. **Checking:** A sequential reference memory updated at commit; every committed
//!    load is compared against it, and the final memory images must agree.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::exec::{ExecEvent, ExecKind, ExecRequest, ExecutionCluster};
use super::frontend::{Frontend, Origin};
use super::memory::{FlatMemory, MemoryPort};
use super::regfile::RegisterFile;
use super::trace::{Trace, TraceOp};
use crate::common::{ArchReg, FlushCause, PhysReg, RobId, SeqNum, SimError};
use crate::config::Config;
use crate::context::SimContext;
use crate::core::lsq::DrainRequest;
use crate::core::scheduler::Issued;
use crate::core::uop::MicroOp;
use crate::core::{LoadOutcome, OooCore, Redirect};
use crate::stats::SimStats;

#[derive(Clone, Copy, Debug)]
struct InFlight {
    origin: Origin,
    rob: RobId,
    load_value: Option<u64>,
}

/// Outcome of [`Simulator::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Cycles simulated.
    pub cycles: u64,
    /// Trace records committed.
    pub committed: u64,
    /// Trace records skipped because they raised an exception.
    pub exceptions: u64,
    /// True if the whole trace retired and every store drained.
    pub finished: bool,
    /// Committed loads whose value disagreed with the reference model.
    pub load_mismatches: u64,
    /// Bytes where final memory disagrees with the reference model.
    pub memory_mismatches: Vec<u64>,
}

impl RunSummary {
    /// True if the run finished and matched the reference model everywhere.
    pub fn is_clean(&self) -> bool {
        self.finished && self.load_mismatches == 0 && self.memory_mismatches.is_empty()
    }
}

/// Top-level simulator: core, execution cluster and memory.
#[derive(Debug)]
pub struct Simulator {
    config: Config,
    core: OooCore,
    ctx: SimContext,
    trace: Trace,
    frontend: Frontend,
    cluster: ExecutionCluster,
    memory: FlatMemory,
    golden: FlatMemory,
    regfile: RegisterFile,
    inflight: HashMap<SeqNum, InFlight>,
    fetch_buffer: Vec<(MicroOp, Origin)>,
    narrow_dispatch: bool,
    drains: VecDeque<(u64, DrainRequest)>,
    committed: u64,
    exceptions: u64,
}

impl Simulator {
    /// Validates `config` and `trace` and builds an idle simulator with the
    /// trace's initial memory image applied.
    pub fn new(config: Config, trace: Trace) -> Result<Self, SimError> {
        config.validate()?;
        trace.validate(config.core.arch_regs)?;

        let mut memory = FlatMemory::with_faults(config.memory.fault_ranges.iter().copied());
        let mut golden = FlatMemory::new();
        for init in &trace.memory {
            memory.poke(init.addr, init.size, init.value);
            golden.poke(init.addr, init.size, init.value);
        }

        Ok(Self {
            core: OooCore::new(&config),
            ctx: SimContext::new(),
            frontend: Frontend::new(config.core.arch_regs),
            cluster: ExecutionCluster::new(&config.units),
            regfile: RegisterFile::new(config.core.phys_regs),
            inflight: HashMap::new(),
            fetch_buffer: Vec::new(),
            narrow_dispatch: false,
            drains: VecDeque::new(),
            committed: 0,
            exceptions: 0,
            memory,
            golden,
            trace,
            config,
        })
    }

    /// The core being driven.
    pub fn core(&self) -> &OooCore {
        &self.core
    }

    /// Current cycle.
    pub fn cycle(&self) -> u64 {
        self.ctx.cycle
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &SimStats {
        &self.ctx.stats
    }

    /// Memory as written by drained stores.
    pub fn memory(&self) -> &FlatMemory {
        &self.memory
    }

    /// Sequential reference memory.
    pub fn golden(&self) -> &FlatMemory {
        &self.golden
    }

    /// Current value of architectural register `arch` through the rename map.
    ///
    /// Equals the committed value once the core is idle.
    pub fn arch_value(&self, arch: ArchReg) -> u64 {
        self.regfile.read(self.core.rename().lookup(arch).preg)
    }

    /// True once every trace record has been handled and the core is drained.
    pub fn finished(&self) -> bool {
        self.frontend.exhausted(&self.trace)
            && self.fetch_buffer.is_empty()
            && self.drains.is_empty()
            && self.core.is_idle()
    }

    /// Runs until the trace finishes or `max_cycles` have elapsed.
    pub fn run(&mut self, max_cycles: u64) -> RunSummary {
        while !self.finished() && self.ctx.cycle < max_cycles {
            self.tick();
        }
        let finished = self.finished();
        let summary = RunSummary {
            cycles: self.ctx.cycle,
            committed: self.committed,
            exceptions: self.exceptions,
            finished,
            load_mismatches: self.ctx.stats.load_value_mismatches,
            memory_mismatches: self.memory.diff(&self.golden),
        };
        if finished {
            info!(
                cycles = summary.cycles,
                committed = summary.committed,
                ipc = format_args!("{:.3}", self.ctx.stats.ipc()),
                "trace finished"
            );
        } else {
            warn!(cycles = summary.cycles, "cycle limit reached before the trace finished");
        }
        summary
    }

    /// Advances the simulation by one cycle.
    pub fn tick(&mut self) {
        let now = self.ctx.cycle;
        self.core.begin_cycle(&mut self.ctx);
        self.acknowledge_drains(now);
        self.commit();
        for req in self.core.drain_stores() {
            self.drains
                .push_back((now + self.config.memory.store_latency.max(1), req));
        }
        for event in self.cluster.due(now) {
            self.handle(event, now);
        }
        let issued = self.core.select(&mut self.ctx);
        for op in issued {
            self.issue(op, now);
        }
        self.fetch_and_dispatch();
        self.ctx.advance();
    }

    fn acknowledge_drains(&mut self, now: u64) {
        while let Some(&(due, req)) = self.drains.front() {
            if due > now {
                break;
            }
            let _ = self.drains.pop_front();
            if let Err(cause) = self.memory.store(req.addr, req.size, req.data) {
                // Store addresses are probed at execute, so this is a model bug.
                warn!(rob = %req.rob, %cause, "store drain faulted");
            }
            self.core.store_drained(&mut self.ctx, req.slot);
        }
    }

    fn commit(&mut self) {
        let outcome = self.core.commit(&mut self.ctx);
        for entry in &outcome.retired {
            let Some(inflight) = self.inflight.remove(&entry.seq) else {
                continue;
            };
            let Origin::Trace(index) = inflight.origin else {
                warn!(rob = %entry.id, "wrong-path op committed");
                continue;
            };
            self.committed += 1;
            self.check_commit(index, inflight.load_value);
        }
        if let Some(redirect) = outcome.redirect {
            self.redirect(&redirect);
        }
    }

    fn check_commit(&mut self, index: usize, load_value: Option<u64>) {
        let Some(rec) = self.trace.ops.get(index) else {
            return;
        };
        match rec.kind {
            TraceOp::Store { addr, size, data, .. } => self.golden.poke(addr, size, data),
            TraceOp::Load {
                addr, size, signed, ..
            } => {
                let expected = size.extend(self.golden.peek(addr, size), signed);
                if load_value != Some(expected) {
                    self.ctx.stats.load_value_mismatches += 1;
                    warn!(
                        index,
                        pc = format_args!("{:#x}", rec.pc),
                        expected,
                        got = ?load_value,
                        "committed load disagrees with reference memory"
                    );
                }
            }
            TraceOp::Arith { .. } | TraceOp::Branch { .. } => {}
        }
    }

    fn redirect(&mut self, redirect: &Redirect) {
        let origin = self.inflight.get(&redirect.seq).map(|f| f.origin);
        let cutoff = match redirect.cause {
            FlushCause::Misprediction => redirect.seq.next(),
            FlushCause::Exception(_) | FlushCause::MemoryOrdering => redirect.seq,
        };
        self.inflight.retain(|&seq, _| seq < cutoff);
        self.fetch_buffer.clear();
        self.narrow_dispatch = false;

        match origin {
            Some(Origin::Trace(index)) => {
                if matches!(redirect.cause, FlushCause::Exception(_)) {
                    self.exceptions += 1;
                }
                self.frontend.redirect(redirect, index);
            }
            other => warn!(seq = %redirect.seq, origin = ?other, "redirect from unknown op"),
        }
        debug!(
            cycle = self.ctx.cycle,
            cause = ?redirect.cause,
            cursor = self.frontend.cursor(),
            "front end redirected"
        );
    }

    fn exec_kind(&self, origin: Origin) -> ExecKind {
        let Origin::Trace(index) = origin else {
            return ExecKind::Compute {
                value: 0,
                fault: None,
            };
        };
        let Some(rec) = self.trace.ops.get(index) else {
            return ExecKind::Compute {
                value: 0,
                fault: None,
            };
        };
        let fault = rec.fault;
        match rec.kind {
            TraceOp::Arith { result, .. } => ExecKind::Compute {
                value: result,
                fault,
            },
            TraceOp::Branch { taken, link, .. } => ExecKind::Branch {
                taken,
                next_pc: rec.next_pc(),
                link,
                fault,
            },
            TraceOp::Load { addr, size, signed } => ExecKind::Load {
                addr,
                size,
                signed,
                fault,
            },
            TraceOp::Store { addr, size, data } => ExecKind::Store {
                addr,
                size,
                data,
                fault,
            },
        }
    }

    fn issue(&mut self, op: Issued, now: u64) {
        let Some(inflight) = self.inflight.get(&op.seq) else {
            warn!(rob = %op.rob, seq = %op.seq, "issued op has no in-flight record");
            return;
        };
        debug_assert_eq!(inflight.rob, op.rob);
        let req = ExecRequest {
            rob: op.rob,
            seq: op.seq,
            class: op.class,
            dest: op.dest,
            kind: self.exec_kind(inflight.origin),
        };
        trace!(cycle = now, rob = %op.rob, class = op.class.label(), "issue");
        self.cluster.issue(req, now);
    }

    fn handle(&mut self, event: ExecEvent, now: u64) {
        match event {
            ExecEvent::Execute(req) => self.execute(req, now),
            ExecEvent::Writeback {
                rob,
                seq,
                dest,
                value,
            } => self.write_result(rob, seq, dest, value, true),
        }
    }

    fn write_result(
        &mut self,
        rob: RobId,
        seq: SeqNum,
        dest: Option<PhysReg>,
        value: u64,
        is_load: bool,
    ) {
        if !self.core.complete(&mut self.ctx, rob, seq) {
            return;
        }
        if let Some(d) = dest {
            self.regfile.write(d, value);
        }
        if is_load && let Some(f) = self.inflight.get_mut(&seq) {
            f.load_value = Some(value);
        }
    }

    fn execute(&mut self, req: ExecRequest, now: u64) {
        let ExecRequest { rob, seq, dest, .. } = req;
        match req.kind {
            ExecKind::Compute { fault: Some(cause), .. }
            | ExecKind::Branch { fault: Some(cause), .. } => {
                let _ = self.core.fault(&mut self.ctx, rob, seq, cause);
            }
            ExecKind::Compute { value, fault: None } => {
                self.write_result(rob, seq, dest, value, false);
            }
            ExecKind::Branch {
                taken,
                next_pc,
                link,
                fault: None,
            } => {
                if self
                    .core
                    .resolve_branch(&mut self.ctx, rob, seq, taken, next_pc)
                    .is_some()
                    && let Some(d) = dest
                {
                    self.regfile.write(d, link);
                }
            }
            ExecKind::Load {
                addr,
                size,
                signed,
                fault,
            } => {
                if let Some(cause) = fault.or(self.memory.probe(addr, size, false).err()) {
                    let _ = self.core.fault(&mut self.ctx, rob, seq, cause);
                    return;
                }
                match self.core.execute_load(&mut self.ctx, rob, seq, addr) {
                    LoadOutcome::Forwarded(value) => self.write_result(rob, seq, dest, value, true),
                    LoadOutcome::Memory => match self.memory.load(addr, size) {
                        Ok(raw) => self.cluster.writeback(
                            rob,
                            seq,
                            dest,
                            size.extend(raw, signed),
                            now,
                            self.config.memory.load_latency,
                        ),
                        Err(cause) => {
                            let _ = self.core.fault(&mut self.ctx, rob, seq, cause);
                        }
                    },
                    LoadOutcome::Wait(_) => self.cluster.retry(req, now),
                    LoadOutcome::Faulted(_) | LoadOutcome::Stale => {}
                }
            }
            ExecKind::Store {
                addr,
                size,
                data,
                fault,
            } => {
                if let Some(cause) = fault.or(self.memory.probe(addr, size, true).err()) {
                    let _ = self.core.fault(&mut self.ctx, rob, seq, cause);
                    return;
                }
                if self.core.store_address(&mut self.ctx, rob, seq, addr) {
                    let _ = self.core.store_data(&mut self.ctx, rob, seq, data);
                }
            }
        }
    }

    fn fetch_and_dispatch(&mut self) {
        if self.fetch_buffer.is_empty() {
            self.fetch_buffer = self
                .frontend
                .fetch(&self.trace, self.config.core.dispatch_width);
        }
        if self.fetch_buffer.is_empty() {
            return;
        }
        let take = if self.narrow_dispatch {
            1
        } else {
            self.fetch_buffer.len()
        };
        let ops: Vec<MicroOp> = self.fetch_buffer[..take].iter().map(|(op, _)| *op).collect();
        match self.core.dispatch(&mut self.ctx, &ops) {
            Ok(ids) => {
                for ((op, origin), rob) in self.fetch_buffer.drain(..take).zip(ids) {
                    let _ = self.inflight.insert(
                        op.seq,
                        InFlight {
                            origin,
                            rob,
                            load_value: None,
                        },
                    );
                }
                self.narrow_dispatch = false;
            }
            Err(reason) => {
                // A batch can need more of a structure than exists in total; once
                // the window is empty, fall back to one op at a time.
                if self.core.rob().is_empty() && take > 1 {
                    self.narrow_dispatch = true;
                }
                trace!(cycle = self.ctx.cycle, %reason, "dispatch stalled");
            }
        }
    }
}
