//! Trace-driven front end.
//!
//! Replays the oracle trace in program order, stamping each op with a fresh
//! sequence number. After fetching a branch whose prediction is wrong it keeps
//! fetching down the predicted path, emitting filler ALU ops that have no trace
//! record, until the core redirects it.

use tracing::trace;

use super::trace::{INST_BYTES, Trace};
use crate::common::{ArchReg, FlushCause, SeqNum};
use crate::core::engine::Redirect;
use crate::core::uop::MicroOp;

/// Where a fetched op came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Trace record index.
    Trace(usize),
    /// Filler fetched down a mispredicted path.
    WrongPath,
}

/// Program-order op source.
#[derive(Clone, Debug)]
pub struct Frontend {
    cursor: usize,
    next_seq: SeqNum,
    wrong_path_pc: Option<u64>,
    arch_regs: u16,
}

impl Frontend {
    /// Starts at the first trace record.
    pub fn new(arch_regs: usize) -> Self {
        Self {
            cursor: 0,
            next_seq: SeqNum(0),
            wrong_path_pc: None,
            arch_regs: u16::try_from(arch_regs).unwrap_or(u16::MAX),
        }
    }

    /// Next trace record to fetch.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// True while fetching down a mispredicted path.
    pub const fn on_wrong_path(&self) -> bool {
        self.wrong_path_pc.is_some()
    }

    /// True once every trace record has been fetched and no wrong path is active.
    pub fn exhausted(&self, trace: &Trace) -> bool {
        self.wrong_path_pc.is_none() && self.cursor >= trace.len()
    }

    fn take_seq(&mut self) -> SeqNum {
        let seq = self.next_seq;
        self.next_seq = seq.next();
        seq
    }

    fn filler(&mut self, pc: u64) -> MicroOp {
        let seq = self.take_seq();
        let span = u64::from(self.arch_regs.max(2) - 1);
        let dest = ArchReg((seq.0 % span) as u16 + 1);
        let src = ArchReg(((seq.0 + 1) % span) as u16 + 1);
        MicroOp::alu(seq, pc).with_srcs(&[src]).with_dest(dest)
    }

    /// Fetches up to `width` ops.
    pub fn fetch(&mut self, trace: &Trace, width: usize) -> Vec<(MicroOp, Origin)> {
        let mut out = Vec::with_capacity(width);
        while out.len() < width {
            if let Some(pc) = self.wrong_path_pc {
                out.push((self.filler(pc), Origin::WrongPath));
                self.wrong_path_pc = Some(pc + INST_BYTES);
                continue;
            }
            let Some(rec) = trace.ops.get(self.cursor) else {
                break;
            };
            let index = self.cursor;
            let op = rec.to_micro_op(self.take_seq());
            self.cursor += 1;
            if rec.mispredicts() {
                self.wrong_path_pc = Some(rec.predicted_next_pc());
            }
            out.push((op, Origin::Trace(index)));
        }
        out
    }

    /// Resumes fetch after recovery. `index` is the trace record of the instruction
    /// the recovery was triggered by.
    ///
    /// Mispredictions resume after the branch, ordering violations re-fetch the
    /// load, and exceptions are treated as handled with the faulting op skipped.
    pub fn redirect(&mut self, redirect: &Redirect, index: usize) {
        self.wrong_path_pc = None;
        self.cursor = match redirect.cause {
            FlushCause::Misprediction | FlushCause::Exception(_) => index + 1,
            FlushCause::MemoryOrdering => index,
        };
        trace!(cursor = self.cursor, cause = ?redirect.cause, "frontend redirect");
    }
}
