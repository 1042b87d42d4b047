//! Fluent construction of micro-op streams and small configurations.

use ooosim_core::common::{AccessSize, ArchReg, SeqNum};
use ooosim_core::config::Config;
use ooosim_core::core::{BranchInfo, MicroOp};

/// Hands out micro-ops with increasing sequence numbers and program counters.
#[derive(Debug, Default)]
pub struct OpStream {
    next: u64,
}

impl OpStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&mut self) -> (SeqNum, u64) {
        let seq = SeqNum(self.next);
        self.next += 1;
        (seq, seq.0 * 4)
    }

    /// ALU op writing `dest` from `srcs`.
    pub fn alu(&mut self, dest: Option<u16>, srcs: &[u16]) -> MicroOp {
        let (seq, pc) = self.stamp();
        let srcs: Vec<ArchReg> = srcs.iter().copied().map(ArchReg).collect();
        let op = MicroOp::alu(seq, pc).with_srcs(&srcs);
        match dest {
            Some(d) => op.with_dest(ArchReg(d)),
            None => op,
        }
    }

    /// `n` independent ALU ops without destinations.
    pub fn nops(&mut self, n: usize) -> Vec<MicroOp> {
        (0..n).map(|_| self.alu(None, &[])).collect()
    }

    /// Branch predicted not taken.
    pub fn branch(&mut self, checkpoint: bool) -> MicroOp {
        let (seq, pc) = self.stamp();
        MicroOp::branch(
            seq,
            pc,
            BranchInfo {
                predicted_taken: false,
                predicted_target: 0,
                checkpoint,
            },
        )
    }

    /// Load of `size` into `dest`.
    pub fn load(&mut self, dest: u16, size: AccessSize) -> MicroOp {
        let (seq, pc) = self.stamp();
        MicroOp::load(seq, pc, size, false).with_dest(ArchReg(dest))
    }

    /// Store of `size`.
    pub fn store(&mut self, size: AccessSize) -> MicroOp {
        let (seq, pc) = self.stamp();
        MicroOp::store(seq, pc, size)
    }
}

/// A small configuration that keeps every structure easy to fill.
pub fn small_config() -> Config {
    let mut config = Config::default();
    config.core.arch_regs = 8;
    config.core.phys_regs = 16;
    config.core.checkpoints = 2;
    config.core.rob_size = 16;
    config.core.dispatch_width = 4;
    config.core.commit_width = 4;
    config.core.scheduler_size = 8;
    config.core.issue_width = 4;
    config.core.age_bands = 4;
    config.core.load_queue_size = 4;
    config.core.store_queue_size = 4;
    config.core.drain_queue_size = 2;
    config
}
