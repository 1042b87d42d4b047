//! Core harness: an `OooCore` plus the context it is driven with.

use ooosim_core::common::{RobId, SeqNum};
use ooosim_core::config::Config;
use ooosim_core::context::SimContext;
use ooosim_core::core::scheduler::Issued;
use ooosim_core::core::{CommitOutcome, MicroOp, OooCore};

use super::builder::OpStream;

#[derive(Debug)]
pub struct CoreHarness {
    pub core: OooCore,
    pub ctx: SimContext,
    pub ops: OpStream,
}

impl CoreHarness {
    pub fn new(config: &Config) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("off")
            .try_init();
        Self {
            core: OooCore::new(config),
            ctx: SimContext::new(),
            ops: OpStream::new(),
        }
    }

    /// Dispatches a batch that is expected to fit.
    pub fn dispatch(&mut self, batch: &[MicroOp]) -> Vec<RobId> {
        match self.core.dispatch(&mut self.ctx, batch) {
            Ok(ids) => ids,
            Err(reason) => panic!("dispatch stalled: {reason}"),
        }
    }

    /// Sequence number currently held by `id`.
    pub fn seq(&self, id: RobId) -> SeqNum {
        match self.core.rob().entry(id) {
            Some(e) => e.seq,
            None => panic!("{id} is not live"),
        }
    }

    /// Starts a cycle and selects everything ready.
    pub fn cycle_select(&mut self) -> Vec<Issued> {
        self.core.begin_cycle(&mut self.ctx);
        let issued = self.core.select(&mut self.ctx);
        self.ctx.advance();
        issued
    }

    /// Selects until nothing is waiting; every waiting op must be ready.
    pub fn drain_scheduler(&mut self) -> Vec<Issued> {
        let mut all = Vec::new();
        while !self.core.scheduler().is_empty() || self.core.retry_len() > 0 {
            let issued = self.cycle_select();
            assert!(!issued.is_empty(), "scheduler holds ops that never become ready");
            all.extend(issued);
        }
        all
    }

    /// Completes `id` successfully.
    pub fn complete(&mut self, id: RobId) {
        let seq = self.seq(id);
        assert!(self.core.complete(&mut self.ctx, id, seq), "{id} rejected completion");
    }

    /// Resolves branch `id` with the given direction; returns whether it mispredicted.
    pub fn resolve(&mut self, id: RobId, taken: bool, next_pc: u64) -> bool {
        let seq = self.seq(id);
        match self.core.resolve_branch(&mut self.ctx, id, seq, taken, next_pc) {
            Some(m) => m,
            None => panic!("{id} is not a live branch"),
        }
    }

    pub fn commit(&mut self) -> CommitOutcome {
        self.core.commit(&mut self.ctx)
    }

    /// Pushes `n` independent ops through dispatch, completion and commit so the
    /// next allocation starts at ROB id `n`.
    pub fn retire_nops(&mut self, n: usize) {
        let mut left = n;
        while left > 0 {
            let take = left.min(4);
            let batch = self.ops.nops(take);
            let ids = self.dispatch(&batch);
            self.drain_scheduler();
            for id in ids {
                self.complete(id);
            }
            let retired = self.commit().retired.len();
            assert_eq!(retired, take);
            left -= take;
        }
    }
}
