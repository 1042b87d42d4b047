//! Physical register bookkeeping.
//!
//! Values live in the external register file; the pool only tracks whether a
//! register holds its final value and which instruction owns it. Ownership is
//! what keeps a late completion from a squashed instruction from marking a
//! recycled register ready.

use serde::Serialize;

use crate::common::{PhysReg, SeqNum};

/// State of one physical register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PhysRegState {
    /// Register is mapped or in flight (not on the free list).
    pub allocated: bool,
    /// Value has been written.
    pub ready: bool,
    /// Instruction that will write the register; `None` for architectural initial values.
    pub owner: Option<SeqNum>,
}

/// Per-register ready/owner table.
#[derive(Clone, Debug)]
pub struct RegisterPool {
    regs: Vec<PhysRegState>,
}

impl RegisterPool {
    /// Creates a pool of `count` registers where the first `mapped` hold committed values.
    pub fn new(count: usize, mapped: usize) -> Self {
        let regs = (0..count)
            .map(|i| PhysRegState {
                allocated: i < mapped,
                ready: i < mapped,
                owner: None,
            })
            .collect();
        Self { regs }
    }

    /// Number of registers in the pool.
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// Returns true for a zero-sized pool.
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// State of `reg`.
    #[inline]
    pub fn get(&self, reg: PhysReg) -> PhysRegState {
        self.regs[reg.index()]
    }

    /// True once `reg` holds its value.
    #[inline]
    pub fn is_ready(&self, reg: PhysReg) -> bool {
        self.regs[reg.index()].ready
    }

    /// Hands `reg` to a new writer; it is not ready until that writer completes.
    pub fn claim(&mut self, reg: PhysReg, owner: SeqNum) {
        let state = &mut self.regs[reg.index()];
        assert!(!state.allocated, "{reg} claimed while still allocated");
        *state = PhysRegState {
            allocated: true,
            ready: false,
            owner: Some(owner),
        };
    }

    /// Marks `reg` ready if `writer` still owns it. Returns whether it was marked.
    pub fn mark_ready(&mut self, reg: PhysReg, writer: SeqNum) -> bool {
        let state = &mut self.regs[reg.index()];
        if state.allocated && state.owner == Some(writer) {
            state.ready = true;
            true
        } else {
            false
        }
    }

    /// Returns `reg` to the unallocated state.
    pub fn release(&mut self, reg: PhysReg) {
        let state = &mut self.regs[reg.index()];
        assert!(state.allocated, "{reg} released twice");
        *state = PhysRegState::default();
    }
}
