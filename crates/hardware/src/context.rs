//! Explicit simulation context.
//!
//! The current cycle and the statistics counters are process-wide in spirit but are
//! carried as an explicit object, so several core instances can coexist and a run can
//! be reset without touching global state.

use crate::stats::SimStats;

/// Cycle counter and statistics threaded through every core operation.
#[derive(Debug, Clone, Default)]
pub struct SimContext {
    /// Current cycle number (starts at 0).
    pub cycle: u64,
    /// Counters accumulated since construction or the last [`SimContext::reset`].
    pub stats: SimStats,
}

impl SimContext {
    /// Creates a context at cycle 0 with zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context to cycle 0 and clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ends the current cycle.
    #[inline]
    pub fn advance(&mut self) {
        self.cycle += 1;
        self.stats.cycles = self.cycle;
    }
}
