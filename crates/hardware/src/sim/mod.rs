//! Trace-driven simulation around the out-of-order core.
//!
//! This module provides everything the core deliberately leaves out:
//! 1. **Trace:** JSON oracle traces of the correct-path instruction stream.
//! 2. **Front end:** Trace replay with wrong-path fetch and redirects.
//! 3. **Execution:** Latency pipelines, register values and the memory system.
//! 4. **Simulator:** The per-cycle driver and the sequential reference check.

/// Functional-unit latency pipelines.
pub mod exec;

/// Trace replay front end.
pub mod frontend;

/// Memory port and flat memory.
pub mod memory;

/// Physical register values.
pub mod regfile;

/// Per-cycle driver.
pub mod simulator;

/// Oracle trace format.
pub mod trace;

pub use memory::{FlatMemory, MemoryPort};
pub use simulator::{RunSummary, Simulator};
pub use trace::{Trace, TraceOp, TraceRecord};
