//! Out-of-order core model.
//!
//! This crate models the speculative bookkeeping of an out-of-order processor core:
//! 1. **Rename:** Register alias table, physical register free list and branch checkpoints.
//! 2. **Reorder buffer:** In-order commit, precise exceptions and recovery points.
//! 3. **Scheduler:** Wakeup and constant-time priority select over a hierarchical bitmap.
//! 4. **Memory ordering:** Load/store queues, store-to-load forwarding and a
//!    disambiguation filter.
//! 5. **Simulation:** A trace-driven driver with a sequential reference check, plus
//!    configuration and statistics.

/// Identifiers, constants, access sizes and error types.
pub mod common;
/// Simulator configuration (defaults, structures, validation).
pub mod config;
/// Cycle counter and statistics threaded through the core.
pub mod context;
/// The out-of-order core (rename, ROB, scheduler, LSQ, engine).
pub mod core;
/// Trace-driven simulation around the core.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Explicit cycle and statistics context.
pub use crate::context::SimContext;
/// The out-of-order engine.
pub use crate::core::OooCore;
/// Trace-driven simulator.
pub use crate::sim::Simulator;
