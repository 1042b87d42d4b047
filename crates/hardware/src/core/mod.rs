//! Out-of-order execution core.
//!
//! This module contains the four speculative structures and the engine that binds
//! them into one synchronous cycle step.

/// Cycle-step glue: dispatch, wakeup, memory, commit and recovery.
pub mod engine;

/// Load/store queue and memory disambiguation.
pub mod lsq;

/// Register renaming, free list and checkpoints.
pub mod rename;

/// Reorder buffer.
pub mod rob;

/// Priority-bucket instruction scheduler.
pub mod scheduler;

/// Micro-op representation.
pub mod uop;

pub use self::engine::{CommitOutcome, CoreSnapshot, LoadOutcome, OooCore, Redirect};
pub use self::uop::{ArithUnit, BranchInfo, Criticality, FuClass, MemInfo, MicroOp, OpKind};
