//! # Component and End-to-End Tests
//!
//! Tests that cross a component boundary or need the public API only.

/// Configuration parsing and validation.
pub mod config;

/// Dispatch, wakeup, commit and recovery through `OooCore`.
pub mod engine;

/// Store-to-load forwarding decisions.
pub mod lsq;

/// Rename batching, checkpoints and walk-back.
pub mod rename;

/// Priority bitmap and selection order.
pub mod scheduler;

/// Whole-trace simulation against the reference model.
pub mod sim;
