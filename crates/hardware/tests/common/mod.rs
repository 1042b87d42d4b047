//! Shared test infrastructure.

/// Micro-op and configuration builders.
pub mod builder;

/// Core harness.
pub mod harness;
