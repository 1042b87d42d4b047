//! Common types shared by every part of the core model.
//!
//! This module provides the fundamental building blocks:
//! 1. **Identifiers:** Opaque newtypes for every arena index (registers, ROB, queues).
//! 2. **Constants:** Structural limits that are not configurable.
//! 3. **Memory access:** Access sizes and byte-range helpers.
//! 4. **Error handling:** Exceptions, flush causes, stall reasons and setup errors.

/// Core-wide constants.
pub mod constants;

/// Memory access sizes and range helpers.
pub mod data;

/// Exceptions, flush causes, stall reasons, setup errors.
pub mod error;

/// Opaque index newtypes.
pub mod ids;

pub use data::AccessSize;
pub use error::{ConfigError, ExceptionCause, FlushCause, SimError, StallReason, TraceError};
pub use ids::{ArchReg, CheckpointId, LoadSlot, PhysReg, RobId, SchedSlot, SeqNum, StoreSlot};
