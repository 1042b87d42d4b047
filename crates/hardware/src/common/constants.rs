//! Core-wide constants.
//!
//! Fixed structural limits that are not configurable because they are baked
//! into encodings or the priority bitmap geometry.

/// Maximum number of source operands per micro-op.
pub const MAX_SRCS: usize = 3;

/// Bits per word of the scheduler's priority bitmap.
pub const BITMAP_WORD_BITS: usize = 64;

/// Number of levels in the scheduler priority bitmap (groups, lanes, buckets).
pub const BITMAP_LEVELS: usize = 3;

/// Largest number of priority buckets the bitmap hierarchy can summarize.
pub const MAX_PRIORITY_BUCKETS: usize = BITMAP_WORD_BITS * BITMAP_WORD_BITS * BITMAP_WORD_BITS;

/// Number of criticality classes in the scheduler priority function.
pub const CRITICALITY_CLASSES: usize = 4;

/// Largest number of checkpoint slots (bounded by the `CheckpointId` width).
pub const MAX_CHECKPOINTS: usize = u8::MAX as usize;

/// Largest physical register pool (bounded by the `PhysReg` width).
pub const MAX_PHYS_REGS: usize = u16::MAX as usize;

/// Granule size in bytes used by the memory disambiguation table.
pub const MDU_GRANULE_BYTES: u64 = 8;
