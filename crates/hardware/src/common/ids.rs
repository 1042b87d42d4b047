//! Opaque index types.
//!
//! Every cross-reference inside the core is a small integer into a fixed-capacity
//! arena. Each arena gets its own newtype so that:
//! 1. **Type Safety:** A checkpoint slot can never be passed where a ROB id is expected.
//! 2. **Ordering:** Program-order ids (`RobId`, `SeqNum`) compare by age.
//! 3. **Serialization:** Ids appear as bare integers in traces and state dumps.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wraps a raw index value.
            #[inline(always)]
            pub const fn new(val: $inner) -> Self {
                Self(val)
            }

            /// Returns the raw index value.
            #[inline(always)]
            pub const fn val(self) -> $inner {
                self.0
            }

            /// Returns the raw value as a `usize` suitable for slice indexing.
            #[inline(always)]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_type!(
    /// Architectural register index as named by the instruction stream.
    ArchReg(u16),
    "r"
);

index_type!(
    /// Physical register tag: an index into the rename pool.
    PhysReg(u16),
    "p"
);

index_type!(
    /// Reorder buffer id. Ids are handed out in program order, so a smaller id
    /// is always older than a larger one among live entries.
    RobId(u64),
    "rob#"
);

index_type!(
    /// Front-end sequence number, strictly increasing and never reused.
    SeqNum(u64),
    "seq#"
);

index_type!(
    /// Handle of a rename checkpoint slot.
    CheckpointId(u8),
    "ckpt#"
);

index_type!(
    /// Slot in the scheduler entry arena.
    SchedSlot(u32),
    "iq#"
);

index_type!(
    /// Slot in the load queue.
    LoadSlot(u32),
    "lq#"
);

index_type!(
    /// Slot in the store queue.
    StoreSlot(u32),
    "sq#"
);

impl RobId {
    /// The id allocated immediately after this one.
    #[inline(always)]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if `self` is strictly older than `other` in program order.
    #[inline(always)]
    pub const fn is_older_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl SeqNum {
    /// The sequence number that follows this one.
    #[inline(always)]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
