//! Memory access sizes.
//!
//! Loads and stores move 1, 2, 4 or 8 bytes. This module provides the size
//! enum plus the byte-range helpers the load/store queue builds on:
//! 1. **Masking:** Truncating a 64-bit value to the access width.
//! 2. **Sign extension:** Widening a loaded value back to 64 bits.
//! 3. **Overlap:** The half-open range test shared by forwarding and disambiguation.

use serde::{Deserialize, Serialize};

/// Width of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSize {
    /// 1 byte.
    Byte,
    /// 2 bytes.
    Half,
    /// 4 bytes.
    Word,
    /// 8 bytes.
    #[default]
    Double,
}

impl AccessSize {
    /// Number of bytes moved by this access.
    #[inline]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }

    /// Exclusive end of an access starting at `addr`, or `None` if that end is not
    /// representable. The byte at `u64::MAX` is therefore never addressable.
    #[inline]
    pub const fn end(self, addr: u64) -> Option<u64> {
        addr.checked_add(self.bytes())
    }

    /// Bit mask covering the low `bytes()` bytes of a value.
    #[inline]
    pub const fn mask(self) -> u64 {
        match self {
            Self::Double => u64::MAX,
            _ => (1u64 << (self.bytes() * 8)) - 1,
        }
    }

    /// Truncates `value` to this width, optionally sign-extending the result.
    pub const fn extend(self, value: u64, signed: bool) -> u64 {
        let truncated = value & self.mask();
        if !signed || matches!(self, Self::Double) {
            return truncated;
        }
        let shift = 64 - self.bytes() * 8;
        (((truncated << shift) as i64) >> shift) as u64
    }
}

/// Returns true if `[start_a, end_a)` and `[start_b, end_b)` share at least one byte.
#[inline]
pub const fn ranges_overlap(start_a: u64, end_a: u64, start_b: u64, end_b: u64) -> bool {
    start_a < end_b && start_b < end_a
}

/// Returns true if `[outer_start, outer_end)` fully contains `[inner_start, inner_end)`.
#[inline]
pub const fn range_covers(outer_start: u64, outer_end: u64, inner_start: u64, inner_end: u64) -> bool {
    outer_start <= inner_start && inner_end <= outer_end
}
