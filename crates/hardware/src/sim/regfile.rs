//! Physical register values.
//!
//! The core tracks only readiness and ownership of physical registers; the values
//! live here, written when an instruction completes and read by tag.

use crate::common::PhysReg;

/// Value storage indexed by physical register tag.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    values: Vec<u64>,
}

impl RegisterFile {
    /// Creates a zeroed register file with `count` entries.
    pub fn new(count: usize) -> Self {
        Self {
            values: vec![0; count],
        }
    }

    /// Reads by tag.
    #[inline]
    pub fn read(&self, reg: PhysReg) -> u64 {
        self.values[reg.index()]
    }

    /// Writes by tag.
    #[inline]
    pub fn write(&mut self, reg: PhysReg, value: u64) {
        self.values[reg.index()] = value;
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the file has no registers.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
