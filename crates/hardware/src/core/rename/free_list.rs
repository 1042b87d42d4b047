//! Free list of physical registers.
//!
//! A ring with monotonically increasing head (allocation) and tail (release) counters.
//! Registers handed out since a given head position still occupy their ring slots,
//! so restoring a saved head returns exactly those registers to the pool while every
//! release performed in the meantime (which only moves the tail) is preserved.

use serde::Serialize;

use crate::common::PhysReg;

/// Saved allocation position of the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FreeListPtr(u64);

/// Ring of free physical registers.
#[derive(Clone, Debug)]
pub struct FreeList {
    ring: Vec<PhysReg>,
    head: u64,
    tail: u64,
}

impl FreeList {
    /// Creates a free list with room for `capacity` registers, initially holding `free`.
    pub fn new(capacity: usize, free: impl IntoIterator<Item = PhysReg>) -> Self {
        let mut ring = vec![PhysReg::default(); capacity];
        let mut tail = 0u64;
        for reg in free {
            ring[tail as usize % capacity] = reg;
            tail += 1;
        }
        assert!(tail as usize <= capacity, "free list overfilled");
        Self { ring, head: 0, tail }
    }

    /// Number of registers available for allocation.
    #[inline]
    pub const fn len(&self) -> usize {
        (self.tail - self.head) as usize
    }

    /// Returns true if no register is available.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    fn slot(&self, counter: u64) -> usize {
        (counter % self.ring.len() as u64) as usize
    }

    /// Takes the next free register.
    pub fn allocate(&mut self) -> Option<PhysReg> {
        if self.is_empty() {
            return None;
        }
        let reg = self.ring[self.slot(self.head)];
        self.head += 1;
        Some(reg)
    }

    /// Returns a register to the pool (commit-time reclamation).
    pub fn release(&mut self, reg: PhysReg) {
        assert!(
            self.len() < self.ring.len(),
            "free list overflow releasing {reg}"
        );
        let idx = self.slot(self.tail);
        self.ring[idx] = reg;
        self.tail += 1;
    }

    /// Undoes the most recent allocation of `reg`.
    ///
    /// Allocations must be undone youngest first; anything else is a protocol error.
    pub fn unallocate(&mut self, reg: PhysReg) {
        assert!(self.head > 0, "unallocate on a fresh free list");
        let idx = self.slot(self.head - 1);
        assert_eq!(
            self.ring[idx], reg,
            "walk-back out of order: {reg} is not the most recent allocation"
        );
        self.head -= 1;
    }

    /// Current allocation position.
    #[inline]
    pub const fn pointer(&self) -> FreeListPtr {
        FreeListPtr(self.head)
    }

    /// Rewinds the allocation position to `ptr`, returning the registers that were
    /// allocated after it (oldest first).
    pub fn restore(&mut self, ptr: FreeListPtr) -> Vec<PhysReg> {
        assert!(
            ptr.0 <= self.head && self.tail - ptr.0 <= self.ring.len() as u64,
            "free list pointer {} outside live window [{}, {}]",
            ptr.0,
            self.head,
            self.tail
        );
        let returned = (ptr.0..self.head).map(|c| self.ring[self.slot(c)]).collect();
        self.head = ptr.0;
        returned
    }

    /// Free registers in allocation order (for state comparison).
    pub fn contents(&self) -> Vec<PhysReg> {
        (self.head..self.tail).map(|c| self.ring[self.slot(c)]).collect()
    }

    /// Raw `(head, tail)` counters.
    pub const fn counters(&self) -> (u64, u64) {
        (self.head, self.tail)
    }
}
