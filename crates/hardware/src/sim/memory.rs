//! Memory system collaborator.
//!
//! The core never touches memory directly. Loads that are not forwarded read
//! through a [`MemoryPort`], and committed stores are written through it when they
//! drain. [`FlatMemory`] is a sparse byte store with configurable faulting ranges.

use std::collections::HashMap;

use crate::common::{AccessSize, ExceptionCause};

/// Load and store-drain requests to the memory system.
pub trait MemoryPort {
    /// Checks that an access would succeed without performing it.
    fn probe(&self, addr: u64, size: AccessSize, is_store: bool) -> Result<(), ExceptionCause>;

    /// Reads `size` bytes at `addr`, zero-extended.
    fn load(&mut self, addr: u64, size: AccessSize) -> Result<u64, ExceptionCause>;

    /// Writes the low `size` bytes of `data` at `addr`.
    fn store(&mut self, addr: u64, size: AccessSize, data: u64) -> Result<(), ExceptionCause>;
}

/// Sparse little-endian byte memory.
#[derive(Clone, Debug, Default)]
pub struct FlatMemory {
    bytes: HashMap<u64, u8>,
    faults: Vec<(u64, u64)>,
}

impl FlatMemory {
    /// Creates an empty memory where every address is accessible.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty memory that faults on every `[start, end)` range given.
    pub fn with_faults(faults: impl IntoIterator<Item = (u64, u64)>) -> Self {
        Self {
            bytes: HashMap::new(),
            faults: faults.into_iter().collect(),
        }
    }

    fn faults_at(&self, addr: u64, size: AccessSize) -> bool {
        let Some(end) = size.end(addr) else {
            return true;
        };
        self.faults
            .iter()
            .any(|&(s, e)| crate::common::data::ranges_overlap(addr, end, s, e))
    }

    /// Writes without fault checks (used to load initial images).
    pub fn poke(&mut self, addr: u64, size: AccessSize, data: u64) {
        for i in 0..size.bytes() {
            let _ = self.bytes.insert(addr.wrapping_add(i), (data >> (i * 8)) as u8);
        }
    }

    /// Reads without fault checks.
    pub fn peek(&self, addr: u64, size: AccessSize) -> u64 {
        (0..size.bytes()).fold(0u64, |acc, i| {
            let b = self.bytes.get(&addr.wrapping_add(i)).copied().unwrap_or(0);
            acc | (u64::from(b) << (i * 8))
        })
    }

    /// Addresses whose byte differs between `self` and `other`, sorted.
    pub fn diff(&self, other: &Self) -> Vec<u64> {
        let byte = |m: &Self, a: u64| m.bytes.get(&a).copied().unwrap_or(0);
        let mut addrs: Vec<u64> = self
            .bytes
            .keys()
            .chain(other.bytes.keys())
            .copied()
            .filter(|&a| byte(self, a) != byte(other, a))
            .collect();
        addrs.sort_unstable();
        addrs.dedup();
        addrs
    }
}

impl MemoryPort for FlatMemory {
    fn probe(&self, addr: u64, size: AccessSize, is_store: bool) -> Result<(), ExceptionCause> {
        if !self.faults_at(addr, size) {
            Ok(())
        } else if is_store {
            Err(ExceptionCause::StoreAccessFault(addr))
        } else {
            Err(ExceptionCause::LoadAccessFault(addr))
        }
    }

    fn load(&mut self, addr: u64, size: AccessSize) -> Result<u64, ExceptionCause> {
        self.probe(addr, size, false)?;
        Ok(self.peek(addr, size))
    }

    fn store(&mut self, addr: u64, size: AccessSize, data: u64) -> Result<(), ExceptionCause> {
        self.probe(addr, size, true)?;
        self.poke(addr, size, data);
        Ok(())
    }
}
