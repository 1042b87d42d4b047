//! Error, fault and stall definitions.
//!
//! No component throws across an interface: every operation reports an explicit
//! outcome. This module defines the vocabulary for those outcomes:
//! 1. **Exceptions:** Architectural faults raised by execution or the memory system.
//! 2. **Flush causes:** Why speculative state was discarded.
//! 3. **Stalls:** Resource exhaustion; always recoverable by retrying next cycle.
//! 4. **Setup errors:** Rejected configurations and malformed traces.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Architectural exception raised by an instruction.
///
/// Exceptions are recorded in the ROB when they occur and acted upon only when the
/// faulting instruction reaches the commit point, which is what makes them precise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCause {
    /// Undefined or unimplemented operation.
    #[error("illegal instruction")]
    IllegalInstruction,
    /// Breakpoint trap.
    #[error("breakpoint")]
    Breakpoint,
    /// Environment call into the supervisor.
    #[error("environment call")]
    EnvironmentCall,
    /// Integer divide by zero or overflow when trapping arithmetic is enabled.
    #[error("arithmetic fault")]
    ArithmeticFault,
    /// Load address not aligned to its access size.
    #[error("load address misaligned ({0:#x})")]
    LoadMisaligned(u64),
    /// Load touched unmapped or protected memory.
    #[error("load access fault ({0:#x})")]
    LoadAccessFault(u64),
    /// Load translation failed.
    #[error("load page fault ({0:#x})")]
    LoadPageFault(u64),
    /// Store address not aligned to its access size.
    #[error("store address misaligned ({0:#x})")]
    StoreMisaligned(u64),
    /// Store touched unmapped or protected memory.
    #[error("store access fault ({0:#x})")]
    StoreAccessFault(u64),
    /// Store translation failed.
    #[error("store page fault ({0:#x})")]
    StorePageFault(u64),
}

/// Reason a flush was triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushCause {
    /// A branch resolved differently from its prediction.
    Misprediction,
    /// An instruction faulted and reached the commit point.
    Exception(ExceptionCause),
    /// A load read memory before an older overlapping store's address was known.
    MemoryOrdering,
}

/// Resource exhaustion that prevented an operation from making progress.
///
/// A stall never changes state; the caller simply retries on a later cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum StallReason {
    /// Batch is wider than the dispatch width.
    #[error("batch exceeds dispatch width")]
    DispatchWidth,
    /// Not enough free reorder buffer slots for the batch.
    #[error("reorder buffer full")]
    RobFull,
    /// Not enough free physical registers for the batch's destinations.
    #[error("no free physical registers")]
    NoFreeRegisters,
    /// Every checkpoint slot holds a live snapshot.
    #[error("no free checkpoint slot")]
    NoCheckpointSlot,
    /// Scheduler has no free entry.
    #[error("scheduler full")]
    SchedulerFull,
    /// Load queue has no free slot.
    #[error("load queue full")]
    LoadQueueFull,
    /// Store queue has no free slot.
    #[error("store queue full")]
    StoreQueueFull,
    /// A committing store found the drain queue full.
    #[error("store drain queue full")]
    DrainQueueFull,
}

impl StallReason {
    /// All stall reasons, in reporting order.
    pub const ALL: [Self; 8] = [
        Self::DispatchWidth,
        Self::RobFull,
        Self::NoFreeRegisters,
        Self::NoCheckpointSlot,
        Self::SchedulerFull,
        Self::LoadQueueFull,
        Self::StoreQueueFull,
        Self::DrainQueueFull,
    ];

    /// Dense index for per-reason counters.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short, stable identifier used in statistics output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::DispatchWidth => "dispatch_width",
            Self::RobFull => "rob_full",
            Self::NoFreeRegisters => "no_free_regs",
            Self::NoCheckpointSlot => "no_checkpoint",
            Self::SchedulerFull => "scheduler_full",
            Self::LoadQueueFull => "lq_full",
            Self::StoreQueueFull => "sq_full",
            Self::DrainQueueFull => "drain_queue_full",
        }
    }
}

/// Invalid simulator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A structure was configured with zero capacity.
    #[error("`{0}` must be greater than zero")]
    ZeroCapacity(&'static str),
    /// The physical register pool cannot hold every architectural register plus one.
    #[error("physical registers ({phys}) must exceed architectural registers ({arch})")]
    TooFewPhysRegs {
        /// Configured physical register count.
        phys: usize,
        /// Configured architectural register count.
        arch: usize,
    },
    /// A value exceeds what the index types or bitmap hierarchy can address.
    #[error("`{field}` = {value} exceeds the supported maximum of {max}")]
    TooLarge {
        /// Offending field.
        field: &'static str,
        /// Configured value.
        value: usize,
        /// Largest supported value.
        max: usize,
    },
    /// No functional-unit class has an issue port.
    #[error("at least one functional unit class needs an issue port")]
    NoIssuePorts,
    /// Configuration file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    /// Configuration file is not valid JSON for [`crate::config::Config`].
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure to load or validate a micro-op trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Trace file could not be read.
    #[error("cannot read trace: {0}")]
    Io(#[from] io::Error),
    /// Trace is not valid JSON.
    #[error("cannot parse trace: {0}")]
    Parse(#[from] serde_json::Error),
    /// An op names a register outside the architectural register file.
    #[error("op {index}: register r{reg} is out of range (arch regs = {arch_regs})")]
    RegisterOutOfRange {
        /// Position of the op in the trace.
        index: usize,
        /// Offending register number.
        reg: u16,
        /// Configured architectural register count.
        arch_regs: usize,
    },
    /// An op lists more source operands than the core supports.
    #[error("op {index}: {count} sources given, at most {max} supported")]
    TooManySources {
        /// Position of the op in the trace.
        index: usize,
        /// Number of sources given.
        count: usize,
        /// Maximum supported.
        max: usize,
    },
    /// A non-faulting access runs past the top of the address space.
    #[error("op {index}: access at {addr:#x} runs past the top of the address space")]
    AddressOverflow {
        /// Position of the op in the trace.
        index: usize,
        /// Start address.
        addr: u64,
    },
    /// An initial memory image entry runs past the top of the address space.
    #[error("memory image entry {index} at {addr:#x} runs past the top of the address space")]
    ImageOverflow {
        /// Position of the entry in the image.
        index: usize,
        /// Start address.
        addr: u64,
    },
}

/// Failure to set up a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Unusable trace.
    #[error(transparent)]
    Trace(#[from] TraceError),
}
