//! Micro-op representation.
//!
//! A micro-op arrives from the front end already decoded, predicted and annotated.
//! Fields shared by every op live on [`MicroOp`]; everything class-specific lives in
//! the [`OpKind`] payload, so a load can never carry a branch target and a branch can
//! never carry an access size.

use serde::{Deserialize, Serialize};

use crate::common::constants::MAX_SRCS;
use crate::common::{AccessSize, ArchReg, SeqNum};

/// Functional-unit class; selects issue ports and execution latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuClass {
    /// Simple integer ALU.
    Alu,
    /// Integer multiplier.
    Mul,
    /// Integer divider.
    Div,
    /// Floating-point pipe.
    Fp,
    /// Branch resolution.
    Branch,
    /// Load address generation and memory read.
    Load,
    /// Store address/data generation.
    Store,
}

impl FuClass {
    /// Number of classes.
    pub const COUNT: usize = 7;

    /// Every class, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Alu,
        Self::Mul,
        Self::Div,
        Self::Fp,
        Self::Branch,
        Self::Load,
        Self::Store,
    ];

    /// Dense index for per-class tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in statistics output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Alu => "alu",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Fp => "fp",
            Self::Branch => "branch",
            Self::Load => "load",
            Self::Store => "store",
        }
    }

    /// Criticality assumed when the front end does not supply one.
    pub const fn default_criticality(self) -> Criticality {
        match self {
            Self::Branch => Criticality::Critical,
            Self::Load | Self::Div => Criticality::High,
            Self::Alu | Self::Mul | Self::Fp => Criticality::Normal,
            Self::Store => Criticality::Low,
        }
    }
}

/// Scheduling criticality class. Lower discriminant means higher priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Resolves control flow; issue first.
    Critical = 0,
    /// Long-latency or memory ops that gate many dependents.
    High = 1,
    /// Ordinary arithmetic.
    Normal = 2,
    /// Ops whose results nothing waits on soon.
    Low = 3,
}

impl Criticality {
    /// Dense index, 0 = highest priority.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Arithmetic unit selection for non-memory, non-branch ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithUnit {
    /// Simple integer ALU.
    #[default]
    Alu,
    /// Integer multiplier.
    Mul,
    /// Integer divider.
    Div,
    /// Floating-point pipe.
    Fp,
}

/// Prediction metadata supplied by the front end for a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Predicted direction.
    pub predicted_taken: bool,
    /// Predicted next pc.
    pub predicted_target: u64,
    /// Ask rename to snapshot its state after this branch.
    pub checkpoint: bool,
}

/// Memory access metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemInfo {
    /// Read `size` bytes, optionally sign-extending.
    Load {
        /// Access width.
        size: AccessSize,
        /// Sign-extend the loaded value.
        signed: bool,
    },
    /// Write `size` bytes.
    Store {
        /// Access width.
        size: AccessSize,
    },
}

impl MemInfo {
    /// Access width of the operation.
    pub const fn size(self) -> AccessSize {
        match self {
            Self::Load { size, .. } | Self::Store { size } => size,
        }
    }
}

/// Class-specific payload of a micro-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Register-to-register computation.
    Arith(ArithUnit),
    /// Conditional or indirect control transfer.
    Branch(BranchInfo),
    /// Load or store.
    Memory(MemInfo),
}

/// A decoded, predicted micro-op as delivered by the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MicroOp {
    /// Strictly increasing front-end sequence number.
    pub seq: SeqNum,
    /// Program counter.
    pub pc: u64,
    /// Architectural source registers.
    pub srcs: [Option<ArchReg>; MAX_SRCS],
    /// Architectural destination register.
    pub dest: Option<ArchReg>,
    /// Immediate operand, passed through to execution.
    pub imm: Option<i64>,
    /// Scheduling criticality override.
    pub criticality: Option<Criticality>,
    /// Class-specific payload.
    pub kind: OpKind,
}

impl MicroOp {
    fn with_kind(seq: SeqNum, pc: u64, kind: OpKind) -> Self {
        Self {
            seq,
            pc,
            srcs: [None; MAX_SRCS],
            dest: None,
            imm: None,
            criticality: None,
            kind,
        }
    }

    /// Arithmetic op on `unit`.
    pub fn arith(seq: SeqNum, pc: u64, unit: ArithUnit) -> Self {
        Self::with_kind(seq, pc, OpKind::Arith(unit))
    }

    /// Simple ALU op.
    pub fn alu(seq: SeqNum, pc: u64) -> Self {
        Self::arith(seq, pc, ArithUnit::Alu)
    }

    /// Branch with the given prediction.
    pub fn branch(seq: SeqNum, pc: u64, info: BranchInfo) -> Self {
        Self::with_kind(seq, pc, OpKind::Branch(info))
    }

    /// Load of `size` bytes.
    pub fn load(seq: SeqNum, pc: u64, size: AccessSize, signed: bool) -> Self {
        Self::with_kind(seq, pc, OpKind::Memory(MemInfo::Load { size, signed }))
    }

    /// Store of `size` bytes.
    pub fn store(seq: SeqNum, pc: u64, size: AccessSize) -> Self {
        Self::with_kind(seq, pc, OpKind::Memory(MemInfo::Store { size }))
    }

    /// Sets the source registers (at most [`MAX_SRCS`]; extra entries are ignored).
    #[must_use]
    pub fn with_srcs(mut self, srcs: &[ArchReg]) -> Self {
        debug_assert!(srcs.len() <= MAX_SRCS, "too many sources: {}", srcs.len());
        self.srcs = [None; MAX_SRCS];
        for (slot, &reg) in self.srcs.iter_mut().zip(srcs) {
            *slot = Some(reg);
        }
        self
    }

    /// Sets the destination register.
    #[must_use]
    pub const fn with_dest(mut self, dest: ArchReg) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Sets the immediate.
    #[must_use]
    pub const fn with_imm(mut self, imm: i64) -> Self {
        self.imm = Some(imm);
        self
    }

    /// Overrides the scheduling criticality.
    #[must_use]
    pub const fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = Some(criticality);
        self
    }

    /// Functional-unit class implied by the payload.
    pub const fn fu_class(&self) -> FuClass {
        match self.kind {
            OpKind::Arith(ArithUnit::Alu) => FuClass::Alu,
            OpKind::Arith(ArithUnit::Mul) => FuClass::Mul,
            OpKind::Arith(ArithUnit::Div) => FuClass::Div,
            OpKind::Arith(ArithUnit::Fp) => FuClass::Fp,
            OpKind::Branch(_) => FuClass::Branch,
            OpKind::Memory(MemInfo::Load { .. }) => FuClass::Load,
            OpKind::Memory(MemInfo::Store { .. }) => FuClass::Store,
        }
    }

    /// Effective criticality (override or class default).
    pub const fn effective_criticality(&self) -> Criticality {
        match self.criticality {
            Some(c) => c,
            None => self.fu_class().default_criticality(),
        }
    }

    /// Branch metadata, if this is a branch.
    pub const fn branch_info(&self) -> Option<BranchInfo> {
        match self.kind {
            OpKind::Branch(info) => Some(info),
            _ => None,
        }
    }

    /// Memory metadata, if this is a load or store.
    pub const fn mem_info(&self) -> Option<MemInfo> {
        match self.kind {
            OpKind::Memory(info) => Some(info),
            _ => None,
        }
    }

    /// True for loads.
    pub const fn is_load(&self) -> bool {
        matches!(self.kind, OpKind::Memory(MemInfo::Load { .. }))
    }

    /// True for stores.
    pub const fn is_store(&self) -> bool {
        matches!(self.kind, OpKind::Memory(MemInfo::Store { .. }))
    }

    /// True if the branch asks for a rename checkpoint.
    pub const fn wants_checkpoint(&self) -> bool {
        matches!(self.kind, OpKind::Branch(BranchInfo { checkpoint: true, .. }))
    }

    /// Iterator over the present source registers.
    pub fn sources(&self) -> impl Iterator<Item = ArchReg> + '_ {
        self.srcs.iter().flatten().copied()
    }
}
