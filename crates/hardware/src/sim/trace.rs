//! Oracle micro-op traces.
//!
//! A trace lists the correct-path instruction stream as JSON. Every record carries
//! what the front end would predict and what execution actually produces, so the
//! simulator can drive the core without an ISA model:
//!
//! ```json
//! {
//!   "memory": [{ "addr": 4096, "size": "double", "value": 7 }],
//!   "ops": [
//!     { "pc": 0, "op": "arith", "unit": "alu", "dest": 1, "result": 5 },
//!     { "pc": 4, "op": "store", "srcs": [1], "addr": 4096, "size": "word", "data": 5 },
//!     { "pc": 8, "op": "load", "dest": 2, "addr": 4096, "size": "word" },
//!     { "pc": 12, "op": "branch", "srcs": [2], "taken": true, "target": 64,
//!       "predicted_taken": false, "checkpoint": true }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::constants::MAX_SRCS;
use crate::common::{AccessSize, ArchReg, ExceptionCause, SeqNum, TraceError};
use crate::core::uop::{ArithUnit, BranchInfo, Criticality, MicroOp};

/// Size of every instruction, used for fall-through addresses.
pub const INST_BYTES: u64 = 4;

/// Class-specific part of a trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceOp {
    /// Register computation producing `result`.
    Arith {
        /// Unit the op executes on.
        #[serde(default)]
        unit: ArithUnit,
        /// Value written to the destination.
        #[serde(default)]
        result: u64,
    },
    /// Control transfer with its prediction.
    Branch {
        /// Actual direction.
        taken: bool,
        /// Actual target when taken.
        #[serde(default)]
        target: u64,
        /// Predicted direction.
        #[serde(default)]
        predicted_taken: bool,
        /// Predicted target when predicted taken.
        #[serde(default)]
        predicted_target: u64,
        /// Request a rename checkpoint.
        #[serde(default)]
        checkpoint: bool,
        /// Link value written to the destination, if any.
        #[serde(default)]
        link: u64,
    },
    /// Memory read.
    Load {
        /// Effective address.
        addr: u64,
        /// Access width.
        #[serde(default)]
        size: AccessSize,
        /// Sign-extend the loaded value.
        #[serde(default)]
        signed: bool,
    },
    /// Memory write.
    Store {
        /// Effective address.
        addr: u64,
        /// Access width.
        #[serde(default)]
        size: AccessSize,
        /// Data written.
        data: u64,
    },
}

/// One correct-path instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Program counter.
    pub pc: u64,
    /// Architectural sources.
    #[serde(default)]
    pub srcs: Vec<u16>,
    /// Architectural destination.
    #[serde(default)]
    pub dest: Option<u16>,
    /// Immediate operand.
    #[serde(default)]
    pub imm: Option<i64>,
    /// Scheduling criticality override.
    #[serde(default)]
    pub criticality: Option<Criticality>,
    /// Exception raised when the op executes.
    #[serde(default)]
    pub fault: Option<ExceptionCause>,
    /// Class-specific payload.
    #[serde(flatten)]
    pub kind: TraceOp,
}

impl TraceRecord {
    /// Address of the next correct-path instruction.
    pub const fn next_pc(&self) -> u64 {
        match self.kind {
            TraceOp::Branch {
                taken: true,
                target,
                ..
            } => target,
            _ => self.pc + INST_BYTES,
        }
    }

    /// True if the front end's prediction for this op is wrong.
    pub const fn mispredicts(&self) -> bool {
        match self.kind {
            TraceOp::Branch {
                taken,
                target,
                predicted_taken,
                predicted_target,
                ..
            } => taken != predicted_taken || (taken && target != predicted_target),
            _ => false,
        }
    }

    /// Address the front end will fetch from after this op.
    pub const fn predicted_next_pc(&self) -> u64 {
        match self.kind {
            TraceOp::Branch {
                predicted_taken: true,
                predicted_target,
                ..
            } => predicted_target,
            _ => self.pc + INST_BYTES,
        }
    }

    /// Builds the micro-op the front end delivers for this record.
    pub fn to_micro_op(&self, seq: SeqNum) -> MicroOp {
        let srcs: Vec<ArchReg> = self.srcs.iter().copied().map(ArchReg).collect();
        let mut op = match self.kind {
            TraceOp::Arith { unit, .. } => MicroOp::arith(seq, self.pc, unit),
            TraceOp::Branch {
                predicted_taken,
                predicted_target,
                checkpoint,
                ..
            } => MicroOp::branch(
                seq,
                self.pc,
                BranchInfo {
                    predicted_taken,
                    predicted_target,
                    checkpoint,
                },
            ),
            TraceOp::Load { size, signed, .. } => MicroOp::load(seq, self.pc, size, signed),
            TraceOp::Store { size, .. } => MicroOp::store(seq, self.pc, size),
        }
        .with_srcs(&srcs);
        if let Some(d) = self.dest {
            op = op.with_dest(ArchReg(d));
        }
        if let Some(imm) = self.imm {
            op = op.with_imm(imm);
        }
        if let Some(c) = self.criticality {
            op = op.with_criticality(c);
        }
        op
    }
}

/// Initial memory contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInit {
    /// Start address.
    pub addr: u64,
    /// Width of `value`.
    #[serde(default)]
    pub size: AccessSize,
    /// Little-endian value.
    pub value: u64,
}

/// A complete oracle trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Memory image applied before the run.
    #[serde(default)]
    pub memory: Vec<MemoryInit>,
    /// Correct-path instructions in program order.
    pub ops: Vec<TraceRecord>,
}

impl Trace {
    /// Parses a trace from JSON text.
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a trace file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks every record against the core's register file shape and the
    /// address space.
    pub fn validate(&self, arch_regs: usize) -> Result<(), TraceError> {
        if let Some((index, init)) = self
            .memory
            .iter()
            .enumerate()
            .find(|(_, m)| m.size.end(m.addr).is_none())
        {
            return Err(TraceError::ImageOverflow {
                index,
                addr: init.addr,
            });
        }
        for (index, rec) in self.ops.iter().enumerate() {
            if let TraceOp::Load { addr, size, .. } | TraceOp::Store { addr, size, .. } = rec.kind
                && rec.fault.is_none()
                && size.end(addr).is_none()
            {
                return Err(TraceError::AddressOverflow { index, addr });
            }
            if rec.srcs.len() > MAX_SRCS {
                return Err(TraceError::TooManySources {
                    index,
                    count: rec.srcs.len(),
                    max: MAX_SRCS,
                });
            }
            let out_of_range = rec
                .srcs
                .iter()
                .chain(rec.dest.iter())
                .find(|&&r| usize::from(r) >= arch_regs);
            if let Some(&reg) = out_of_range {
                return Err(TraceError::RegisterOutOfRange {
                    index,
                    reg,
                    arch_regs,
                });
            }
        }
        Ok(())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if there are no records.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::uop::FuClass;

    const SAMPLE: &str = r#"{
        "memory": [{ "addr": 4096, "size": "double", "value": 7 }],
        "ops": [
            { "pc": 0, "op": "arith", "unit": "mul", "srcs": [1, 2], "dest": 3, "result": 5 },
            { "pc": 4, "op": "load", "dest": 4, "addr": 4096, "size": "word", "signed": true },
            { "pc": 8, "op": "store", "srcs": [4, 3], "addr": 4100, "data": 9 },
            { "pc": 12, "op": "branch", "taken": true, "target": 64, "checkpoint": true }
        ]
    }"#;

    #[test]
    fn parses_all_op_kinds() {
        let t = Trace::from_json(SAMPLE).unwrap();
        assert_eq!(t.len(), 4);
        assert_eq!(t.memory[0].value, 7);
        assert!(matches!(t.ops[0].kind, TraceOp::Arith { unit: ArithUnit::Mul, result: 5 }));
        assert!(matches!(
            t.ops[2].kind,
            TraceOp::Store { size: AccessSize::Double, .. }
        ));
        t.validate(32).unwrap();
    }

    #[test]
    fn branch_prediction_helpers() {
        let t = Trace::from_json(SAMPLE).unwrap();
        let br = &t.ops[3];
        assert!(br.mispredicts());
        assert_eq!(br.next_pc(), 64);
        assert_eq!(br.predicted_next_pc(), 16);
        assert!(!t.ops[0].mispredicts());
    }

    #[test]
    fn micro_op_conversion() {
        let t = Trace::from_json(SAMPLE).unwrap();
        let op = t.ops[1].to_micro_op(SeqNum(9));
        assert_eq!(op.seq, SeqNum(9));
        assert_eq!(op.fu_class(), FuClass::Load);
        assert_eq!(op.dest, Some(ArchReg(4)));
        assert!(t.ops[3].to_micro_op(SeqNum(1)).wants_checkpoint());
    }

    #[test]
    fn validate_rejects_bad_registers() {
        let t = Trace::from_json(SAMPLE).unwrap();
        assert!(matches!(
            t.validate(4),
            Err(TraceError::RegisterOutOfRange { index: 1, reg: 4, .. })
        ));
        let bad = Trace::from_json(r#"{"ops":[{"pc":0,"op":"arith","srcs":[1,2,3,4]}]}"#).unwrap();
        assert!(matches!(bad.validate(32), Err(TraceError::TooManySources { count: 4, .. })));
    }

    #[test]
    fn validate_rejects_accesses_past_the_address_space() {
        let store = r#"{"ops":[
            {"pc":0,"op":"arith","dest":1},
            {"pc":4,"op":"store","addr":18446744073709551612,"data":1}
        ]}"#;
        let t = Trace::from_json(store).unwrap();
        assert!(matches!(
            t.validate(32),
            Err(TraceError::AddressOverflow { index: 1, addr: 0xFFFF_FFFF_FFFF_FFFC })
        ));

        let faulting = r#"{"ops":[
            {"pc":0,"op":"load","dest":1,"addr":18446744073709551612,"fault":{"load_access_fault":18446744073709551612}}
        ]}"#;
        assert!(Trace::from_json(faulting).unwrap().validate(32).is_ok());

        let image = r#"{"memory":[{"addr":18446744073709551615,"size":"half","value":1}],"ops":[]}"#;
        assert!(matches!(
            Trace::from_json(image).unwrap().validate(32),
            Err(TraceError::ImageOverflow { index: 0, .. })
        ));
    }
}
