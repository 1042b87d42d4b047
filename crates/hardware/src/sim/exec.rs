//! Fixed-latency execution cluster.
//!
//! Issued ops wait here for their unit latency and then come back to the
//! simulator as [`ExecEvent::Execute`]. Loads that need a memory access come back a
//! second time as [`ExecEvent::Writeback`] after the memory latency. Nothing here
//! knows about flushes; stale events are filtered by the core's sequence check.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::common::{AccessSize, ExceptionCause, PhysReg, RobId, SeqNum};
use crate::config::UnitsConfig;
use crate::core::uop::FuClass;

/// What an op does when its latency expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecKind {
    /// Register result, or a fault.
    Compute {
        /// Result value.
        value: u64,
        /// Exception raised instead of producing a value.
        fault: Option<ExceptionCause>,
    },
    /// Branch outcome.
    Branch {
        /// Actual direction.
        taken: bool,
        /// Actual next pc.
        next_pc: u64,
        /// Link value for the destination.
        link: u64,
        /// Exception raised instead of resolving.
        fault: Option<ExceptionCause>,
    },
    /// Address generation done; the load now consults the LSQ.
    Load {
        /// Effective address.
        addr: u64,
        /// Access width.
        size: AccessSize,
        /// Sign-extend.
        signed: bool,
        /// Exception raised by the op itself.
        fault: Option<ExceptionCause>,
    },
    /// Address and data resolved.
    Store {
        /// Effective address.
        addr: u64,
        /// Access width.
        size: AccessSize,
        /// Data.
        data: u64,
        /// Exception raised by the op itself.
        fault: Option<ExceptionCause>,
    },
}

/// An op in flight through an execution unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecRequest {
    /// ROB entry.
    pub rob: RobId,
    /// Sequence number, used to reject stale results.
    pub seq: SeqNum,
    /// Unit class.
    pub class: FuClass,
    /// Destination tag.
    pub dest: Option<PhysReg>,
    /// Behavior.
    pub kind: ExecKind,
}

/// Something the simulator must act on this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecEvent {
    /// Unit latency expired.
    Execute(ExecRequest),
    /// A load's memory access returned `value`.
    Writeback {
        /// ROB entry.
        rob: RobId,
        /// Sequence number.
        seq: SeqNum,
        /// Destination tag.
        dest: Option<PhysReg>,
        /// Loaded value.
        value: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    ready_at: u64,
    order: u64,
}

/// Latency pipelines for every functional-unit class.
#[derive(Clone, Debug)]
pub struct ExecutionCluster {
    latency: [u64; FuClass::COUNT],
    queue: BinaryHeap<Reverse<(Slot, usize)>>,
    events: Vec<Option<ExecEvent>>,
    order: u64,
}

impl ExecutionCluster {
    /// Builds the cluster from per-class unit latencies.
    pub fn new(units: &UnitsConfig) -> Self {
        let latency = FuClass::ALL.map(|c| units.get(c).latency.max(1));
        Self {
            latency,
            queue: BinaryHeap::new(),
            events: Vec::new(),
            order: 0,
        }
    }

    /// Number of events still pending.
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    fn schedule(&mut self, at: u64, event: ExecEvent) {
        let idx = match self.events.iter().position(Option::is_none) {
            Some(i) => {
                self.events[i] = Some(event);
                i
            }
            None => {
                self.events.push(Some(event));
                self.events.len() - 1
            }
        };
        let slot = Slot {
            ready_at: at,
            order: self.order,
        };
        self.order += 1;
        self.queue.push(Reverse((slot, idx)));
    }

    /// Starts `req` on its unit at cycle `now`.
    pub fn issue(&mut self, req: ExecRequest, now: u64) {
        let at = now + self.latency[req.class.index()];
        self.schedule(at, ExecEvent::Execute(req));
    }

    /// Re-presents a load that had to wait, one cycle later.
    pub fn retry(&mut self, req: ExecRequest, now: u64) {
        self.schedule(now + 1, ExecEvent::Execute(req));
    }

    /// Delivers a load value after `latency` cycles.
    pub fn writeback(
        &mut self,
        rob: RobId,
        seq: SeqNum,
        dest: Option<PhysReg>,
        value: u64,
        now: u64,
        latency: u64,
    ) {
        self.schedule(
            now + latency.max(1),
            ExecEvent::Writeback {
                rob,
                seq,
                dest,
                value,
            },
        );
    }

    /// Removes and returns every event due at or before `now`, in issue order.
    pub fn due(&mut self, now: u64) -> Vec<ExecEvent> {
        let mut out = Vec::new();
        while let Some(&Reverse((slot, idx))) = self.queue.peek() {
            if slot.ready_at > now {
                break;
            }
            let _ = self.queue.pop();
            if let Some(ev) = self.events[idx].take() {
                out.push(ev);
            }
        }
        out
    }
}
