//! Out-of-order instruction scheduler with O(1) selection.
//!
//! Waiting instructions are binned into priority buckets indexed
//! `criticality * age_bands + band`. The band is a function of absolute program
//! order (`rob / band_width % age_bands`), so an entry never changes bucket as the
//! ROB head advances. Selection walks each class's bands starting from the head's
//! band and wrapping, which visits in-flight entries oldest band first. The band
//! width is chosen so that a full ROB window never wraps back into the head's band.
//! It provides:
//! 1. **Insert:** Per-entry acceptance; entries that do not fit are handed back.
//! 2. **Wakeup:** A linear scan over waiting entries per broadcast tag.
//! 3. **Select:** Rotated leading-zero lookup of the best bucket with ready entries, a
//!    scan of that bucket for an entry whose unit class still has a free port,
//!    and deactivation of the bucket for the rest of the cycle if none qualifies.
//! 4. **Flush:** Removal of every entry at or after a program-order cut line.
//!
//! Buckets are intrusive doubly-linked lists threaded through the entry arena, so
//! insertion order is the final tie-break within a bucket.

/// Three-level summary bitmap.
pub mod bitmap;

use serde::Serialize;
use tracing::trace;

use self::bitmap::PriorityBitmap;
use crate::common::constants::{CRITICALITY_CLASSES, MAX_SRCS};
use crate::common::{PhysReg, RobId, SchedSlot, SeqNum};
use crate::core::rename::SourceTag;
use crate::core::uop::{Criticality, FuClass};

/// Scheduler geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerParams {
    /// Entry capacity.
    pub capacity: usize,
    /// Maximum ops selected per cycle.
    pub issue_width: usize,
    /// Age bands per criticality class.
    pub age_bands: usize,
    /// ROB capacity, used to size the age bands.
    pub rob_capacity: usize,
    /// Issue ports per functional-unit class.
    pub ports: [usize; FuClass::COUNT],
}

/// An instruction presented for insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedRequest {
    /// Owning ROB entry.
    pub rob: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Functional-unit class.
    pub class: FuClass,
    /// Criticality class.
    pub criticality: Criticality,
    /// Renamed sources with readiness evaluated by the caller.
    pub srcs: [Option<SourceTag>; MAX_SRCS],
    /// Destination tag.
    pub dest: Option<PhysReg>,
}

/// A waiting instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SchedEntry {
    /// Owning ROB entry.
    pub rob: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Functional-unit class.
    pub class: FuClass,
    /// Source tags.
    pub srcs: [Option<PhysReg>; MAX_SRCS],
    /// Bit `i` set while source `i` is still pending.
    pub pending: u8,
    /// Destination tag.
    pub dest: Option<PhysReg>,
    /// Priority bucket.
    pub bucket: u32,
    #[serde(skip)]
    prev: Option<SchedSlot>,
    #[serde(skip)]
    next: Option<SchedSlot>,
}

impl SchedEntry {
    /// True once every source is available.
    #[inline]
    pub const fn is_ready(&self) -> bool {
        self.pending == 0
    }
}

/// An instruction leaving the scheduler for execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Issued {
    /// Owning ROB entry.
    pub rob: RobId,
    /// Front-end sequence number.
    pub seq: SeqNum,
    /// Functional-unit class.
    pub class: FuClass,
    /// Source tags, all ready.
    pub srcs: [Option<PhysReg>; MAX_SRCS],
    /// Destination tag.
    pub dest: Option<PhysReg>,
    /// Bucket it was selected from.
    pub bucket: u32,
}

/// Result of a batch insert.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Accepted entries and their slots.
    pub accepted: Vec<(RobId, SchedSlot)>,
    /// Entries that did not fit, in their original order.
    pub rejected: Vec<SchedRequest>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Bucket {
    head: Option<SchedSlot>,
    tail: Option<SchedSlot>,
    len: u32,
    ready: u32,
}

/// The instruction scheduler.
#[derive(Clone, Debug)]
pub struct Scheduler {
    slots: Vec<Option<SchedEntry>>,
    free: Vec<SchedSlot>,
    buckets: Vec<Bucket>,
    active: PriorityBitmap,
    band_width: u64,
    masked: Vec<usize>,
    params: SchedulerParams,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new(params: SchedulerParams) -> Self {
        assert!(params.capacity > 0, "scheduler capacity must be non-zero");
        assert!(params.age_bands > 0, "need at least one age band");
        let buckets = CRITICALITY_CLASSES * params.age_bands;
        let window = params.rob_capacity.max(1) as u64;
        let band_width = match params.age_bands as u64 {
            1 => window,
            bands => (window - 1).div_ceil(bands - 1).max(1),
        };
        Self {
            slots: vec![None; params.capacity],
            free: (0..params.capacity as u32).rev().map(SchedSlot).collect(),
            buckets: vec![Bucket::default(); buckets],
            active: PriorityBitmap::new(buckets),
            band_width,
            masked: Vec::with_capacity(buckets),
            params,
        }
    }

    /// Entry capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    /// Number of priority buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of waiting entries with every source ready.
    pub fn ready_count(&self) -> usize {
        self.buckets.iter().map(|b| b.ready as usize).sum()
    }

    /// Returns true if bucket `b` holds at least one ready entry.
    pub fn is_bucket_active(&self, b: usize) -> bool {
        self.active.is_set(b)
    }

    /// Looks up a waiting entry.
    pub fn entry(&self, slot: SchedSlot) -> Option<&SchedEntry> {
        self.slots.get(slot.index()).and_then(Option::as_ref)
    }

    /// Waiting entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &SchedEntry> + '_ {
        self.slots.iter().flatten()
    }

    /// Age band of ROB id `rob`.
    pub fn band_of(&self, rob: RobId) -> usize {
        ((rob.0 / self.band_width) % self.params.age_bands as u64) as usize
    }

    /// Priority bucket for an instruction of `criticality` at ROB id `rob`.
    pub fn bucket_for(&self, criticality: Criticality, rob: RobId) -> usize {
        criticality.index() * self.params.age_bands + self.band_of(rob)
    }

    /// Inserts each request that fits; the rest are returned for the next cycle.
    pub fn insert(&mut self, batch: &[SchedRequest]) -> InsertOutcome {
        let mut out = InsertOutcome::default();
        for req in batch {
            let Some(slot) = self.free.pop() else {
                out.rejected.push(*req);
                continue;
            };
            let bucket = self.bucket_for(req.criticality, req.rob);
            let mut pending = 0u8;
            for (i, src) in req.srcs.iter().enumerate() {
                if src.is_some_and(|s| !s.ready) {
                    pending |= 1 << i;
                }
            }
            let entry = SchedEntry {
                rob: req.rob,
                seq: req.seq,
                class: req.class,
                srcs: req.srcs.map(|s| s.map(|t| t.preg)),
                pending,
                dest: req.dest,
                bucket: bucket as u32,
                prev: None,
                next: None,
            };
            self.link(slot, entry);
            trace!(rob = %req.rob, %slot, bucket, ready = pending == 0, "sched insert");
            out.accepted.push((req.rob, slot));
        }
        out
    }

    fn link(&mut self, slot: SchedSlot, mut entry: SchedEntry) {
        let b = entry.bucket as usize;
        let bucket = &mut self.buckets[b];
        entry.prev = bucket.tail;
        entry.next = None;
        match bucket.tail {
            Some(t) => {
                if let Some(prev) = self.slots[t.index()].as_mut() {
                    prev.next = Some(slot);
                }
            }
            None => bucket.head = Some(slot),
        }
        bucket.tail = Some(slot);
        bucket.len += 1;
        if entry.is_ready() {
            bucket.ready += 1;
            self.active.set(b);
        }
        self.slots[slot.index()] = Some(entry);
    }

    fn unlink(&mut self, slot: SchedSlot) -> SchedEntry {
        let entry = match self.slots[slot.index()].take() {
            Some(e) => e,
            None => panic!("unlink of empty scheduler slot {slot}"),
        };
        let b = entry.bucket as usize;
        match entry.prev {
            Some(p) => {
                if let Some(prev) = self.slots[p.index()].as_mut() {
                    prev.next = entry.next;
                }
            }
            None => self.buckets[b].head = entry.next,
        }
        match entry.next {
            Some(n) => {
                if let Some(next) = self.slots[n.index()].as_mut() {
                    next.prev = entry.prev;
                }
            }
            None => self.buckets[b].tail = entry.prev,
        }
        let bucket = &mut self.buckets[b];
        bucket.len -= 1;
        if entry.is_ready() {
            bucket.ready -= 1;
            if bucket.ready == 0 {
                self.active.clear(b);
            }
        }
        self.free.push(slot);
        entry
    }

    /// Clears pending operand bits matching `tags`; returns how many entries became ready.
    pub fn wakeup(&mut self, tags: &[PhysReg]) -> usize {
        let mut woken = 0;
        for &tag in tags {
            for entry in self.slots.iter_mut().flatten() {
                if entry.pending == 0 {
                    continue;
                }
                for (i, src) in entry.srcs.iter().enumerate() {
                    if *src == Some(tag) {
                        entry.pending &= !(1 << i);
                    }
                }
                if entry.pending == 0 {
                    let b = entry.bucket as usize;
                    self.buckets[b].ready += 1;
                    self.active.set(b);
                    woken += 1;
                }
            }
        }
        woken
    }

    /// Highest-priority active bucket when the oldest in-flight op is in band
    /// `head_band`.
    fn best_bucket(&self, head_band: usize) -> Option<usize> {
        if self.active.is_empty() {
            return None;
        }
        if head_band == 0 {
            return self.active.first();
        }
        let bands = self.params.age_bands;
        (0..CRITICALITY_CLASSES).find_map(|class| {
            let base = class * bands;
            self.active
                .first_from(base + head_band)
                .filter(|&b| b < base + bands)
                .or_else(|| self.active.first_from(base).filter(|&b| b < base + head_band))
        })
    }

    /// Selects up to `issue_width` ready entries in priority order, respecting
    /// per-class port limits. `rob_head` is the oldest in-flight ROB id.
    pub fn select(&mut self, rob_head: RobId) -> Vec<Issued> {
        let head_band = self.band_of(rob_head);
        let mut ports = self.params.ports;
        let mut issued = Vec::with_capacity(self.params.issue_width);
        self.masked.clear();
        while issued.len() < self.params.issue_width {
            let Some(b) = self.best_bucket(head_band) else {
                break;
            };
            let mut cursor = self.buckets[b].head;
            let mut pick = None;
            while let Some(slot) = cursor {
                let Some(entry) = self.slots[slot.index()].as_ref() else {
                    break;
                };
                if entry.is_ready() && ports[entry.class.index()] > 0 {
                    pick = Some(slot);
                    break;
                }
                cursor = entry.next;
            }
            let Some(slot) = pick else {
                // Hidden for the rest of this cycle, restored below.
                self.active.clear(b);
                self.masked.push(b);
                continue;
            };
            let entry = self.unlink(slot);
            ports[entry.class.index()] -= 1;
            trace!(rob = %entry.rob, class = entry.class.label(), bucket = b, "sched issue");
            issued.push(Issued {
                rob: entry.rob,
                seq: entry.seq,
                class: entry.class,
                srcs: entry.srcs,
                dest: entry.dest,
                bucket: entry.bucket,
            });
        }
        for &b in &self.masked {
            if self.buckets[b].ready > 0 {
                self.active.set(b);
            }
        }
        issued
    }

    /// Removes every entry whose ROB id is at or after `from`; returns how many.
    pub fn flush(&mut self, from: RobId) -> usize {
        let victims: Vec<SchedSlot> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                Some(e) if e.rob >= from => Some(SchedSlot(i as u32)),
                _ => None,
            })
            .collect();
        for &slot in &victims {
            let _ = self.unlink(slot);
        }
        victims.len()
    }
}
