//! Rename checkpoints.
//!
//! A checkpoint is a full copy of the mapping table plus the free-list allocation
//! position, tagged with the ROB id of the branch that requested it. Slots are few
//! and fixed; a branch that cannot get one must wait at dispatch.

use serde::Serialize;

use super::free_list::FreeListPtr;
use crate::common::{CheckpointId, PhysReg, RobId};

/// Saved rename state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    /// Branch the snapshot was taken after.
    pub origin: RobId,
    /// Architectural to physical mapping at snapshot time.
    pub map: Vec<PhysReg>,
    /// Free-list allocation position at snapshot time.
    pub free_ptr: FreeListPtr,
}

/// Fixed set of checkpoint slots.
#[derive(Clone, Debug)]
pub struct CheckpointTable {
    slots: Vec<Option<Checkpoint>>,
}

impl CheckpointTable {
    /// Creates `count` empty slots.
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    /// Number of empty slots.
    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Number of live checkpoints.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free_slots()
    }

    /// Stores `checkpoint` in the lowest free slot.
    pub fn insert(&mut self, checkpoint: Checkpoint) -> Option<CheckpointId> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(checkpoint);
        Some(CheckpointId(idx as u8))
    }

    /// Looks up a live checkpoint. Panics on a stale handle.
    pub fn get(&self, id: CheckpointId) -> &Checkpoint {
        match self.slots.get(id.index()).and_then(Option::as_ref) {
            Some(cp) => cp,
            None => panic!("stale checkpoint handle {id}"),
        }
    }

    /// Returns true if `id` names a live checkpoint.
    pub fn is_live(&self, id: CheckpointId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }

    /// Frees a live slot. Panics on a stale handle.
    pub fn remove(&mut self, id: CheckpointId) -> Checkpoint {
        match self.slots.get_mut(id.index()).and_then(Option::take) {
            Some(cp) => cp,
            None => panic!("stale checkpoint handle {id}"),
        }
    }

    /// Frees every checkpoint whose origin is at or after `from`. Returns how many.
    pub fn invalidate_from(&mut self, from: RobId) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|cp| cp.origin >= from) {
                *slot = None;
                dropped += 1;
            }
        }
        dropped
    }

    /// Live checkpoint ids with their origins, oldest origin first.
    pub fn origins(&self) -> Vec<(CheckpointId, RobId)> {
        let mut live: Vec<_> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|cp| (CheckpointId(i as u8), cp.origin)))
            .collect();
        live.sort_by_key(|&(_, origin)| origin);
        live
    }
}
