//! Three-level priority bitmap.
//!
//! Bucket `b` lives in lane `b / 64` at bit `b % 64`; lane `l` lives in group
//! `l / 64` at bit `l % 64`; a single root word summarizes the groups. Bit `i` of a
//! word is stored at position `63 - i`, so `leading_zeros` yields the lowest set
//! index, which is the highest priority.

use crate::common::constants::{BITMAP_WORD_BITS, MAX_PRIORITY_BUCKETS};

const W: usize = BITMAP_WORD_BITS;

#[inline(always)]
const fn bit(i: usize) -> u64 {
    1u64 << (W - 1 - i)
}

/// Mask of indices strictly after `i` within one word.
#[inline(always)]
const fn after(i: usize) -> u64 {
    match u64::MAX.checked_shr(i as u32 + 1) {
        Some(m) => m,
        None => 0,
    }
}

/// Multi-level summary of non-empty priority buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorityBitmap {
    root: u64,
    groups: Vec<u64>,
    lanes: Vec<u64>,
    buckets: usize,
}

impl PriorityBitmap {
    /// Creates an all-clear bitmap over `buckets` buckets.
    pub fn new(buckets: usize) -> Self {
        assert!(
            buckets > 0 && buckets <= MAX_PRIORITY_BUCKETS,
            "bucket count {buckets} outside 1..={MAX_PRIORITY_BUCKETS}"
        );
        let lanes = buckets.div_ceil(W);
        let groups = lanes.div_ceil(W);
        Self {
            root: 0,
            groups: vec![0; groups],
            lanes: vec![0; lanes],
            buckets,
        }
    }

    /// Number of buckets covered.
    pub const fn len(&self) -> usize {
        self.buckets
    }

    /// True if no bucket is set.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.root == 0
    }

    /// Returns true if bucket `b` is set.
    #[inline]
    pub fn is_set(&self, b: usize) -> bool {
        self.lanes[b / W] & bit(b % W) != 0
    }

    /// Marks bucket `b` non-empty.
    #[inline]
    pub fn set(&mut self, b: usize) {
        debug_assert!(b < self.buckets);
        let lane = b / W;
        let group = lane / W;
        self.lanes[lane] |= bit(b % W);
        self.groups[group] |= bit(lane % W);
        self.root |= bit(group);
    }

    /// Marks bucket `b` empty, clearing summary bits that no longer cover anything.
    #[inline]
    pub fn clear(&mut self, b: usize) {
        let lane = b / W;
        let group = lane / W;
        self.lanes[lane] &= !bit(b % W);
        if self.lanes[lane] == 0 {
            self.groups[group] &= !bit(lane % W);
            if self.groups[group] == 0 {
                self.root &= !bit(group);
            }
        }
    }

    /// Highest-priority (lowest index) set bucket, in three leading-zero counts.
    #[inline]
    pub fn first(&self) -> Option<usize> {
        if self.root == 0 {
            return None;
        }
        let group = self.root.leading_zeros() as usize;
        let lane = group * W + self.groups[group].leading_zeros() as usize;
        Some(lane * W + self.lanes[lane].leading_zeros() as usize)
    }

    /// Lowest set bucket at or after `start`, in at most three masked
    /// leading-zero counts plus one descent.
    pub fn first_from(&self, start: usize) -> Option<usize> {
        if start >= self.buckets {
            return None;
        }
        let lane = start / W;
        let word = self.lanes[lane] & (u64::MAX >> (start % W));
        if word != 0 {
            return Some(lane * W + word.leading_zeros() as usize);
        }
        let group = lane / W;
        let later_lanes = self.groups[group] & after(lane % W);
        if later_lanes != 0 {
            return Some(self.descend_lane(group * W + later_lanes.leading_zeros() as usize));
        }
        let later_groups = self.root & after(group);
        if later_groups == 0 {
            return None;
        }
        let g = later_groups.leading_zeros() as usize;
        Some(self.descend_lane(g * W + self.groups[g].leading_zeros() as usize))
    }

    #[inline]
    fn descend_lane(&self, lane: usize) -> usize {
        lane * W + self.lanes[lane].leading_zeros() as usize
    }

    /// Clears every bucket.
    pub fn clear_all(&mut self) {
        self.root = 0;
        self.groups.fill(0);
        self.lanes.fill(0);
    }
}
