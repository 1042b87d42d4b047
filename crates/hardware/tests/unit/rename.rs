//! Rename Unit Tests.
//!
//! Checkpoint restore and youngest-first walk-back must both rebuild the exact
//! mapping table and free list that existed at the recovery point, and replaying
//! the discarded renames from there must reproduce the pre-recovery state.

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use ooosim_core::common::constants::MAX_SRCS;
use ooosim_core::common::{ArchReg, RobId, SeqNum, StallReason};
use ooosim_core::core::rename::{RenameRequest, RenameUnit};

const ARCH: u16 = 8;

fn request(dest: Option<u16>, srcs: &[u16], owner: u64) -> RenameRequest {
    let mut s = [None; MAX_SRCS];
    for (slot, &r) in s.iter_mut().zip(srcs) {
        *slot = Some(ArchReg(r));
    }
    RenameRequest {
        srcs: s,
        dest: dest.map(ArchReg),
        owner: SeqNum(owner),
        checkpoint: None,
    }
}

fn op_strategy() -> impl Strategy<Value = (Option<u16>, Vec<u16>)> {
    (
        proptest::option::of(0..ARCH),
        proptest::collection::vec(0..ARCH, 0..=MAX_SRCS),
    )
}

#[test]
fn batch_larger_than_free_list_allocates_nothing() {
    let mut unit = RenameUnit::new(8, 13, 2);
    let filler: Vec<_> = (0..3).map(|i| request(Some(i), &[], u64::from(i))).collect();
    let held = unit.rename(&filler).expect("three registers are free");
    assert_eq!(unit.free_registers(), 2);

    let batch: Vec<_> = (0..5).map(|i| request(Some(i), &[], 10 + u64::from(i))).collect();
    let before = unit.state();
    assert_eq!(unit.rename(&batch), Err(StallReason::NoFreeRegisters));
    assert_eq!(unit.state(), before);

    for op in &held {
        if let Some(d) = op.dest {
            unit.reclaim(d.old);
        }
    }
    let renamed = unit.rename(&batch).expect("reclaimed registers cover the batch");
    assert!(renamed.iter().all(|op| op.dest.is_some()));
    assert_eq!(unit.free_registers(), 0);
}

#[test]
fn sources_see_earlier_destinations_in_the_batch() {
    let mut unit = RenameUnit::new(8, 16, 2);
    let ops = unit
        .rename(&[request(Some(3), &[3], 0), request(Some(4), &[3], 1)])
        .expect("fits");
    let first = ops[0].dest.expect("writes r3");
    assert_eq!(ops[0].srcs[0].map(|t| t.preg), Some(first.old));
    assert_eq!(ops[1].srcs[0].map(|t| t.preg), Some(first.new));
    assert_eq!(ops[1].srcs[0].map(|t| t.ready), Some(false));
}

#[test]
fn checkpoint_slots_are_all_or_nothing() {
    let mut unit = RenameUnit::new(8, 16, 1);
    let mut a = request(None, &[], 0);
    a.checkpoint = Some(RobId(0));
    let mut b = request(None, &[], 1);
    b.checkpoint = Some(RobId(1));
    let before = unit.state();
    assert_eq!(unit.rename(&[a, b]), Err(StallReason::NoCheckpointSlot));
    assert_eq!(unit.state(), before);
    assert_eq!(unit.free_checkpoints(), 1);
}

proptest! {
    #[test]
    fn restore_and_walk_back_replay_identically(
        prefix in proptest::collection::vec(op_strategy(), 0..6),
        suffix in proptest::collection::vec(op_strategy(), 0..10),
    ) {
        let mut unit = RenameUnit::new(usize::from(ARCH), 24, 4);
        let mut seq = 0u64;
        let mut next = |dest: Option<u16>, srcs: &[u16]| {
            seq += 1;
            request(dest, srcs, seq)
        };
        let prefix: Vec<_> = prefix.iter().map(|(d, s)| next(*d, s)).collect();
        let suffix: Vec<_> = suffix.iter().map(|(d, s)| next(*d, s)).collect();

        let _ = unit.rename(&prefix).expect("prefix fits");
        let cp = unit
            .create_checkpoint(RobId(prefix.len() as u64))
            .expect("slot free");
        let at_checkpoint = unit.state();

        let renamed = unit.rename(&suffix).expect("suffix fits");
        let after_suffix = unit.state();
        let mut restored = unit.clone();
        let mut walked = unit;

        restored.restore_checkpoint(cp);
        for op in renamed.iter().rev() {
            if let Some(d) = op.dest {
                walked.rollback(d);
            }
        }

        prop_assert_eq!(restored.state(), at_checkpoint.clone());
        prop_assert_eq!(walked.state(), at_checkpoint);
        prop_assert!(restored.checkpoint_is_live(cp));

        // Replaying the same renames lands on the same registers and counters.
        for unit in [&mut restored, &mut walked] {
            let replayed = unit.rename(&suffix).expect("suffix fits again");
            prop_assert_eq!(&replayed, &renamed);
            prop_assert_eq!(unit.state(), after_suffix.clone());
        }
    }
}
