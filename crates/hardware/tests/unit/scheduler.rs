//! Scheduler Tests.
//!
//! The summary bitmap must always report the lowest set bucket, and the
//! scheduler must select strictly by criticality before age, wherever the ROB
//! head happens to be.

use std::collections::BTreeSet;

use proptest::prelude::*;

use ooosim_core::common::{RobId, SeqNum};
use ooosim_core::core::scheduler::bitmap::PriorityBitmap;
use ooosim_core::core::scheduler::{SchedRequest, Scheduler, SchedulerParams};
use ooosim_core::core::{Criticality, FuClass};

const BUCKETS: usize = 64 * 64 * 3;

proptest! {
    #[test]
    fn bitmap_first_matches_lowest_set_bucket(
        ops in proptest::collection::vec((any::<bool>(), 0..BUCKETS), 1..200)
    ) {
        let mut bitmap = PriorityBitmap::new(BUCKETS);
        let mut model = BTreeSet::new();
        for (set, b) in ops {
            if set {
                bitmap.set(b);
                let _ = model.insert(b);
            } else {
                bitmap.clear(b);
                let _ = model.remove(&b);
            }
            prop_assert_eq!(bitmap.first(), model.iter().next().copied());
        }
    }

    #[test]
    fn bitmap_first_from_matches_model(
        set in proptest::collection::btree_set(0..BUCKETS, 0..64),
        start in 0..BUCKETS,
    ) {
        let mut bitmap = PriorityBitmap::new(BUCKETS);
        for &b in &set {
            bitmap.set(b);
        }
        prop_assert_eq!(bitmap.first_from(start), set.range(start..).next().copied());
    }

    #[test]
    fn same_class_issues_oldest_first_for_any_head(
        head in 0u64..10_000,
        offsets in proptest::collection::btree_set(0u64..64, 1..32),
    ) {
        let mut sched = Scheduler::new(params());
        for &off in &offsets {
            let outcome = sched.insert(&[request(head + off, FuClass::Alu, Criticality::Normal)]);
            prop_assert!(outcome.rejected.is_empty());
        }
        let order: Vec<u64> =
            std::iter::from_fn(|| sched.select(RobId(head)).first().map(|i| i.rob.0 - head)).collect();
        prop_assert_eq!(order, offsets.into_iter().collect::<Vec<_>>());
    }
}

fn params() -> SchedulerParams {
    SchedulerParams {
        capacity: 64,
        issue_width: 1,
        age_bands: 8,
        rob_capacity: 64,
        ports: [1; FuClass::COUNT],
    }
}

fn request(rob: u64, class: FuClass, criticality: Criticality) -> SchedRequest {
    SchedRequest {
        rob: RobId(rob),
        seq: SeqNum(rob),
        class,
        criticality,
        srcs: [None; 3],
        dest: None,
    }
}

#[test]
fn selection_drains_in_priority_order() {
    let mut sched = Scheduler::new(params());
    let batch = [
        request(40, FuClass::Alu, Criticality::Normal),
        request(2, FuClass::Store, Criticality::Low),
        request(30, FuClass::Branch, Criticality::Critical),
        request(1, FuClass::Alu, Criticality::Normal),
        request(50, FuClass::Load, Criticality::High),
    ];
    let outcome = sched.insert(&batch);
    assert!(outcome.rejected.is_empty());

    let order: Vec<u64> = std::iter::from_fn(|| sched.select(RobId(0)).first().map(|i| i.rob.0)).collect();
    assert_eq!(order, vec![30, 50, 1, 40, 2]);
    assert!(sched.is_empty());
}

#[test]
fn older_entry_keeps_priority_after_head_advances() {
    let mut sched = Scheduler::new(params());
    // Inserted while the head was far behind it.
    let _ = sched.insert(&[request(62, FuClass::Alu, Criticality::Normal)]);
    // Inserted after the head reached 62; its band wraps around to 0.
    let _ = sched.insert(&[request(72, FuClass::Alu, Criticality::Normal)]);

    let first = sched.select(RobId(62));
    assert_eq!(first[0].rob, RobId(62));
    assert_eq!(sched.select(RobId(62))[0].rob, RobId(72));
}
