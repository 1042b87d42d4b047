//! Engine Integration Tests.
//!
//! Drives `OooCore` through dispatch, wakeup, commit and every recovery path:
//! 1. Checkpoint restore discards exactly the younger entries in all components
//! 2. Checkpoint restore and walk-back reach the same rename state
//! 3. Dispatch admission is all or nothing
//! 4. Stale wakeups never reach a reallocated register
//! 5. Commit order, exceptions, ordering violations and drain back-pressure

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::builder::small_config;
use crate::common::harness::CoreHarness;
use ooosim_core::common::{AccessSize, ArchReg, ExceptionCause, FlushCause, RobId, StallReason};
use ooosim_core::config::Config;
use ooosim_core::core::rob::RobState;
use ooosim_core::core::{LoadOutcome, MicroOp};

#[test]
fn checkpoint_restore_discards_younger_entries() {
    let mut h = CoreHarness::new(&Config::default());
    h.retire_nops(10);
    assert_eq!(h.core.rob().head(), RobId(10));

    let front = vec![
        h.ops.alu(Some(1), &[]),
        h.ops.alu(Some(2), &[]),
        h.ops.branch(true),
    ];
    assert_eq!(h.dispatch(&front), vec![RobId(10), RobId(11), RobId(12)]);
    let after_branch = h.core.rename().state();
    let _ = h.drain_scheduler();

    let tail_a = vec![
        h.ops.alu(Some(5), &[]),
        h.ops.load(6, AccessSize::Word),
        h.ops.store(AccessSize::Word),
        h.ops.alu(Some(7), &[5]),
    ];
    let tail_b = vec![
        h.ops.alu(Some(1), &[5]),
        h.ops.alu(Some(2), &[5]),
        h.ops.alu(Some(3), &[5]),
        h.ops.alu(Some(4), &[5]),
    ];
    let _ = h.dispatch(&tail_a);
    let ids = h.dispatch(&tail_b);
    assert_eq!(ids.last(), Some(&RobId(20)));
    assert!(h.core.scheduler().entries().any(|e| e.rob > RobId(12)));

    h.complete(RobId(10));
    h.complete(RobId(11));
    assert!(h.resolve(RobId(12), true, 0x100));

    let outcome = h.commit();
    let retired: Vec<RobId> = outcome.retired.iter().map(|e| e.id).collect();
    assert_eq!(retired, vec![RobId(10), RobId(11)]);
    let redirect = outcome.redirect.expect("misprediction must redirect");
    assert_eq!(redirect.flush_point, RobId(12));
    assert_eq!(redirect.cause, FlushCause::Misprediction);
    assert_eq!(redirect.target, 0x100);

    assert_eq!(h.core.rob().tail(), RobId(13));
    assert!(h.core.rob().entry(RobId(12)).is_some());
    assert!(h.core.rob().entry(RobId(13)).is_none());
    assert!(h.core.scheduler().entries().all(|e| e.rob <= RobId(12)));
    assert_eq!(h.core.retry_len(), 0);
    assert!(h.core.lsq().loads().is_empty());
    assert!(h.core.lsq().stores().is_empty());

    let state = h.core.rename().state();
    assert_eq!(state.map, after_branch.map);
    assert_eq!(state.free_counters.0, after_branch.free_counters.0);
    assert_eq!(h.ctx.stats.checkpoint_restores, 1);
    assert_eq!(h.ctx.stats.flushes_mispredict, 1);
    assert_eq!(h.ctx.stats.flushed_insts, 8);

    // The branch itself commits on the next step and releases its checkpoint.
    assert_eq!(h.core.rename().live_checkpoints().len(), 1);
    let outcome = h.commit();
    assert_eq!(outcome.retired.len(), 1);
    assert_eq!(outcome.redirect, None);
    assert!(h.core.rename().live_checkpoints().is_empty());
}

fn mispredict_after_suffix(checkpoint: bool) -> CoreHarness {
    let mut h = CoreHarness::new(&Config::default());
    let front = vec![
        h.ops.alu(Some(1), &[]),
        h.ops.alu(Some(2), &[1]),
        h.ops.branch(checkpoint),
    ];
    let ids = h.dispatch(&front);
    let suffix = vec![
        h.ops.alu(Some(1), &[2]),
        h.ops.alu(Some(3), &[1]),
        h.ops.alu(Some(1), &[3]),
        h.ops.load(4, AccessSize::Byte),
    ];
    let _ = h.dispatch(&suffix);
    for &id in &ids[..2] {
        h.complete(id);
    }
    assert!(h.resolve(ids[2], true, 0x80));
    let outcome = h.commit();
    assert_eq!(outcome.retired.len(), 2);
    assert!(outcome.redirect.is_some());
    h
}

#[test]
fn checkpoint_and_walkback_reach_the_same_state() {
    let restored = mispredict_after_suffix(true);
    let walked = mispredict_after_suffix(false);
    assert_eq!(restored.core.rename().state(), walked.core.rename().state());
    assert_eq!(restored.ctx.stats.checkpoint_restores, 1);
    assert_eq!(walked.ctx.stats.walkback_recoveries, 1);
}

#[test]
fn dispatch_is_all_or_nothing_on_free_registers() {
    let config = small_config();
    let mut h = CoreHarness::new(&config);
    let first: Vec<_> = (1..=4).map(|r| h.ops.alu(Some(r), &[])).collect();
    let second: Vec<_> = (1..=4).map(|r| h.ops.alu(Some(r), &[])).collect();
    let first_ids = h.dispatch(&first);
    let _ = h.dispatch(&second);
    assert_eq!(h.core.rename().free_registers(), 0);

    let third: Vec<_> = (5..=7).map(|r| h.ops.alu(Some(r), &[])).collect();
    let before = h.core.snapshot();
    assert_eq!(
        h.core.dispatch(&mut h.ctx, &third),
        Err(StallReason::NoFreeRegisters)
    );
    assert_eq!(h.core.snapshot(), before);
    assert_eq!(h.ctx.stats.stalls(StallReason::NoFreeRegisters), 1);

    let _ = h.drain_scheduler();
    for id in first_ids {
        h.complete(id);
    }
    assert_eq!(h.commit().retired.len(), 4);
    assert_eq!(h.core.rename().free_registers(), 4);

    let ids = h.dispatch(&third);
    assert_eq!(ids.len(), 3);
    assert_eq!(h.core.rename().free_registers(), 1);
}

#[test]
fn admission_reports_the_first_exhausted_resource() {
    let mut config = small_config();
    config.core.store_queue_size = 1;
    let mut h = CoreHarness::new(&config);
    let batch = vec![
        h.ops.store(AccessSize::Byte),
        h.ops.store(AccessSize::Byte),
    ];
    assert_eq!(
        h.core.dispatch(&mut h.ctx, &batch),
        Err(StallReason::StoreQueueFull)
    );
    let wide = h.ops.nops(5);
    assert_eq!(
        h.core.dispatch(&mut h.ctx, &wide),
        Err(StallReason::DispatchWidth)
    );
    assert!(h.core.rob().is_empty());
}

#[test]
fn stale_broadcast_does_not_wake_reallocated_register() {
    let mut h = CoreHarness::new(&Config::default());
    let producer = h.ops.alu(Some(1), &[]);
    let ids = h.dispatch(&[producer]);
    let old = h.core.rob().entry(ids[0]).and_then(|e| e.dest).expect("has dest");
    let _ = h.cycle_select();

    // Completion queues a broadcast for next cycle, then the producer is flushed.
    h.complete(ids[0]);
    assert_eq!(h.core.flush(&mut h.ctx, RobId(0)), 1);

    let writer = h.ops.alu(Some(1), &[2]);
    let reader = h.ops.alu(Some(3), &[1]);
    let ids = h.dispatch(&[writer, reader]);
    let reused = h.core.rob().entry(ids[0]).and_then(|e| e.dest).expect("has dest");
    assert_eq!(reused.new, old.new, "walk-back hands the same register out again");

    let issued = h.cycle_select();
    assert_eq!(issued.iter().map(|i| i.rob).collect::<Vec<_>>(), vec![ids[0]]);
    assert_eq!(h.ctx.stats.wakeups, 0);
    let waiting = h
        .core
        .scheduler()
        .entries()
        .find(|e| e.rob == ids[1])
        .expect("reader still waiting");
    assert!(!waiting.is_ready());

    // The stale completion for the old generation is rejected outright.
    assert!(!h.core.complete(&mut h.ctx, RobId(0), producer.seq));
    assert_eq!(h.ctx.stats.stale_completions, 1);
}

#[test]
fn exception_flushes_inclusive_with_walk_back() {
    let mut h = CoreHarness::new(&Config::default());
    let a = h.ops.alu(Some(1), &[]);
    let a_id = h.dispatch(&[a])[0];
    let after_a = h.core.rename().state();

    let rest = vec![h.ops.alu(Some(2), &[]), h.ops.alu(Some(3), &[2])];
    let ids = h.dispatch(&rest);
    let _ = h.cycle_select();
    h.complete(a_id);
    let seq = h.seq(ids[0]);
    assert!(h.core.fault(&mut h.ctx, ids[0], seq, ExceptionCause::IllegalInstruction));
    h.complete(ids[1]);

    let outcome = h.commit();
    assert_eq!(outcome.retired.len(), 1);
    let redirect = outcome.redirect.expect("exception redirects");
    assert_eq!(
        redirect.cause,
        FlushCause::Exception(ExceptionCause::IllegalInstruction)
    );
    assert!(h.core.rob().is_empty());
    assert_eq!(h.core.rename().state().map, after_a.map);
    assert_eq!(h.ctx.stats.flushes_exception, 1);
    assert_eq!(h.ctx.stats.walkback_recoveries, 1);
}

#[test]
fn late_store_address_flags_completed_load() {
    let mut h = CoreHarness::new(&Config::default());
    let store = h.ops.store(AccessSize::Double);
    let load = h.ops.load(1, AccessSize::Word);
    let ids = h.dispatch(&[store, load]);
    let _ = h.drain_scheduler();

    assert_eq!(
        h.core.execute_load(&mut h.ctx, ids[1], load.seq, 0x40),
        LoadOutcome::Memory
    );
    h.complete(ids[1]);
    assert!(h.core.store_address(&mut h.ctx, ids[0], store.seq, 0x40));
    assert!(h.core.store_data(&mut h.ctx, ids[0], store.seq, 7));
    assert_eq!(h.ctx.stats.ordering_violations, 1);
    assert!(h.core.rob().entry(ids[1]).is_some_and(|e| e.ordering_violation));

    let outcome = h.commit();
    assert_eq!(outcome.retired.len(), 1);
    let redirect = outcome.redirect.expect("violation redirects");
    assert_eq!(redirect.cause, FlushCause::MemoryOrdering);
    assert_eq!(redirect.flush_point, ids[1]);
    assert_eq!(h.core.rob().tail(), ids[1]);
    assert!(h.core.lsq().loads().is_empty());
    assert_eq!(h.ctx.stats.flushes_ordering, 1);
}

#[test]
fn store_past_top_of_address_space_raises_precise_fault() {
    let mut h = CoreHarness::new(&Config::default());
    let store = h.ops.store(AccessSize::Double);
    let load = h.ops.load(1, AccessSize::Word);
    let ids = h.dispatch(&[store, load]);
    let _ = h.drain_scheduler();

    assert!(!h.core.store_address(&mut h.ctx, ids[0], store.seq, u64::MAX - 3));
    assert_eq!(
        h.core.execute_load(&mut h.ctx, ids[1], load.seq, u64::MAX),
        LoadOutcome::Faulted(ExceptionCause::LoadAccessFault(u64::MAX))
    );
    assert_eq!(h.ctx.stats.ordering_violations, 0);

    let outcome = h.commit();
    assert!(outcome.retired.is_empty());
    let redirect = outcome.redirect.expect("fault redirects");
    assert_eq!(
        redirect.cause,
        FlushCause::Exception(ExceptionCause::StoreAccessFault(u64::MAX - 3))
    );
    assert_eq!(redirect.flush_point, ids[0]);
    assert!(h.core.rob().is_empty());
    assert!(h.core.lsq().loads().is_empty());
}

#[test]
fn resolved_store_forwards_sign_extended_value() {
    let mut h = CoreHarness::new(&Config::default());
    let store = h.ops.store(AccessSize::Double);
    let placeholder = h.ops.alu(None, &[]);
    let load = MicroOp::load(placeholder.seq, placeholder.pc, AccessSize::Word, true)
        .with_dest(ArchReg(1));
    let ids = h.dispatch(&[store, load]);
    let _ = h.drain_scheduler();

    assert!(h.core.store_address(&mut h.ctx, ids[0], store.seq, 0x100));
    assert!(h.core.store_data(&mut h.ctx, ids[0], store.seq, 0x8000_0000));
    assert_eq!(
        h.core.execute_load(&mut h.ctx, ids[1], load.seq, 0x100),
        LoadOutcome::Forwarded(0xFFFF_FFFF_8000_0000)
    );
    assert_eq!(h.ctx.stats.loads_forwarded, 1);
}

#[test]
fn full_drain_queue_blocks_store_commit() {
    let mut h = CoreHarness::new(&small_config());
    let stores: Vec<_> = (0..3).map(|_| h.ops.store(AccessSize::Word)).collect();
    let ids = h.dispatch(&stores);
    let _ = h.drain_scheduler();
    for (i, (&id, op)) in ids.iter().zip(&stores).enumerate() {
        assert!(h.core.store_address(&mut h.ctx, id, op.seq, 0x1000 + 8 * i as u64));
        assert!(h.core.store_data(&mut h.ctx, id, op.seq, i as u64));
        assert_eq!(h.core.rob().entry(id).map(|e| e.state), Some(RobState::Completed));
    }

    assert_eq!(h.commit().retired.len(), 2);
    assert_eq!(h.ctx.stats.stalls(StallReason::DrainQueueFull), 1);

    let drains = h.core.drain_stores();
    assert_eq!(drains.len(), 1);
    assert_eq!(drains[0].addr, 0x1000);
    h.core.store_drained(&mut h.ctx, drains[0].slot);

    assert_eq!(h.commit().retired.len(), 1);
    assert_eq!(h.core.lsq().stores().len(), 2);
}

#[test]
fn flush_everything_restores_initial_snapshot() {
    let mut h = CoreHarness::new(&Config::default());
    let pristine = h.core.snapshot();
    let batch = vec![
        h.ops.alu(Some(1), &[]),
        h.ops.branch(true),
        h.ops.load(2, AccessSize::Half),
        h.ops.store(AccessSize::Half),
    ];
    let _ = h.dispatch(&batch);
    let more = vec![h.ops.alu(Some(1), &[1]), h.ops.alu(Some(3), &[2])];
    let _ = h.dispatch(&more);

    assert_eq!(h.core.flush(&mut h.ctx, RobId(0)), 6);
    assert_eq!(h.core.snapshot(), pristine);
    assert!(h.core.is_idle());
}

proptest! {
    #[test]
    fn commit_retires_in_program_order(order in (1usize..=24).prop_flat_map(|n| {
        Just((0..n as u64).collect::<Vec<u64>>()).prop_shuffle()
    })) {
        let mut h = CoreHarness::new(&Config::default());
        let n = order.len();
        let mut ids = Vec::new();
        for chunk in 0..n.div_ceil(4) {
            let take = (n - chunk * 4).min(4);
            let batch = h.ops.nops(take);
            ids.extend(h.dispatch(&batch));
        }
        let _ = h.drain_scheduler();

        let mut retired = Vec::new();
        let mut done = vec![false; n];
        for &i in &order {
            h.complete(ids[i as usize]);
            done[i as usize] = true;
            loop {
                let outcome = h.commit();
                if outcome.retired.is_empty() {
                    break;
                }
                retired.extend(outcome.retired.iter().map(|e| e.id.0));
            }
            // Exactly the longest completed prefix has retired.
            let prefix = done.iter().take_while(|&&d| d).count();
            prop_assert_eq!(retired.len(), prefix);
        }
        prop_assert_eq!(retired, (0..n as u64).collect::<Vec<_>>());
    }
}
