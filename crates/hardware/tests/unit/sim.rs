//! End-to-End Simulation Tests.
//!
//! Runs complete traces through the simulator and checks the result against the
//! sequential reference model:
//! 1. Straight-line dependences produce the traced register values
//! 2. Forwarding, ordering violations, mispredictions and exceptions all end clean
//! 3. Structures smaller than the dispatch width still make progress
//! 4. The shipped demo traces run clean

use pretty_assertions::assert_eq;

use crate::common::builder::small_config;
use ooosim_core::common::{ArchReg, SimError, TraceError};
use ooosim_core::config::Config;
use ooosim_core::sim::{RunSummary, Simulator, Trace};

const MAX_CYCLES: u64 = 20_000;

fn run_json(config: Config, json: &str) -> (Simulator, RunSummary) {
    let trace = Trace::from_json(json).expect("valid trace");
    let mut sim = Simulator::new(config, trace).expect("valid setup");
    let summary = sim.run(MAX_CYCLES);
    (sim, summary)
}

fn demo(name: &str) -> String {
    format!("{}/../../demos/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn dependent_chain_commits_traced_values() {
    let (sim, summary) = run_json(
        Config::default(),
        r#"{ "ops": [
            { "pc": 0, "op": "arith", "dest": 1, "result": 5 },
            { "pc": 4, "op": "arith", "unit": "mul", "srcs": [1], "dest": 2, "result": 7 },
            { "pc": 8, "op": "arith", "srcs": [1, 2], "dest": 3, "result": 12 },
            { "pc": 12, "op": "arith", "unit": "fp", "srcs": [3], "dest": 1, "result": 40 }
        ] }"#,
    );
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.committed, 4);
    assert_eq!(sim.arch_value(ArchReg(1)), 40);
    assert_eq!(sim.arch_value(ArchReg(2)), 7);
    assert_eq!(sim.arch_value(ArchReg(3)), 12);
    assert_eq!(sim.stats().committed, 4);
}

#[test]
fn blocked_store_forwards_to_younger_load() {
    let trace = Trace::from_file(demo("forwarding.json")).expect("demo parses");
    let mut sim = Simulator::new(Config::default(), trace).expect("valid setup");
    let summary = sim.run(MAX_CYCLES);
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(sim.arch_value(ArchReg(2)), 0xAABB_CCDD);
    assert_eq!(sim.arch_value(ArchReg(3)), 0xFFFF_FFFF_FFFF_AABB);
    assert!(sim.stats().loads_forwarded >= 2);
    assert_eq!(sim.stats().load_value_mismatches, 0);
}

#[test]
fn speculative_load_replays_after_ordering_violation() {
    let trace = Trace::from_file(demo("ordering.json")).expect("demo parses");
    let mut sim = Simulator::new(Config::default(), trace).expect("valid setup");
    let summary = sim.run(MAX_CYCLES);
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.committed, 4);
    assert_eq!(sim.arch_value(ArchReg(2)), 153);
    assert!(sim.stats().ordering_violations >= 1);
    assert!(sim.stats().flushes_ordering >= 1);
}

#[test]
fn mispredictions_discard_wrong_path_work() {
    let trace = Trace::from_file(demo("mispredict.json")).expect("demo parses");
    let mut sim = Simulator::new(Config::default(), trace).expect("valid setup");
    let summary = sim.run(MAX_CYCLES);
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.committed, 8);
    assert_eq!(sim.stats().flushes_mispredict, 2);
    assert_eq!(sim.stats().checkpoint_restores, 1);
    assert!(sim.stats().flushed_insts > 0);
    assert_eq!(sim.arch_value(ArchReg(4)), 9);
    assert_eq!(sim.arch_value(ArchReg(5)), 10);
    assert_eq!(sim.arch_value(ArchReg(31)), 80);
}

#[test]
fn faulting_op_is_skipped_precisely() {
    let trace = Trace::from_file(demo("exception.json")).expect("demo parses");
    let mut sim = Simulator::new(Config::default(), trace).expect("valid setup");
    let summary = sim.run(MAX_CYCLES);
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.exceptions, 1);
    assert_eq!(summary.committed, 3);
    assert_eq!(sim.stats().flushes_exception, 1);
    assert_eq!(sim.arch_value(ArchReg(3)), 3);
    assert_eq!(sim.golden().peek(256, ooosim_core::common::AccessSize::Word), 3);
}

#[test]
fn load_from_faulting_range_raises_access_fault() {
    let mut config = Config::default();
    config.memory.fault_ranges = vec![(0x8000, 0x9000)];
    let (sim, summary) = run_json(
        config,
        r#"{ "ops": [
            { "pc": 0, "op": "arith", "dest": 1, "result": 1 },
            { "pc": 4, "op": "load", "dest": 2, "addr": 32768, "size": "word" },
            { "pc": 8, "op": "arith", "dest": 3, "result": 3 }
        ] }"#,
    );
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.exceptions, 1);
    assert_eq!(summary.committed, 2);
    assert_eq!(sim.arch_value(ArchReg(2)), 0);
}

#[test]
fn tiny_structures_still_make_progress() {
    let mut config = small_config();
    config.core.checkpoints = 1;
    config.core.store_queue_size = 1;
    config.core.load_queue_size = 1;
    let (_, summary) = run_json(
        config,
        r#"{ "ops": [
            { "pc": 0, "op": "store", "addr": 0, "size": "byte", "data": 1 },
            { "pc": 4, "op": "store", "addr": 1, "size": "byte", "data": 2 },
            { "pc": 8, "op": "store", "addr": 2, "size": "byte", "data": 3 },
            { "pc": 12, "op": "store", "addr": 3, "size": "byte", "data": 4 },
            { "pc": 16, "op": "branch", "taken": false, "checkpoint": true },
            { "pc": 20, "op": "branch", "taken": false, "checkpoint": true },
            { "pc": 24, "op": "load", "dest": 1, "addr": 0, "size": "word" },
            { "pc": 28, "op": "load", "dest": 2, "addr": 2, "size": "half" }
        ] }"#,
    );
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.committed, 8);
}

#[test]
fn cycle_limit_stops_an_unfinished_run() {
    let trace = Trace::from_file(demo("forwarding.json")).expect("demo parses");
    let mut sim = Simulator::new(Config::default(), trace).expect("valid setup");
    let summary = sim.run(3);
    assert!(!summary.finished);
    assert_eq!(summary.cycles, 3);
}

#[test]
fn out_of_range_register_rejected_at_setup() {
    let trace = Trace::from_json(r#"{ "ops": [{ "pc": 0, "op": "arith", "dest": 40 }] }"#)
        .expect("parses");
    let err = Simulator::new(Config::default(), trace).map(|_| ());
    assert!(matches!(
        err,
        Err(SimError::Trace(TraceError::RegisterOutOfRange { index: 0, reg: 40, .. }))
    ));
}

#[test]
fn small_core_demo_config_runs_every_demo() {
    let config = Config::from_file(demo("small-core.json")).expect("demo config");
    for name in ["forwarding.json", "mispredict.json", "ordering.json", "exception.json"] {
        let trace = Trace::from_file(demo(name)).expect("demo parses");
        let mut sim = Simulator::new(config.clone(), trace).expect("valid setup");
        let summary = sim.run(config.general.max_cycles);
        assert!(summary.is_clean(), "{name}: {summary:?}");
    }
}
