//! Configuration Tests.
//!
//! JSON parsing with defaults and the validation rules for structure shapes.

use rstest::rstest;

use ooosim_core::common::ConfigError;
use ooosim_core::config::Config;

#[test]
fn defaults_validate() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn partial_json_keeps_other_defaults() {
    let config = Config::from_json(
        r#"{ "memory": { "load_latency": 9, "fault_ranges": [[4096, 8192]] } }"#,
    )
    .expect("valid config");
    assert_eq!(config.memory.load_latency, 9);
    assert_eq!(config.memory.fault_ranges, vec![(4096, 8192)]);
    assert_eq!(config.core, Config::default().core);
}

#[rstest]
#[case::zero_rob(r#"{ "core": { "rob_size": 0 } }"#)]
#[case::zero_drain(r#"{ "core": { "drain_queue_size": 0 } }"#)]
fn zero_capacity_rejected(#[case] json: &str) {
    assert!(matches!(
        Config::from_json(json),
        Err(ConfigError::ZeroCapacity(_))
    ));
}

#[test]
fn phys_regs_must_exceed_arch_regs() {
    let err = Config::from_json(r#"{ "core": { "arch_regs": 32, "phys_regs": 32 } }"#);
    assert!(matches!(
        err,
        Err(ConfigError::TooFewPhysRegs { phys: 32, arch: 32 })
    ));
}

#[test]
fn bucket_count_limited_by_bitmap() {
    let err = Config::from_json(r#"{ "core": { "age_bands": 100000 } }"#);
    assert!(matches!(
        err,
        Err(ConfigError::TooLarge {
            field: "core.priority_buckets",
            ..
        })
    ));
}

#[test]
fn unit_without_ports_everywhere_rejected() {
    let json = r#"{ "units": {
        "alu": { "ports": 0, "latency": 1 }, "mul": { "ports": 0, "latency": 1 },
        "div": { "ports": 0, "latency": 1 }, "fp": { "ports": 0, "latency": 1 },
        "branch": { "ports": 0, "latency": 1 }, "load": { "ports": 0, "latency": 1 },
        "store": { "ports": 0, "latency": 1 } } }"#;
    assert!(matches!(Config::from_json(json), Err(ConfigError::NoIssuePorts)));
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert!(matches!(
        Config::from_json("{ core: 1 }"),
        Err(ConfigError::Parse(_))
    ));
}
