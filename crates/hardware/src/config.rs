//! Configuration system for the core model.
//!
//! This module defines every structure used to parameterize the simulator. It provides:
//! 1. **Defaults:** Baseline structure sizes, widths and latencies.
//! 2. **Structures:** Hierarchical config for general, core, functional-unit and memory settings.
//! 3. **Validation:** Rejection of shapes the core cannot represent.
//!
//! Configuration is supplied as JSON (see [`Config::from_json`]) or built from `Config::default()`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::constants::{MAX_CHECKPOINTS, MAX_PHYS_REGS, MAX_PRIORITY_BUCKETS};
use crate::common::ConfigError;
use crate::core::uop::FuClass;

/// Default configuration constants.
mod defaults {
    /// Architectural registers visible to the instruction stream.
    pub const ARCH_REGS: usize = 32;

    /// Physical register pool size (rename targets).
    pub const PHYS_REGS: usize = 128;

    /// Rename checkpoint slots available to in-flight branches.
    pub const CHECKPOINTS: usize = 8;

    /// Reorder buffer entries.
    pub const ROB_SIZE: usize = 128;

    /// Micro-ops accepted per dispatch batch.
    pub const DISPATCH_WIDTH: usize = 4;

    /// Instructions retired per cycle.
    pub const COMMIT_WIDTH: usize = 4;

    /// Scheduler (issue queue) entries.
    pub const SCHEDULER_SIZE: usize = 64;

    /// Instructions selected per cycle across all classes.
    pub const ISSUE_WIDTH: usize = 6;

    /// Age bands per criticality class in the priority function.
    pub const AGE_BANDS: usize = 64;

    /// Load queue entries.
    pub const LOAD_QUEUE_SIZE: usize = 32;

    /// Store queue entries.
    pub const STORE_QUEUE_SIZE: usize = 24;

    /// Committed stores awaiting drain.
    pub const DRAIN_QUEUE_SIZE: usize = 4;

    /// Stores handed to memory per cycle.
    pub const DRAIN_WIDTH: usize = 1;

    /// Memory disambiguation table entries.
    pub const MDU_ENTRIES: usize = 256;

    /// Cycles for a load to return from memory.
    pub const LOAD_LATENCY: u64 = 4;

    /// Cycles for a store drain to be acknowledged.
    pub const STORE_LATENCY: u64 = 1;

    /// Maximum cycles the driver runs before giving up.
    pub const MAX_CYCLES: u64 = 10_000_000;
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use ooosim_core::config::Config;
///
/// let json = r#"{
///     "core": { "rob_size": 64, "phys_regs": 96 },
///     "units": { "alu": { "ports": 2, "latency": 1 } }
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.core.rob_size, 64);
/// assert_eq!(config.core.phys_regs, 96);
/// assert_eq!(config.units.alu.ports, 2);
/// assert_eq!(config.core.arch_regs, 32);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// General simulation settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Out-of-order structure sizes and widths.
    #[serde(default)]
    pub core: CoreConfig,
    /// Functional-unit issue ports and latencies.
    #[serde(default)]
    pub units: UnitsConfig,
    /// Memory system timing.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Parses and validates a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks that every structure can actually be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.core;
        let nonzero = [
            ("core.arch_regs", c.arch_regs),
            ("core.checkpoints", c.checkpoints),
            ("core.rob_size", c.rob_size),
            ("core.dispatch_width", c.dispatch_width),
            ("core.commit_width", c.commit_width),
            ("core.scheduler_size", c.scheduler_size),
            ("core.issue_width", c.issue_width),
            ("core.age_bands", c.age_bands),
            ("core.load_queue_size", c.load_queue_size),
            ("core.store_queue_size", c.store_queue_size),
            ("core.drain_queue_size", c.drain_queue_size),
            ("core.drain_width", c.drain_width),
            ("core.mdu_entries", c.mdu_entries),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity(field));
            }
        }
        if c.phys_regs <= c.arch_regs {
            return Err(ConfigError::TooFewPhysRegs {
                phys: c.phys_regs,
                arch: c.arch_regs,
            });
        }
        let limits = [
            ("core.phys_regs", c.phys_regs, MAX_PHYS_REGS),
            ("core.checkpoints", c.checkpoints, MAX_CHECKPOINTS),
            ("core.priority_buckets", c.priority_buckets(), MAX_PRIORITY_BUCKETS),
            ("core.scheduler_size", c.scheduler_size, u32::MAX as usize),
            ("core.load_queue_size", c.load_queue_size, u32::MAX as usize),
            ("core.store_queue_size", c.store_queue_size, u32::MAX as usize),
        ];
        for (field, value, max) in limits {
            if value > max {
                return Err(ConfigError::TooLarge { field, value, max });
            }
        }
        if FuClass::ALL.iter().all(|&class| self.units.get(class).ports == 0) {
            return Err(ConfigError::NoIssuePorts);
        }
        Ok(())
    }
}

/// General simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Emit per-op pipeline events at `trace` level.
    #[serde(default)]
    pub trace: bool,

    /// Stop the driver after this many cycles.
    #[serde(default = "GeneralConfig::default_max_cycles")]
    pub max_cycles: u64,
}

impl GeneralConfig {
    fn default_max_cycles() -> u64 {
        defaults::MAX_CYCLES
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace: false,
            max_cycles: defaults::MAX_CYCLES,
        }
    }
}

/// Out-of-order structure sizes and widths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CoreConfig {
    /// Architectural registers.
    #[serde(default = "CoreConfig::default_arch_regs")]
    pub arch_regs: usize,

    /// Physical registers in the rename pool.
    #[serde(default = "CoreConfig::default_phys_regs")]
    pub phys_regs: usize,

    /// Rename checkpoint slots.
    #[serde(default = "CoreConfig::default_checkpoints")]
    pub checkpoints: usize,

    /// Reorder buffer entries.
    #[serde(default = "CoreConfig::default_rob_size")]
    pub rob_size: usize,

    /// Micro-ops per dispatch batch.
    #[serde(default = "CoreConfig::default_dispatch_width")]
    pub dispatch_width: usize,

    /// Instructions retired per cycle.
    #[serde(default = "CoreConfig::default_commit_width")]
    pub commit_width: usize,

    /// Scheduler entries.
    #[serde(default = "CoreConfig::default_scheduler_size")]
    pub scheduler_size: usize,

    /// Instructions selected per cycle.
    #[serde(default = "CoreConfig::default_issue_width")]
    pub issue_width: usize,

    /// Age bands per criticality class.
    #[serde(default = "CoreConfig::default_age_bands")]
    pub age_bands: usize,

    /// Load queue entries.
    #[serde(default = "CoreConfig::default_load_queue")]
    pub load_queue_size: usize,

    /// Store queue entries.
    #[serde(default = "CoreConfig::default_store_queue")]
    pub store_queue_size: usize,

    /// Committed stores that may wait for drain.
    #[serde(default = "CoreConfig::default_drain_queue")]
    pub drain_queue_size: usize,

    /// Stores drained per cycle.
    #[serde(default = "CoreConfig::default_drain_width")]
    pub drain_width: usize,

    /// Memory disambiguation table entries.
    #[serde(default = "CoreConfig::default_mdu_entries")]
    pub mdu_entries: usize,
}

impl CoreConfig {
    fn default_arch_regs() -> usize {
        defaults::ARCH_REGS
    }

    fn default_phys_regs() -> usize {
        defaults::PHYS_REGS
    }

    fn default_checkpoints() -> usize {
        defaults::CHECKPOINTS
    }

    fn default_rob_size() -> usize {
        defaults::ROB_SIZE
    }

    fn default_dispatch_width() -> usize {
        defaults::DISPATCH_WIDTH
    }

    fn default_commit_width() -> usize {
        defaults::COMMIT_WIDTH
    }

    fn default_scheduler_size() -> usize {
        defaults::SCHEDULER_SIZE
    }

    fn default_issue_width() -> usize {
        defaults::ISSUE_WIDTH
    }

    fn default_age_bands() -> usize {
        defaults::AGE_BANDS
    }

    fn default_load_queue() -> usize {
        defaults::LOAD_QUEUE_SIZE
    }

    fn default_store_queue() -> usize {
        defaults::STORE_QUEUE_SIZE
    }

    fn default_drain_queue() -> usize {
        defaults::DRAIN_QUEUE_SIZE
    }

    fn default_drain_width() -> usize {
        defaults::DRAIN_WIDTH
    }

    fn default_mdu_entries() -> usize {
        defaults::MDU_ENTRIES
    }

    /// Total scheduler priority buckets (criticality classes x age bands).
    pub const fn priority_buckets(&self) -> usize {
        crate::common::constants::CRITICALITY_CLASSES * self.age_bands
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            arch_regs: defaults::ARCH_REGS,
            phys_regs: defaults::PHYS_REGS,
            checkpoints: defaults::CHECKPOINTS,
            rob_size: defaults::ROB_SIZE,
            dispatch_width: defaults::DISPATCH_WIDTH,
            commit_width: defaults::COMMIT_WIDTH,
            scheduler_size: defaults::SCHEDULER_SIZE,
            issue_width: defaults::ISSUE_WIDTH,
            age_bands: defaults::AGE_BANDS,
            load_queue_size: defaults::LOAD_QUEUE_SIZE,
            store_queue_size: defaults::STORE_QUEUE_SIZE,
            drain_queue_size: defaults::DRAIN_QUEUE_SIZE,
            drain_width: defaults::DRAIN_WIDTH,
            mdu_entries: defaults::MDU_ENTRIES,
        }
    }
}

/// Issue ports and execution latency of one functional-unit class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnitConfig {
    /// Instructions of this class that may issue per cycle.
    pub ports: usize,
    /// Cycles from issue to completion.
    pub latency: u64,
}

impl UnitConfig {
    const fn new(ports: usize, latency: u64) -> Self {
        Self { ports, latency }
    }
}

/// Per-class functional-unit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnitsConfig {
    /// Simple integer ALU.
    #[serde(default = "UnitsConfig::default_alu")]
    pub alu: UnitConfig,
    /// Integer multiplier.
    #[serde(default = "UnitsConfig::default_mul")]
    pub mul: UnitConfig,
    /// Integer divider.
    #[serde(default = "UnitsConfig::default_div")]
    pub div: UnitConfig,
    /// Floating-point pipe.
    #[serde(default = "UnitsConfig::default_fp")]
    pub fp: UnitConfig,
    /// Branch resolution unit.
    #[serde(default = "UnitsConfig::default_branch")]
    pub branch: UnitConfig,
    /// Load address generation (memory latency is separate).
    #[serde(default = "UnitsConfig::default_load")]
    pub load: UnitConfig,
    /// Store address and data generation.
    #[serde(default = "UnitsConfig::default_store")]
    pub store: UnitConfig,
}

impl UnitsConfig {
    fn default_alu() -> UnitConfig {
        UnitConfig::new(3, 1)
    }

    fn default_mul() -> UnitConfig {
        UnitConfig::new(1, 3)
    }

    fn default_div() -> UnitConfig {
        UnitConfig::new(1, 12)
    }

    fn default_fp() -> UnitConfig {
        UnitConfig::new(2, 4)
    }

    fn default_branch() -> UnitConfig {
        UnitConfig::new(1, 1)
    }

    fn default_load() -> UnitConfig {
        UnitConfig::new(2, 1)
    }

    fn default_store() -> UnitConfig {
        UnitConfig::new(1, 1)
    }

    /// Returns the configuration for `class`.
    pub const fn get(&self, class: FuClass) -> UnitConfig {
        match class {
            FuClass::Alu => self.alu,
            FuClass::Mul => self.mul,
            FuClass::Div => self.div,
            FuClass::Fp => self.fp,
            FuClass::Branch => self.branch,
            FuClass::Load => self.load,
            FuClass::Store => self.store,
        }
    }

    /// Per-class issue port counts indexed by [`FuClass::index`].
    pub fn ports(&self) -> [usize; FuClass::COUNT] {
        FuClass::ALL.map(|class| self.get(class).ports)
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            alu: Self::default_alu(),
            mul: Self::default_mul(),
            div: Self::default_div(),
            fp: Self::default_fp(),
            branch: Self::default_branch(),
            load: Self::default_load(),
            store: Self::default_store(),
        }
    }
}

/// Memory system timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Cycles for a load request to return data.
    #[serde(default = "MemoryConfig::default_load_latency")]
    pub load_latency: u64,

    /// Cycles for a store drain to be acknowledged.
    #[serde(default = "MemoryConfig::default_store_latency")]
    pub store_latency: u64,

    /// Address ranges `[start, end)` that fault on access.
    #[serde(default)]
    pub fault_ranges: Vec<(u64, u64)>,
}

impl MemoryConfig {
    fn default_load_latency() -> u64 {
        defaults::LOAD_LATENCY
    }

    fn default_store_latency() -> u64 {
        defaults::STORE_LATENCY
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            load_latency: defaults::LOAD_LATENCY,
            store_latency: defaults::STORE_LATENCY,
            fault_ranges: Vec::new(),
        }
    }
}
