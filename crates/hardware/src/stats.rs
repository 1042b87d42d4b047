//! Simulation statistics collection and reporting.
//!
//! Failures in the core never propagate as errors; they surface here as counters. This
//! module tracks:
//! 1. **Throughput:** Cycles, dispatched/issued/committed instructions, IPC.
//! 2. **Instruction mix:** Retired counts per functional-unit class.
//! 3. **Stalls:** Dispatch and commit stalls broken down by [`StallReason`].
//! 4. **Flushes:** Recoveries broken down by cause, plus discarded instructions.
//! 5. **Memory:** Forwarding outcomes, disambiguation pre-check hits and store drains.

use std::time::Instant;

use crate::common::StallReason;
use crate::core::uop::FuClass;

/// Simulation statistics tracking all performance counters.
#[derive(Clone, Debug)]
pub struct SimStats {
    start_time: Instant,
    /// Total simulated cycles.
    pub cycles: u64,
    /// Micro-ops accepted by dispatch (including wrong-path ops).
    pub dispatched: u64,
    /// Micro-ops selected for execution.
    pub issued: u64,
    /// Instructions committed.
    pub committed: u64,
    /// Committed instructions per functional-unit class, indexed by [`FuClass::index`].
    pub retired_by_class: [u64; FuClass::COUNT],

    stall_counts: [u64; StallReason::ALL.len()],

    /// Flushes caused by branch mispredictions.
    pub flushes_mispredict: u64,
    /// Flushes caused by precise exceptions.
    pub flushes_exception: u64,
    /// Flushes caused by memory-ordering violations.
    pub flushes_ordering: u64,
    /// Instructions discarded by flushes.
    pub flushed_insts: u64,
    /// Mispredictions recovered through a rename checkpoint.
    pub checkpoint_restores: u64,
    /// Recoveries that walked the ROB back instead of restoring a checkpoint.
    pub walkback_recoveries: u64,
    /// Checkpoints created at branch dispatch.
    pub checkpoints_created: u64,

    /// Scheduler wakeup broadcasts applied (one per tag).
    pub wakeups: u64,
    /// Completions ignored because the instruction was already flushed.
    pub stale_completions: u64,

    /// Loads that forwarded their value from an older store.
    pub loads_forwarded: u64,
    /// Load attempts that waited for an older store's data.
    pub loads_wait_data: u64,
    /// Load attempts that waited for a partially overlapping store to drain.
    pub loads_wait_drain: u64,
    /// Loads sent to the memory system.
    pub loads_from_memory: u64,
    /// Forwarding checks skipped because the disambiguation table proved no conflict.
    pub mdu_filtered: u64,
    /// Forwarding checks that required the authoritative store queue scan.
    pub mdu_scans: u64,
    /// Stores written to memory.
    pub stores_drained: u64,
    /// Memory-ordering violations detected when a store address resolved.
    pub ordering_violations: u64,
    /// Committed loads whose value disagreed with the sequential reference model.
    pub load_value_mismatches: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            dispatched: 0,
            issued: 0,
            committed: 0,
            retired_by_class: [0; FuClass::COUNT],
            stall_counts: [0; StallReason::ALL.len()],
            flushes_mispredict: 0,
            flushes_exception: 0,
            flushes_ordering: 0,
            flushed_insts: 0,
            checkpoint_restores: 0,
            walkback_recoveries: 0,
            checkpoints_created: 0,
            wakeups: 0,
            stale_completions: 0,
            loads_forwarded: 0,
            loads_wait_data: 0,
            loads_wait_drain: 0,
            loads_from_memory: 0,
            mdu_filtered: 0,
            mdu_scans: 0,
            stores_drained: 0,
            ordering_violations: 0,
            load_value_mismatches: 0,
        }
    }
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"mix"`, `"stalls"`, `"flushes"`, `"memory"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "mix", "stalls", "flushes", "memory"];

impl SimStats {
    /// Counts one stall cycle for `reason`.
    #[inline]
    pub fn record_stall(&mut self, reason: StallReason) {
        self.stall_counts[reason.index()] += 1;
    }

    /// Number of stalls recorded for `reason`.
    #[inline]
    pub fn stalls(&self, reason: StallReason) -> u64 {
        self.stall_counts[reason.index()]
    }

    /// Total stalls across every reason.
    pub fn total_stalls(&self) -> u64 {
        self.stall_counts.iter().sum()
    }

    /// Total flushes across every cause.
    pub fn total_flushes(&self) -> u64 {
        self.flushes_mispredict + self.flushes_exception + self.flushes_ordering
    }

    /// Committed instructions per cycle.
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.committed as f64 / self.cycles as f64
        }
    }

    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of [`STATS_SECTIONS`]. Pass an empty
    /// slice to print all sections (same as `print()`).
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64();
        let cyc = self.cycles.max(1) as f64;
        let instr = self.committed.max(1) as f64;

        if want("summary") {
            let khz = if seconds > 0.0 {
                (self.cycles as f64 / seconds) / 1000.0
            } else {
                0.0
            };
            println!("\n==========================================================");
            println!("OUT-OF-ORDER CORE SIMULATION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_freq                 {khz:.2} kHz");
            println!("sim_insts                {}", self.committed);
            println!("sim_ipc                  {:.4}", self.ipc());
            println!("sim_cpi                  {:.4}", cyc / instr);
            println!("dispatched               {}", self.dispatched);
            println!("issued                   {}", self.issued);
            println!("----------------------------------------------------------");
        }
        if want("mix") {
            println!("INSTRUCTION MIX");
            for class in FuClass::ALL {
                let n = self.retired_by_class[class.index()];
                println!(
                    "  op.{:<19} {} ({:.2}%)",
                    class.label(),
                    n,
                    (n as f64 / instr) * 100.0
                );
            }
            println!("----------------------------------------------------------");
        }
        if want("stalls") {
            println!("STALLS");
            for reason in StallReason::ALL {
                let n = self.stalls(reason);
                println!(
                    "  stall.{:<17} {} ({:.2}%)",
                    reason.label(),
                    n,
                    (n as f64 / cyc) * 100.0
                );
            }
            println!("----------------------------------------------------------");
        }
        if want("flushes") {
            println!("FLUSHES");
            println!("  flush.mispredict       {}", self.flushes_mispredict);
            println!("  flush.exception        {}", self.flushes_exception);
            println!("  flush.ordering         {}", self.flushes_ordering);
            println!("  flush.squashed_insts   {}", self.flushed_insts);
            println!("  ckpt.created           {}", self.checkpoints_created);
            println!("  ckpt.restores          {}", self.checkpoint_restores);
            println!("  recovery.walkback      {}", self.walkback_recoveries);
            println!("  completions.stale      {}", self.stale_completions);
            println!("----------------------------------------------------------");
        }
        if want("memory") {
            let checks = self.mdu_filtered + self.mdu_scans;
            let filter_rate = if checks > 0 {
                (self.mdu_filtered as f64 / checks as f64) * 100.0
            } else {
                0.0
            };
            println!("MEMORY");
            println!("  load.forwarded         {}", self.loads_forwarded);
            println!("  load.wait_data         {}", self.loads_wait_data);
            println!("  load.wait_drain        {}", self.loads_wait_drain);
            println!("  load.memory            {}", self.loads_from_memory);
            println!("  mdu.filtered           {} ({filter_rate:.2}%)", self.mdu_filtered);
            println!("  mdu.scans              {}", self.mdu_scans);
            println!("  store.drained          {}", self.stores_drained);
            println!("  ordering.violations    {}", self.ordering_violations);
            println!("  load.value_mismatches  {}", self.load_value_mismatches);
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    ///
    /// Equivalent to `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
