//! Out-of-order core model CLI.
//!
//! This binary provides a single entry point for running traces. It performs:
//! 1. **Trace run:** Load a JSON oracle trace, drive it through the core and check every
//!    committed load and the final memory image against the sequential reference.
//! 2. **Config dump:** Print the effective configuration (defaults merged with a file)
//!    as JSON, as a starting point for custom configurations.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ooosim_core::config::Config;
use ooosim_core::sim::{Simulator, Trace};
use ooosim_core::stats::STATS_SECTIONS;

#[derive(Parser, Debug)]
#[command(
    name = "ooosim",
    author,
    version,
    about = "Out-of-order core model",
    long_about = "Drive a JSON micro-op trace through a speculative out-of-order core and \
                  check the result against a sequential reference model.\n\nExamples:\n  \
                  ooosim run -t demos/mispredict.json\n  \
                  ooosim run -t demos/ordering.json -c demos/small-core.json --stats memory,flushes\n  \
                  ooosim config -c demos/small-core.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a trace to completion.
    Run {
        /// Trace file (JSON).
        #[arg(short, long)]
        trace: PathBuf,

        /// Configuration file (JSON); built-in defaults otherwise.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override `general.max_cycles`.
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Statistics sections to print (comma separated); all when omitted.
        #[arg(long, value_delimiter = ',', value_parser = clap::builder::PossibleValuesParser::new(STATS_SECTIONS.iter().copied()))]
        stats: Vec<String>,

        /// Print the run summary as JSON instead of statistics.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON.
    Config {
        /// Configuration file to merge over the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(p) => Config::from_file(p),
        None => Ok(Config::default()),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            trace,
            config,
            max_cycles,
            stats,
            json,
        } => cmd_run(&trace, config.as_deref(), max_cycles, &stats, json),
        Commands::Config { config } => {
            let config = load_config(config.as_deref());
            match serde_json::to_string_pretty(&config) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            }
        }
    }
}

fn cmd_run(
    trace_path: &Path,
    config_path: Option<&Path>,
    max_cycles: Option<u64>,
    sections: &[String],
    json: bool,
) {
    let mut config = load_config(config_path);
    if let Some(n) = max_cycles {
        config.general.max_cycles = n;
    }
    init_tracing(config.general.trace);

    let trace = match Trace::from_file(trace_path) {
        Ok(t) => t,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    info!(trace = %trace_path.display(), ops = trace.len(), "loaded trace");

    let limit = config.general.max_cycles;
    let mut sim = match Simulator::new(config, trace) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    let summary = sim.run(limit);

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => error!("{e}"),
        }
    } else {
        sim.stats().print_sections(sections);
    }

    if !summary.is_clean() {
        if !summary.finished {
            error!(cycles = summary.cycles, "trace did not finish");
        }
        if summary.load_mismatches > 0 {
            error!(count = summary.load_mismatches, "committed loads disagreed with reference memory");
        }
        if !summary.memory_mismatches.is_empty() {
            error!(
                bytes = summary.memory_mismatches.len(),
                first = format_args!("{:#x}", summary.memory_mismatches[0]),
                "final memory disagrees with reference memory"
            );
        }
        process::exit(1);
    }
}
