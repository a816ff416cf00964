//! # Mosaic Sim
//!
//! Drives a pool with scripted or random traffic and reports what happened.
//!
//! ```text
//! mosaic_sim run workloads/scenario_c.toml
//! mosaic_sim -v random --capacity 4096 --ops 100000 --seed 42
//! ```
//!
//! Logging goes through `tracing`; `RUST_LOG` overrides the `-v` level.

mod random;
mod workload;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use mosaic_core::{CompactionMode, PoolConfig, PoolStats};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::random::TrafficParams;
use crate::workload::Workload;

#[derive(Parser)]
#[command(name = "mosaic_sim", version, about = "Compacting pool workload simulator")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a TOML workload script
    Run {
        /// Workload file
        workload: PathBuf,
    },
    /// Issue seeded random traffic and check the fit property
    Random {
        /// Arena size in bytes
        #[arg(long, default_value_t = 4096)]
        capacity: usize,
        /// Number of operations
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        /// Traffic seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Largest request size in bytes
        #[arg(long, default_value_t = 256)]
        max_size: usize,
        /// Allocation granularity
        #[arg(long, default_value_t = 1)]
        granule: usize,
        /// Never relocate live data
        #[arg(long)]
        no_compaction: bool,
    },
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("cannot install log subscriber: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         MOSAIC POOL SIMULATOR                                    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    match cli.command {
        Command::Run { workload: path } => {
            let script = Workload::from_file(&path)?;
            let report = workload::replay(&script)?;

            println!("┌─ REPLAY ─────────────────────────────────────────────────────────┐");
            println!("│ Workload:           {}", path.display());
            println!("│ Steps:              {}", report.steps);
            println!("│ Expected failures:  {}", report.expected_failures);
            println!("│ Verified:           {}", report.verified);
            println!("└──────────────────────────────────────────────────────────────────┘");
            print_stats(&report.stats);
        }
        Command::Random {
            capacity,
            ops,
            seed,
            max_size,
            granule,
            no_compaction,
        } => {
            let compaction = if no_compaction {
                CompactionMode::Disabled
            } else {
                CompactionMode::OnDemand
            };
            let params = TrafficParams {
                config: PoolConfig::new(capacity)
                    .with_granule(granule)
                    .with_compaction(compaction),
                ops,
                seed,
                max_size,
            };
            info!(?params, "starting random traffic");
            let report = random::run(&params)?;

            println!("┌─ RANDOM TRAFFIC ─────────────────────────────────────────────────┐");
            println!("│ Seed:               {seed}");
            println!("│ Served:             {}", report.served);
            println!("│ Served by compact:  {}", report.served_by_compaction);
            println!("│ Refused:            {}", report.refused);
            println!("└──────────────────────────────────────────────────────────────────┘");
            print_stats(&report.stats);
        }
    }

    println!();
    println!("✓ All checks passed");
    Ok(())
}

fn print_stats(stats: &PoolStats) {
    println!();
    println!("┌─ POOL ───────────────────────────────────────────────────────────┐");
    println!("│ Capacity:           {} bytes", stats.capacity);
    println!("│ Used / free:        {} / {} bytes", stats.used_bytes, stats.free_bytes);
    println!("│ Peak used:          {} bytes", stats.peak_used);
    println!("│ Largest free run:   {} bytes", stats.largest_free);
    println!("│ Free extents:       {}", stats.free_extents);
    println!("│ Fragmentation:      {:.1}%", stats.fragmentation() * 100.0);
    println!("│ Live handles:       {}", stats.live_handles);
    println!("│ Allocations:        {} ({} failed)", stats.allocations, stats.failed_allocations);
    println!("│ Deallocations:      {}", stats.deallocations);
    println!(
        "│ Compactions:        {} ({} extents, {} bytes moved)",
        stats.compactions, stats.extents_moved, stats.bytes_moved
    );
    println!("└──────────────────────────────────────────────────────────────────┘");
}
