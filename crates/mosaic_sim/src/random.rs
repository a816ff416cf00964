//! # Random Traffic
//!
//! Seeded allocate/deallocate traffic against a single pool. A shadow copy
//! of every live allocation's fill byte is kept on the side and checked
//! after each step, together with the fit property: a request succeeds
//! exactly when its rounded size fits in the free bytes (or, without
//! compaction, in the largest free run).

use std::collections::HashMap;

use anyhow::{bail, Result};
use mosaic_core::{CompactionMode, PoolAllocator, PoolConfig, PoolError, PoolHandle, PoolStats};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

/// Parameters of one random run.
#[derive(Debug, Clone, Copy)]
pub struct TrafficParams {
    /// Pool configuration.
    pub config: PoolConfig,
    /// Number of operations to issue.
    pub ops: usize,
    /// Seed for the traffic generator.
    pub seed: u64,
    /// Largest request size, inclusive.
    pub max_size: usize,
}

/// Outcome of a random run.
#[derive(Debug)]
pub struct TrafficReport {
    /// Requests that were served.
    pub served: u64,
    /// Requests refused with out-of-memory; all of them were correct refusals.
    pub refused: u64,
    /// Served requests that needed compaction.
    pub served_by_compaction: u64,
    /// Pool statistics after the last step.
    pub stats: PoolStats,
}

/// Issues `params.ops` random operations and checks every outcome.
pub fn run(params: &TrafficParams) -> Result<TrafficReport> {
    let config = params.config;
    let mut pool = PoolAllocator::with_config(config)?;
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut live: HashMap<PoolHandle, (u8, usize)> = HashMap::new();
    let mut order: Vec<PoolHandle> = Vec::new();
    let mut report = TrafficReport {
        served: 0,
        refused: 0,
        served_by_compaction: 0,
        stats: pool.stats(),
    };

    debug!(seed = params.seed, ops = params.ops, "random traffic");

    for step in 0..params.ops {
        let free_before = pool.free_bytes();

        if order.is_empty() || rng.gen_bool(0.55) {
            let size = rng.gen_range(0..=params.max_size);
            let needed = size.max(1).saturating_add(config.granule - 1) / config.granule
                * config.granule;
            let fits = match config.compaction {
                CompactionMode::OnDemand => needed <= free_before,
                CompactionMode::Disabled => needed <= pool.largest_free(),
            };
            let direct = needed <= pool.largest_free();

            match pool.allocate(size) {
                Ok(handle) => {
                    if !fits {
                        bail!("step {step}: {size} bytes served with {free_before} free");
                    }
                    let fill = rng.gen::<u8>();
                    pool.bytes_mut(handle)?.fill(fill);
                    live.insert(handle, (fill, size));
                    order.push(handle);
                    report.served += 1;
                    if !direct {
                        report.served_by_compaction += 1;
                    }
                }
                Err(PoolError::OutOfMemory { .. }) => {
                    if fits {
                        bail!("step {step}: {size} bytes refused with {free_before} free");
                    }
                    report.refused += 1;
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let victim = order.swap_remove(rng.gen_range(0..order.len()));
            trace!(step, ?victim, "free");
            pool.deallocate(victim)?;
            live.remove(&victim);
        }

        pool.validate()?;
        for (&handle, &(fill, size)) in &live {
            if pool.bytes(handle)?[..size].iter().any(|&b| b != fill) {
                bail!("step {step}: contents of {handle:?} changed");
            }
        }
    }

    report.stats = pool.stats();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(config: PoolConfig, seed: u64) -> TrafficParams {
        TrafficParams {
            config,
            ops: 2_000,
            seed,
            max_size: 48,
        }
    }

    #[test]
    fn test_traffic_holds_fit_property() {
        let report = run(&params(PoolConfig::new(512), 7)).unwrap();
        assert!(report.served > 0);
        assert_eq!(report.stats.compactions, report.served_by_compaction);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let a = run(&params(PoolConfig::new(256), 3)).unwrap();
        let b = run(&params(PoolConfig::new(256), 3)).unwrap();
        assert_eq!(a.served, b.served);
        assert_eq!(a.refused, b.refused);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_disabled_compaction_never_moves() {
        let config = PoolConfig::new(256).with_compaction(CompactionMode::Disabled);
        let report = run(&params(config, 11)).unwrap();
        assert_eq!(report.served_by_compaction, 0);
        assert_eq!(report.stats.extents_moved, 0);
    }
}
