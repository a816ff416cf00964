//! # Scripted Workloads
//!
//! A workload is a TOML file with a `[pool]` table and an ordered list of
//! `[[op]]` entries:
//!
//! ```toml
//! [pool]
//! capacity = 105
//!
//! [[op]]
//! kind = "alloc"
//! tag = "big"
//! size = 24
//! fill = 0xee
//!
//! [[op]]
//! kind = "verify"
//! tag = "big"
//! ```
//!
//! Allocations are named by tag. Every allocation is filled with its
//! `fill` byte, and `verify` checks that the bytes are still there after
//! whatever frees and compactions happened in between.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use mosaic_core::{PoolAllocator, PoolConfig, PoolError, PoolHandle, PoolStats};
use serde::Deserialize;
use tracing::{debug, info};

/// Parsed workload file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    /// Pool the operations run against.
    pub pool: PoolConfig,
    /// Operations, in order.
    #[serde(default, rename = "op")]
    pub ops: Vec<Op>,
}

/// One scripted step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Op {
    /// Allocate `size` bytes under `tag` and fill them.
    Alloc {
        /// Name the allocation is referred to by.
        tag: String,
        /// Requested size in bytes.
        size: usize,
        /// Byte written over the whole allocation.
        #[serde(default)]
        fill: u8,
        /// The request is expected to fail with out-of-memory.
        #[serde(default, rename = "expect-oom")]
        expect_oom: bool,
    },
    /// Release the allocation under `tag`.
    Free {
        /// Allocation to release.
        tag: String,
    },
    /// Check that the allocation under `tag` still holds its fill byte.
    Verify {
        /// Allocation to check.
        tag: String,
    },
    /// Run an explicit compaction.
    Compact,
}

impl Workload {
    /// Parses a workload from TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let workload: Self = toml::from_str(source).context("invalid workload")?;
        workload.pool.validate()?;
        Ok(workload)
    }

    /// Reads and parses a workload file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in {}", path.display()))
    }
}

/// Summary of a completed replay.
#[derive(Debug)]
pub struct ReplayReport {
    /// Operations executed.
    pub steps: usize,
    /// Allocations that failed as the script expected.
    pub expected_failures: usize,
    /// Verify operations that passed.
    pub verified: usize,
    /// Pool statistics after the last step.
    pub stats: PoolStats,
}

struct Tagged {
    handle: PoolHandle,
    size: usize,
    fill: u8,
}

/// Runs every operation of `workload` against a fresh pool.
///
/// Stops at the first operation whose outcome differs from the script or
/// that leaves the pool in an inconsistent state.
pub fn replay(workload: &Workload) -> Result<ReplayReport> {
    let mut pool = PoolAllocator::with_config(workload.pool)?;
    let mut tags: HashMap<String, Tagged> = HashMap::new();
    let mut expected_failures = 0;
    let mut verified = 0;

    info!(
        capacity = workload.pool.capacity,
        ops = workload.ops.len(),
        "replaying workload"
    );

    for (step, op) in workload.ops.iter().enumerate() {
        debug!(step, ?op, "op");
        match op {
            Op::Alloc {
                tag,
                size,
                fill,
                expect_oom,
            } => match (pool.allocate(*size), *expect_oom) {
                (Ok(handle), false) => {
                    pool.bytes_mut(handle)?.fill(*fill);
                    let previous = tags.insert(
                        tag.clone(),
                        Tagged {
                            handle,
                            size: *size,
                            fill: *fill,
                        },
                    );
                    if previous.is_some() {
                        bail!("step {step}: tag {tag:?} is already live");
                    }
                }
                (Ok(_), true) => bail!("step {step}: {size} bytes for {tag:?} should not fit"),
                (Err(PoolError::OutOfMemory { .. }), true) => expected_failures += 1,
                (Err(e), _) => {
                    return Err(e).with_context(|| format!("step {step}: alloc {tag:?}"));
                }
            },
            Op::Free { tag } => {
                let entry = tags
                    .remove(tag)
                    .with_context(|| format!("step {step}: unknown tag {tag:?}"))?;
                pool.deallocate(entry.handle)
                    .with_context(|| format!("step {step}: free {tag:?}"))?;
            }
            Op::Verify { tag } => {
                let entry = tags
                    .get(tag)
                    .with_context(|| format!("step {step}: unknown tag {tag:?}"))?;
                let bytes = pool.bytes(entry.handle)?;
                if bytes.len() < entry.size || bytes[..entry.size].iter().any(|&b| b != entry.fill)
                {
                    bail!("step {step}: contents of {tag:?} changed");
                }
                verified += 1;
            }
            Op::Compact => {
                let report = pool.compact()?;
                debug!(step, moved = report.extents_moved, "compacted");
            }
        }
        pool.validate()
            .with_context(|| format!("step {step}: pool inconsistent"))?;
    }

    Ok(ReplayReport {
        steps: workload.ops.len(),
        expected_failures,
        verified,
        stats: pool.stats(),
    })
}
