//! # Pool Statistics
//!
//! Usage snapshots and lifetime counters.

/// Outcome of one compaction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Allocated extents that changed offset.
    pub extents_moved: usize,
    /// Bytes copied to new offsets.
    pub bytes_moved: usize,
    /// Length of the single trailing free extent afterwards.
    pub free_run: usize,
}

/// Counters accumulated over the lifetime of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub allocations: u64,
    pub deallocations: u64,
    pub failed_allocations: u64,
    pub compactions: u64,
    pub extents_moved: u64,
    pub bytes_moved: u64,
    pub peak_used: usize,
}

impl Counters {
    pub(crate) fn record_compaction(&mut self, report: &CompactionReport) {
        self.compactions += 1;
        self.extents_moved += report.extents_moved as u64;
        self.bytes_moved += report.bytes_moved as u64;
    }
}

/// Snapshot of pool utilisation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Arena capacity in bytes.
    pub capacity: usize,
    /// Bytes held by live allocations.
    pub used_bytes: usize,
    /// Bytes across all free extents.
    pub free_bytes: usize,
    /// Length of the largest free extent.
    pub largest_free: usize,
    /// Number of free extents.
    pub free_extents: usize,
    /// Number of live handles.
    pub live_handles: usize,
    /// Highest `used_bytes` observed.
    pub peak_used: usize,
    /// Successful allocations.
    pub allocations: u64,
    /// Successful deallocations (null handles excluded).
    pub deallocations: u64,
    /// Allocations that failed with out-of-memory.
    pub failed_allocations: u64,
    /// Compaction passes run.
    pub compactions: u64,
    /// Extents relocated over all compactions.
    pub extents_moved: u64,
    /// Bytes copied over all compactions.
    pub bytes_moved: u64,
}

impl PoolStats {
    /// Fragmentation ratio.
    ///
    /// Defined as `1 - largest_free / free_bytes`: 0.0 when all free space
    /// is one run, approaching 1.0 as it splinters.
    #[must_use]
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.largest_free as f64 / self.free_bytes as f64;
        1.0 - ratio
    }
}
