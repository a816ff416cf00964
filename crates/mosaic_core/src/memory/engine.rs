//! # Allocation Engine
//!
//! Decides where a request is placed, on top of the extent table and the
//! handle registry:
//!
//! 1. **Direct fit** - first Free extent (lowest offset) that is large enough.
//! 2. **Compaction** - if no single extent fits but the free bytes add up,
//!    slide every live extent toward offset 0 and retry once.
//! 3. **Out of memory** - otherwise, without touching any state.
//!
//! Requests larger than the arena fail before any search.

use super::arena::Arena;
use super::extent::{Extent, ExtentTable};
use super::handle::{HandleRegistry, PoolHandle};
use super::stats::{CompactionReport, Counters};
use crate::config::{CompactionMode, PoolConfig};
use crate::error::{PoolError, PoolResult};

/// Placement policy and bookkeeping for one arena.
///
/// The engine never owns the arena; callers lend it for the calls that
/// may move bytes.
#[derive(Debug)]
pub struct AllocationEngine {
    table: ExtentTable,
    registry: HandleRegistry,
    granule: usize,
    compaction: CompactionMode,
    counters: Counters,
}

impl AllocationEngine {
    /// Creates an engine managing `config.capacity` bytes.
    ///
    /// The configuration is assumed to be validated.
    #[must_use]
    pub fn new(config: &PoolConfig) -> Self {
        let reserve = (config.capacity / config.granule.max(1)).min(1024);
        Self {
            table: ExtentTable::new(config.capacity),
            registry: HandleRegistry::with_capacity(reserve),
            granule: config.granule.max(1),
            compaction: config.compaction,
            counters: Counters::default(),
        }
    }

    /// The extent table.
    #[inline]
    #[must_use]
    pub const fn table(&self) -> &ExtentTable {
        &self.table
    }

    /// The handle registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Allocation granularity in bytes.
    #[inline]
    #[must_use]
    pub const fn granule(&self) -> usize {
        self.granule
    }

    /// Extent length reserved for a request of `size` bytes: at least one
    /// byte, rounded up to the granule. None on overflow.
    #[inline]
    #[must_use]
    pub fn extent_length(&self, size: usize) -> Option<usize> {
        size.max(1).checked_next_multiple_of(self.granule)
    }

    pub(crate) const fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Reserves `size` bytes and returns a live handle.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`] if `size` exceeds the capacity or
    /// the free bytes do not add up to the request. No extent, handle or
    /// byte is modified in that case.
    pub fn allocate(&mut self, arena: &mut Arena, size: usize) -> PoolResult<PoolHandle> {
        let capacity = self.table.capacity();
        let Some(length) = self.extent_length(size).filter(|&len| len <= capacity) else {
            return Err(self.out_of_memory(size));
        };

        let offset = match self.table.first_fit(length) {
            Some(offset) => offset,
            None => {
                if self.table.free_bytes() < length || self.compaction == CompactionMode::Disabled
                {
                    return Err(self.out_of_memory(size));
                }
                self.compact(arena)?;
                self.table.first_fit(length).ok_or_else(|| {
                    PoolError::Corrupted(format!(
                        "no {length}-byte run after compaction with {} bytes free",
                        self.table.free_bytes()
                    ))
                })?
            }
        };

        let handle = self.registry.register(offset)?;
        if let Err(e) = self.table.mark_allocated(offset, length, handle) {
            self.registry.invalidate(handle)?;
            return Err(e);
        }

        self.counters.allocations += 1;
        let used = capacity - self.table.free_bytes();
        self.counters.peak_used = self.counters.peak_used.max(used);

        tracing::trace!(handle = handle.to_bits(), offset, length, "allocated");
        Ok(handle)
    }

    /// Frees the handle's extent, coalesces it with Free neighbours and
    /// invalidates the handle. Never moves other extents.
    ///
    /// # Returns
    ///
    /// The number of bytes returned to the free space; 0 for the null handle.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleHandle`] on double free, [`PoolError::UnknownHandle`]
    /// for a handle this pool never issued.
    pub fn deallocate(&mut self, handle: PoolHandle) -> PoolResult<usize> {
        if handle.is_null() {
            return Ok(0);
        }
        let extent = self.resolve(handle)?;
        let freed = self.table.mark_free(extent.offset)?;
        self.registry.invalidate(handle)?;
        self.counters.deallocations += 1;

        tracing::trace!(handle = handle.to_bits(), offset = extent.offset, freed, "deallocated");
        Ok(freed)
    }

    /// Looks up the live extent bound to `handle`.
    ///
    /// # Errors
    ///
    /// Returns the registry's error for null, stale or unknown handles, and
    /// [`PoolError::Corrupted`] if the table disagrees with the registry.
    pub fn resolve(&self, handle: PoolHandle) -> PoolResult<Extent> {
        let offset = self.registry.resolve(handle).map_err(|e| {
            if !matches!(e, PoolError::NullHandle) {
                tracing::warn!(handle = handle.to_bits(), error = %e, "invalid handle use");
            }
            e
        })?;
        match self.table.get(offset) {
            Some(extent) if extent.handle() == Some(handle) => Ok(*extent),
            other => Err(PoolError::Corrupted(format!(
                "handle {handle:?} maps to offset {offset}, table has {other:?}"
            ))),
        }
    }

    /// Slides all live extents toward offset 0, copying their bytes and
    /// rebinding their handles, leaving one trailing free extent.
    ///
    /// Every planned move is checked against the arena and the registry
    /// before anything is touched.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] if a move falls outside the arena or
    /// a table entry is not bound to its handle. No extent, handle or byte
    /// is modified in that case.
    pub fn compact(&mut self, arena: &mut Arena) -> PoolResult<CompactionReport> {
        for relocation in self.table.relocations() {
            let in_arena = arena.range(relocation.from, relocation.length).is_some()
                && arena.range(relocation.to, relocation.length).is_some();
            if !in_arena {
                return Err(PoolError::Corrupted(format!(
                    "relocation {relocation:?} outside arena of {} bytes",
                    arena.capacity()
                )));
            }
            if self.registry.resolve(relocation.handle) != Ok(relocation.from) {
                return Err(PoolError::Corrupted(format!(
                    "relocation {relocation:?} does not match the handle registry"
                )));
            }
        }

        let registry = &mut self.registry;
        let report = self.table.compact(|relocation| {
            if !arena.copy_within(relocation.from, relocation.length, relocation.to) {
                return Err(PoolError::Corrupted(format!(
                    "relocation {relocation:?} outside arena of {} bytes",
                    arena.capacity()
                )));
            }
            registry.relocate(relocation.handle, relocation.to)
        })?;
        self.counters.record_compaction(&report);

        tracing::debug!(
            extents_moved = report.extents_moved,
            bytes_moved = report.bytes_moved,
            free_run = report.free_run,
            "compacted"
        );
        Ok(report)
    }

    /// Drops every allocation and invalidates every handle.
    pub fn reset(&mut self) {
        let live = self.registry.live();
        self.table.clear();
        self.registry.clear();
        tracing::debug!(live, "pool reset");
    }

    /// Cross-checks the extent table against the handle registry.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] describing the first violation.
    pub fn check(&self) -> PoolResult<()> {
        self.table.check()?;

        let mut allocated = 0;
        for extent in self.table.as_slice() {
            if let Some(handle) = extent.handle() {
                allocated += 1;
                let offset = self.registry.resolve(handle)?;
                if offset != extent.offset {
                    return Err(PoolError::Corrupted(format!(
                        "handle {handle:?} resolves to {offset}, extent is at {}",
                        extent.offset
                    )));
                }
                if extent.offset % self.granule != 0 {
                    return Err(PoolError::Corrupted(format!(
                        "extent at {} breaks granule {}",
                        extent.offset, self.granule
                    )));
                }
            }
        }
        if allocated != self.registry.live() {
            return Err(PoolError::Corrupted(format!(
                "{allocated} allocated extents but {} live handles",
                self.registry.live()
            )));
        }
        Ok(())
    }

    fn out_of_memory(&mut self, requested: usize) -> PoolError {
        self.counters.failed_allocations += 1;
        let free = self.table.free_bytes();
        tracing::debug!(
            requested,
            free,
            largest_free = self.table.largest_free(),
            "allocation failed"
        );
        PoolError::OutOfMemory {
            requested,
            free,
            capacity: self.table.capacity(),
        }
    }
}
