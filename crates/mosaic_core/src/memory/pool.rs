//! # Pool Allocator
//!
//! Fixed-capacity, variable-size allocator with relocating compaction.

use std::fmt;
use std::ptr::NonNull;

use super::arena::Arena;
use super::engine::AllocationEngine;
use super::extent::Extent;
use super::handle::PoolHandle;
use super::stats::{CompactionReport, PoolStats};
use crate::config::PoolConfig;
use crate::error::PoolResult;

/// A pool allocator for byte ranges of caller-chosen size.
///
/// All memory is reserved once, at construction. Allocations are placed
/// first-fit; when free space exists but is split into pieces that are
/// each too small, live allocations are slid toward the start of the arena
/// to make room. Their bytes move with them and their handles keep working.
///
/// # Addresses
///
/// Handles are the only stable identity. An address or slice obtained from
/// [`resolve`](Self::resolve) or [`bytes`](Self::bytes) is valid until the
/// next call that may allocate; resolve again before each access.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap it in a
/// [`SharedPool`](crate::SharedPool).
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = PoolAllocator::new(1024);
///
/// let handle = pool.allocate(24)?;
/// pool.bytes_mut(handle)?.fill(0x5a);
///
/// pool.deallocate(handle)?;
/// ```
pub struct PoolAllocator {
    /// The backing bytes.
    arena: Arena,
    /// Extents, handles and placement policy.
    engine: AllocationEngine,
    config: PoolConfig,
}

impl PoolAllocator {
    /// Creates a byte-exact pool of `capacity` bytes with on-demand compaction.
    ///
    /// All memory is pre-allocated upfront. A zero capacity is allowed; every
    /// allocation from such a pool fails.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Arena size in bytes
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::build(PoolConfig::new(capacity))
    }

    /// Creates a pool from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`](crate::PoolError::InvalidConfig)
    /// if the configuration does not validate.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PoolConfig) -> Self {
        Self {
            arena: Arena::new(config.capacity),
            engine: AllocationEngine::new(&config),
            config,
        }
    }

    /// The configuration this pool was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Allocation granularity in bytes.
    #[inline]
    #[must_use]
    pub const fn granule(&self) -> usize {
        self.engine.granule()
    }

    /// Returns the number of bytes held by live allocations.
    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.capacity() - self.free_bytes()
    }

    /// Returns the number of free bytes, fragmented or not.
    #[inline]
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.engine.table().free_bytes()
    }

    /// Length of the largest free extent.
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.engine.table().largest_free()
    }

    /// Returns the number of live allocations.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.engine.registry().live()
    }

    /// Allocates `size` bytes of unspecified content.
    ///
    /// Tries a direct first fit, then at most one compaction pass.
    ///
    /// # Arguments
    ///
    /// * `size` - Number of bytes; zero still reserves one granule
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if
    /// `size` exceeds the capacity or the free bytes do not add up to it.
    /// The pool is unchanged on failure.
    pub fn allocate(&mut self, size: usize) -> PoolResult<PoolHandle> {
        self.engine.allocate(&mut self.arena, size)
    }

    /// Frees an allocation and invalidates its handle.
    ///
    /// Free neighbours are merged immediately; no other allocation moves.
    /// Deallocating [`PoolHandle::NULL`] is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::StaleHandle`](crate::PoolError::StaleHandle) on
    /// double free and [`PoolError::UnknownHandle`](crate::PoolError::UnknownHandle)
    /// for a handle this pool never issued.
    pub fn deallocate(&mut self, handle: PoolHandle) -> PoolResult<()> {
        self.engine.deallocate(handle).map(|_| ())
    }

    /// Checks if the handle refers to a live allocation of this pool.
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.engine.registry().resolve(handle).is_ok()
    }

    /// Current address of the allocation, for reading only.
    ///
    /// The pointer is derived from a shared borrow; writing through it is
    /// undefined behaviour. Use [`resolve_mut`](Self::resolve_mut) to get an
    /// address to construct values at. The address is only meaningful until
    /// the next call that may allocate.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn resolve(&self, handle: PoolHandle) -> PoolResult<NonNull<u8>> {
        let bytes = self.bytes(handle)?;
        Ok(NonNull::from(bytes).cast::<u8>())
    }

    /// Current address of the allocation, valid for reads and writes of
    /// [`len_of`](Self::len_of) bytes.
    ///
    /// The address is only meaningful until the next call that may allocate,
    /// and must not be used while any slice borrowed from the pool is alive.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn resolve_mut(&mut self, handle: PoolHandle) -> PoolResult<NonNull<u8>> {
        let bytes = self.bytes_mut(handle)?;
        Ok(NonNull::from(bytes).cast::<u8>())
    }

    /// Current offset of the allocation from the start of the arena.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn offset_of(&self, handle: PoolHandle) -> PoolResult<usize> {
        Ok(self.engine.resolve(handle)?.offset)
    }

    /// Length of the allocation, which is the request rounded up to the granule.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn len_of(&self, handle: PoolHandle) -> PoolResult<usize> {
        Ok(self.engine.resolve(handle)?.length)
    }

    /// Borrows the allocation's bytes.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn bytes(&self, handle: PoolHandle) -> PoolResult<&[u8]> {
        let extent = self.engine.resolve(handle)?;
        self.arena
            .range(extent.offset, extent.length)
            .ok_or_else(|| out_of_arena(&extent))
    }

    /// Mutably borrows the allocation's bytes.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles.
    pub fn bytes_mut(&mut self, handle: PoolHandle) -> PoolResult<&mut [u8]> {
        let extent = self.engine.resolve(handle)?;
        self.arena
            .range_mut(extent.offset, extent.length)
            .ok_or_else(|| out_of_arena(&extent))
    }

    /// Compacts the pool now, leaving all free space as one trailing run.
    ///
    /// `allocate` does this on its own when needed; an explicit pass is
    /// useful before a burst of large requests.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`](crate::PoolError::Corrupted) if the
    /// bookkeeping is inconsistent.
    pub fn compact(&mut self) -> PoolResult<CompactionReport> {
        self.engine.compact(&mut self.arena)
    }

    /// Frees every allocation at once.
    ///
    /// All outstanding handles become stale. Arena bytes are not cleared.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// All extents, free and allocated, in ascending offset order.
    #[must_use]
    pub fn extents(&self) -> &[Extent] {
        self.engine.table().as_slice()
    }

    /// Iterates over all live allocations in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &[u8])> {
        let bytes = self.arena.bytes();
        self.extents().iter().filter_map(move |extent| {
            let handle = extent.handle()?;
            Some((handle, &bytes[extent.offset..extent.end()]))
        })
    }

    /// Snapshot of utilisation and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let table = self.engine.table();
        let counters = self.engine.counters();
        PoolStats {
            capacity: self.capacity(),
            used_bytes: self.used_bytes(),
            free_bytes: table.free_bytes(),
            largest_free: table.largest_free(),
            free_extents: table.free_extent_count(),
            live_handles: self.live_count(),
            peak_used: counters.peak_used,
            allocations: counters.allocations,
            deallocations: counters.deallocations,
            failed_allocations: counters.failed_allocations,
            compactions: counters.compactions,
            extents_moved: counters.extents_moved,
            bytes_moved: counters.bytes_moved,
        }
    }

    /// Verifies every bookkeeping invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`](crate::PoolError::Corrupted)
    /// describing the first violation found.
    pub fn validate(&self) -> PoolResult<()> {
        self.engine.check()
    }

    pub(crate) fn engine(&self) -> &AllocationEngine {
        &self.engine
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("capacity", &self.capacity())
            .field("granule", &self.granule())
            .field("used_bytes", &self.used_bytes())
            .field("live", &self.live_count())
            .field("extents", &self.extents().len())
            .finish_non_exhaustive()
    }
}

fn out_of_arena(extent: &Extent) -> crate::PoolError {
    crate::PoolError::Corrupted(format!("extent {extent:?} lies outside the arena"))
}
