//! # Handle Registry
//!
//! Handles are lightweight identifiers consisting of:
//! - An index into the registry's slot table
//! - A generation counter for detecting stale references
//!
//! The registry is the only place where relocation of an extent is
//! reflected back to callers. A slot's generation is bumped every time its
//! handle is invalidated, so a deallocated handle can never resolve again,
//! even after the slot has been reused.

use crate::error::{PoolError, PoolResult};

/// Stable logical identity of one live allocation.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the handle registry
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// A handle never carries an address. Resolve it through the pool right
/// before each access; compaction may have moved the bytes since.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PoolHandle(u64);

impl PoolHandle {
    /// Null/empty handle. Deallocating it is a no-op.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Raw 64-bit representation, e.g. for logging or external maps.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from [`PoolHandle::to_bits`].
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl Default for PoolHandle {
    fn default() -> Self {
        Self::NULL
    }
}

/// One registry slot.
#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Generation of the handle currently (or next) issued from this slot.
    generation: u32,
    /// Offset of the bound extent while live.
    offset: Option<usize>,
}

/// Maps handle identities to the current offset of their extent.
///
/// Lifecycle of an entry: created by [`register`](Self::register), updated
/// in place by [`relocate`](Self::relocate) during compaction, removed by
/// [`invalidate`](Self::invalidate). There is no resurrection.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    slots: Vec<Slot>,
    /// Free list - indices of reusable slots.
    free_list: Vec<u32>,
    live: usize,
}

impl HandleRegistry {
    /// Creates an empty registry with room for `reserve` handles before
    /// the slot table has to grow.
    #[must_use]
    pub fn with_capacity(reserve: usize) -> Self {
        Self {
            slots: Vec::with_capacity(reserve),
            free_list: Vec::with_capacity(reserve),
            live: 0,
        }
    }

    /// Number of live handles.
    #[inline]
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }

    /// Creates a new handle bound to `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] if the 32-bit index space is used up.
    pub fn register(&mut self, offset: usize) -> PoolResult<PoolHandle> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                // u32::MAX is reserved so that no live handle equals NULL.
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&i| i < u32::MAX)
                    .ok_or_else(|| PoolError::Corrupted("handle index space exhausted".into()))?;
                self.slots.push(Slot {
                    generation: 0,
                    offset: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.offset = Some(offset);
        self.live += 1;

        Ok(PoolHandle::new(index, slot.generation))
    }

    /// Rebinds a live handle to the extent's new offset.
    ///
    /// Only the allocation engine calls this, while compacting.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve) if the handle is not live.
    pub fn relocate(&mut self, handle: PoolHandle, new_offset: usize) -> PoolResult<()> {
        let slot = self.live_slot_mut(handle)?;
        slot.offset = Some(new_offset);
        Ok(())
    }

    /// Returns the current offset of a live handle's extent.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NullHandle`] for [`PoolHandle::NULL`]
    /// - [`PoolError::UnknownHandle`] if this registry never issued the index
    /// - [`PoolError::StaleHandle`] if the handle has been invalidated
    pub fn resolve(&self, handle: PoolHandle) -> PoolResult<usize> {
        if handle.is_null() {
            return Err(PoolError::NullHandle);
        }
        let slot = self
            .slots
            .get(handle.index() as usize)
            .ok_or(PoolError::UnknownHandle(handle))?;
        match slot.offset {
            Some(offset) if slot.generation == handle.generation() => Ok(offset),
            _ => Err(PoolError::StaleHandle(handle)),
        }
    }

    /// Ends the handle's validity period and returns the offset it was bound to.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve); a second invalidation of the
    /// same handle is reported as [`PoolError::StaleHandle`].
    pub fn invalidate(&mut self, handle: PoolHandle) -> PoolResult<usize> {
        let slot = self.live_slot_mut(handle)?;
        let offset = slot.offset.take().ok_or(PoolError::StaleHandle(handle))?;
        let retire = Self::bump(slot);
        self.live -= 1;
        if !retire {
            self.free_list.push(handle.index());
        }
        Ok(offset)
    }

    /// Invalidates every live handle at once.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            let retire = if slot.offset.take().is_some() {
                Self::bump(slot)
            } else {
                slot.generation == u32::MAX
            };
            if !retire {
                // Slot count never exceeds u32::MAX, see `register`.
                self.free_list.push(index as u32);
            }
        }
        self.live = 0;
    }

    /// Iterates over all live handles with their current offsets.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, usize)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let handle = PoolHandle::new(index as u32, slot.generation);
            slot.offset.map(|offset| (handle, offset))
        })
    }

    fn live_slot_mut(&mut self, handle: PoolHandle) -> PoolResult<&mut Slot> {
        if handle.is_null() {
            return Err(PoolError::NullHandle);
        }
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .ok_or(PoolError::UnknownHandle(handle))?;
        if slot.offset.is_none() || slot.generation != handle.generation() {
            return Err(PoolError::StaleHandle(handle));
        }
        Ok(slot)
    }

    /// Advances the slot's generation. Returns `true` when the generation
    /// space is exhausted and the slot must be retired instead of reused.
    fn bump(slot: &mut Slot) -> bool {
        if slot.generation == u32::MAX {
            return true;
        }
        slot.generation += 1;
        slot.generation == u32::MAX
    }
}
