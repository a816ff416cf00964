//! # Extent Table
//!
//! Offset-ordered partition of the arena into adjacent, non-overlapping
//! extents, each tagged Free or Allocated.
//!
//! The table upholds, after every mutation:
//! - extents are sorted by offset and contiguous
//! - together they cover exactly `[0, capacity)`
//! - no extent is empty
//! - no two neighbours are both Free (coalescing is eager)

use super::handle::PoolHandle;
use super::stats::CompactionReport;
use crate::error::{PoolError, PoolResult};

/// Whether an extent is available or bound to a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtentState {
    /// Available for allocation.
    Free,
    /// Owned by the allocation behind this handle.
    Allocated(PoolHandle),
}

/// A contiguous run of arena bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    /// Byte offset from the start of the arena.
    pub offset: usize,
    /// Length in bytes, never zero.
    pub length: usize,
    /// Free or Allocated.
    pub state: ExtentState,
}

impl Extent {
    /// One past the last byte of this extent.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Checks if the extent is free.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.state, ExtentState::Free)
    }

    /// The owning handle, if allocated.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> Option<PoolHandle> {
        match self.state {
            ExtentState::Free => None,
            ExtentState::Allocated(handle) => Some(handle),
        }
    }
}

/// One extent moved by compaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// Handle of the moved allocation.
    pub handle: PoolHandle,
    /// Offset before the move.
    pub from: usize,
    /// Offset after the move, always lower than `from`.
    pub to: usize,
    /// Bytes to move.
    pub length: usize,
}

/// The partition of one arena.
#[derive(Debug)]
pub struct ExtentTable {
    extents: Vec<Extent>,
    capacity: usize,
    /// Sum of all Free extent lengths, kept in step with every mutation.
    free_bytes: usize,
}

impl ExtentTable {
    /// Creates a table with one Free extent spanning `capacity` bytes
    /// (no extents at all for an empty arena).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut extents = Vec::with_capacity(capacity.min(1024) + 1);
        if capacity > 0 {
            extents.push(Extent {
                offset: 0,
                length: capacity,
                state: ExtentState::Free,
            });
        }
        Self {
            extents,
            capacity,
            free_bytes: capacity,
        }
    }

    /// Total bytes covered by the table.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes across all Free extents.
    #[inline]
    #[must_use]
    pub const fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// All extents in ascending offset order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Extent] {
        &self.extents
    }

    /// Length of the largest Free extent.
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.free_extents().map(|e| e.length).max().unwrap_or(0)
    }

    /// Number of Free extents.
    #[must_use]
    pub fn free_extent_count(&self) -> usize {
        self.free_extents().count()
    }

    /// The extent starting exactly at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<&Extent> {
        self.index_of(offset).map(|i| &self.extents[i])
    }

    /// First-fit search: offset of the lowest Free extent of at least `length` bytes.
    #[must_use]
    pub fn first_fit(&self, length: usize) -> Option<usize> {
        self.free_extents()
            .find(|e| e.length >= length)
            .map(|e| e.offset)
    }

    /// Splits the Free extent at `offset` into an Allocated prefix of
    /// `length` bytes bound to `handle` and, if anything is left over,
    /// a trailing Free extent.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] if no Free extent of at least
    /// `length` bytes starts at `offset`, or `length` is zero.
    pub fn mark_allocated(
        &mut self,
        offset: usize,
        length: usize,
        handle: PoolHandle,
    ) -> PoolResult<()> {
        let index = self
            .index_of(offset)
            .ok_or_else(|| PoolError::Corrupted(format!("no extent at offset {offset}")))?;
        let extent = &mut self.extents[index];
        if !extent.is_free() || extent.length < length || length == 0 {
            return Err(PoolError::Corrupted(format!(
                "cannot place {length} bytes into {extent:?}"
            )));
        }

        let remainder = extent.length - length;
        extent.length = length;
        extent.state = ExtentState::Allocated(handle);
        if remainder > 0 {
            self.extents.insert(
                index + 1,
                Extent {
                    offset: offset + length,
                    length: remainder,
                    state: ExtentState::Free,
                },
            );
        }
        self.free_bytes -= length;

        debug_assert!(self.check().is_ok());
        Ok(())
    }

    /// Flips the Allocated extent at `offset` to Free and merges it with a
    /// Free predecessor and/or successor.
    ///
    /// # Returns
    ///
    /// The length of the extent that was freed.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] if no Allocated extent starts at `offset`.
    pub fn mark_free(&mut self, offset: usize) -> PoolResult<usize> {
        let mut index = self
            .index_of(offset)
            .ok_or_else(|| PoolError::Corrupted(format!("no extent at offset {offset}")))?;
        let extent = &mut self.extents[index];
        if extent.is_free() {
            return Err(PoolError::Corrupted(format!(
                "extent at offset {offset} is already free"
            )));
        }
        extent.state = ExtentState::Free;
        let freed = extent.length;

        if self.extents.get(index + 1).is_some_and(Extent::is_free) {
            let next = self.extents.remove(index + 1);
            self.extents[index].length += next.length;
        }
        if index > 0 && self.extents[index - 1].is_free() {
            let current = self.extents.remove(index);
            index -= 1;
            self.extents[index].length += current.length;
        }
        self.free_bytes += freed;

        debug_assert!(self.check().is_ok());
        Ok(freed)
    }

    /// Slides every Allocated extent toward offset 0, preserving their
    /// relative order, and leaves all free space as one trailing extent.
    ///
    /// `relocate` is called once per extent that changes offset, in
    /// ascending order, before the table records the new offset. Moves
    /// always go to a lower offset, so copying bytes in callback order
    /// never overwrites data that has yet to move.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `relocate`. The table is
    /// left partially compacted in that case; callers that need an
    /// all-or-nothing pass check [`relocations`](Self::relocations) first.
    pub fn compact<F>(&mut self, mut relocate: F) -> PoolResult<CompactionReport>
    where
        F: FnMut(Relocation) -> PoolResult<()>,
    {
        self.extents.retain(|e| !e.is_free());

        let mut report = CompactionReport::default();
        let mut cursor = 0;
        for extent in &mut self.extents {
            if extent.offset != cursor {
                if let Some(handle) = extent.handle() {
                    relocate(Relocation {
                        handle,
                        from: extent.offset,
                        to: cursor,
                        length: extent.length,
                    })?;
                }
                report.extents_moved += 1;
                report.bytes_moved += extent.length;
                extent.offset = cursor;
            }
            cursor += extent.length;
        }

        if cursor < self.capacity {
            self.extents.push(Extent {
                offset: cursor,
                length: self.capacity - cursor,
                state: ExtentState::Free,
            });
        }
        report.free_run = self.capacity - cursor;

        debug_assert!(self.check().is_ok());
        Ok(report)
    }

    /// The moves [`compact`](Self::compact) would make, in the order it
    /// would make them. The table is not modified.
    #[must_use]
    pub fn relocations(&self) -> Vec<Relocation> {
        let mut moves = Vec::new();
        let mut cursor = 0;
        for extent in &self.extents {
            let Some(handle) = extent.handle() else {
                continue;
            };
            if extent.offset != cursor {
                moves.push(Relocation {
                    handle,
                    from: extent.offset,
                    to: cursor,
                    length: extent.length,
                });
            }
            cursor += extent.length;
        }
        moves
    }

    /// Replaces everything with a single Free extent.
    pub fn clear(&mut self) {
        self.extents.clear();
        if self.capacity > 0 {
            self.extents.push(Extent {
                offset: 0,
                length: self.capacity,
                state: ExtentState::Free,
            });
        }
        self.free_bytes = self.capacity;
    }

    /// Verifies every table invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Corrupted`] describing the first violation found.
    pub fn check(&self) -> PoolResult<()> {
        let mut expected_offset = 0;
        let mut free = 0;
        let mut previous_free = false;

        for extent in &self.extents {
            if extent.offset != expected_offset {
                return Err(PoolError::Corrupted(format!(
                    "gap or overlap at offset {expected_offset}: found {extent:?}"
                )));
            }
            if extent.length == 0 {
                return Err(PoolError::Corrupted(format!("empty extent {extent:?}")));
            }
            if extent.is_free() {
                if previous_free {
                    return Err(PoolError::Corrupted(format!(
                        "uncoalesced free neighbours at offset {}",
                        extent.offset
                    )));
                }
                free += extent.length;
            }
            previous_free = extent.is_free();
            expected_offset = extent.end();
        }

        if expected_offset != self.capacity {
            return Err(PoolError::Corrupted(format!(
                "extents cover {expected_offset} of {} bytes",
                self.capacity
            )));
        }
        if free != self.free_bytes {
            return Err(PoolError::Corrupted(format!(
                "free byte counter {} disagrees with table ({free})",
                self.free_bytes
            )));
        }
        Ok(())
    }

    fn free_extents(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter().filter(|e| e.is_free())
    }

    fn index_of(&self, offset: usize) -> Option<usize> {
        self.extents.binary_search_by_key(&offset, |e| e.offset).ok()
    }
}
