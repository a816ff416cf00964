//! # Arena
//!
//! The single fixed-length byte buffer backing every allocation of a pool.

/// Alignment of the arena's base address in bytes.
///
/// Storage is reserved as 64-bit words, so the first byte is always
/// 8-byte aligned.
pub const ARENA_ALIGN: usize = std::mem::align_of::<u64>();

/// A fixed-capacity byte buffer, reserved once and never resized.
///
/// The arena knows nothing about extents or handles. It hands out byte
/// ranges by offset and moves bytes when compaction asks it to.
///
/// # Thread Safety
///
/// The arena is exclusively owned by one pool and shares its threading
/// rules: wrap the owning pool in a mutex to use it from several threads.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = Arena::new(1024);
/// arena.range_mut(0, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
/// arena.copy_within(0, 4, 100);
/// ```
#[derive(Debug)]
pub struct Arena {
    /// The backing storage, word-sized for alignment.
    words: Box<[u64]>,
    /// Total capacity in bytes.
    capacity: usize,
}

impl Arena {
    /// Creates a zeroed arena of exactly `capacity` bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let word_count = capacity.div_ceil(ARENA_ALIGN);
        Self {
            words: vec![0u64; word_count].into_boxed_slice(),
            capacity,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The whole arena as bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.capacity]
    }

    /// The whole arena as mutable bytes.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.capacity]
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Returns
    ///
    /// The byte range, or None if it does not lie inside the arena.
    #[inline]
    #[must_use]
    pub fn range(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.bytes().get(offset..end)
    }

    /// Mutably borrows `len` bytes starting at `offset`.
    #[inline]
    pub fn range_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.bytes_mut().get_mut(offset..end)
    }

    /// Copies `len` bytes from `src` to `dst`. The ranges may overlap.
    ///
    /// # Returns
    ///
    /// `true` if the bytes were moved, `false` if either range falls
    /// outside the arena (nothing is copied then).
    pub fn copy_within(&mut self, src: usize, len: usize, dst: usize) -> bool {
        let fits = |start: usize| start.checked_add(len).is_some_and(|end| end <= self.capacity);
        if !fits(src) || !fits(dst) {
            return false;
        }
        self.bytes_mut().copy_within(src..src + len, dst);
        true
    }
}
