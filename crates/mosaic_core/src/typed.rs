//! # Typed Placement
//!
//! Places plain-old-data values into pool allocations.
//!
//! The pool itself only knows bytes. This layer sits strictly on top of
//! [`PoolAllocator::bytes`] / [`PoolAllocator::bytes_mut`]: it sizes the
//! request from the type, copies the value in, and copies it back out.
//! Reads and writes are unaligned copies, so they work for any granule;
//! [`PoolAllocator::try_ref`] hands out a real reference and therefore
//! checks alignment.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use crate::error::{PoolError, PoolResult};
use crate::memory::{PoolAllocator, PoolHandle};

/// Handle to an allocation holding one `T`.
pub struct TypedHandle<T> {
    raw: PoolHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedHandle<T> {
    /// Wraps a raw handle. The allocation is checked against `T` on access.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: PoolHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The untyped handle.
    #[inline]
    #[must_use]
    pub const fn into_raw(self) -> PoolHandle {
        self.raw
    }
}

impl<T> Clone for TypedHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedHandle<T> {}

impl<T> PartialEq for TypedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for TypedHandle<T> {}

impl<T> Hash for TypedHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for TypedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedHandle")
            .field(&std::any::type_name::<T>())
            .field(&self.raw)
            .finish()
    }
}

impl PoolAllocator {
    /// Allocates room for one `T` and moves `value` into it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`] like [`allocate`](Self::allocate).
    pub fn emplace<T: Pod>(&mut self, value: T) -> PoolResult<TypedHandle<T>> {
        let raw = self.allocate(size_of::<T>())?;
        let handle = TypedHandle::from_raw(raw);
        self.write(handle, value)?;
        Ok(handle)
    }

    /// Copies the value out.
    ///
    /// # Errors
    ///
    /// Fails for invalid handles and allocations not sized for `T`.
    pub fn read<T: Pod>(&self, handle: TypedHandle<T>) -> PoolResult<T> {
        let bytes = self.typed_bytes::<T>(handle.raw)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Overwrites the stored value.
    ///
    /// # Errors
    ///
    /// Fails for invalid handles and allocations not sized for `T`.
    pub fn write<T: Pod>(&mut self, handle: TypedHandle<T>, value: T) -> PoolResult<()> {
        let bytes = self.typed_bytes_mut::<T>(handle.raw)?;
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Borrows the stored value in place.
    ///
    /// # Errors
    ///
    /// Besides invalid handles and size mismatches, returns
    /// [`PoolError::Cast`] if the current address is not aligned for `T`.
    pub fn try_ref<T: Pod>(&self, handle: TypedHandle<T>) -> PoolResult<&T> {
        let bytes = self.typed_bytes::<T>(handle.raw)?;
        bytemuck::try_from_bytes(bytes).map_err(PoolError::Cast)
    }

    /// Mutably borrows the stored value in place.
    ///
    /// # Errors
    ///
    /// Same as [`try_ref`](Self::try_ref).
    pub fn try_mut<T: Pod>(&mut self, handle: TypedHandle<T>) -> PoolResult<&mut T> {
        let bytes = self.typed_bytes_mut::<T>(handle.raw)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(PoolError::Cast)
    }

    /// Copies the value out and frees the allocation.
    ///
    /// # Errors
    ///
    /// Fails like [`read`](Self::read); nothing is freed then.
    pub fn take<T: Pod>(&mut self, handle: TypedHandle<T>) -> PoolResult<T> {
        let value = self.read(handle)?;
        self.deallocate(handle.raw)?;
        Ok(value)
    }

    fn typed_bytes<T>(&self, raw: PoolHandle) -> PoolResult<&[u8]> {
        let bytes = self.bytes(raw)?;
        self.check_typed_len::<T>(bytes.len())?;
        Ok(&bytes[..size_of::<T>()])
    }

    fn typed_bytes_mut<T>(&mut self, raw: PoolHandle) -> PoolResult<&mut [u8]> {
        self.check_typed_len::<T>(self.len_of(raw)?)?;
        Ok(&mut self.bytes_mut(raw)?[..size_of::<T>()])
    }

    /// The extent must be exactly what `emplace::<T>` would have reserved.
    fn check_typed_len<T>(&self, actual: usize) -> PoolResult<()> {
        let expected = self.engine().extent_length(size_of::<T>());
        if expected == Some(actual) {
            Ok(())
        } else {
            Err(PoolError::SizeMismatch {
                expected: size_of::<T>(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Record {
        a: i32,
        b: u32,
        c: f64,
    }

    #[test]
    fn test_emplace_read_take() {
        let mut pool = PoolAllocator::new(64);
        let record = Record { a: -511, b: 64, c: 0.05 };

        let h = pool.emplace(record).unwrap();
        assert_eq!(pool.read(h).unwrap(), record);

        pool.write(h, Record { a: 1, ..record }).unwrap();
        assert_eq!(pool.take(h).unwrap().a, 1);
        assert_eq!(pool.read(h), Err(PoolError::StaleHandle(h.into_raw())));
    }

    #[test]
    fn test_size_mismatch() {
        let mut pool = PoolAllocator::new(64);
        let raw = pool.allocate(3).unwrap();
        let h: TypedHandle<u32> = TypedHandle::from_raw(raw);
        assert_eq!(
            pool.read(h),
            Err(PoolError::SizeMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_unaligned_read_works_aligned_ref_checks() {
        let mut pool = PoolAllocator::new(64);
        let _pad = pool.allocate(1).unwrap();
        let h = pool.emplace(0xdead_beef_u64).unwrap();

        assert_eq!(pool.offset_of(h.into_raw()).unwrap(), 1);
        assert_eq!(pool.read(h).unwrap(), 0xdead_beef);
        assert!(matches!(pool.try_ref(h), Err(PoolError::Cast(_))));
    }

    #[test]
    fn test_granule_makes_refs_aligned() {
        let mut pool = PoolAllocator::with_config(PoolConfig::new(64).with_granule(8)).unwrap();
        let pad = pool.emplace(7u8).unwrap();
        let h = pool.emplace(42u64).unwrap();

        *pool.try_mut(h).unwrap() += 1;
        assert_eq!(*pool.try_ref(h).unwrap(), 43);
        assert_eq!(pool.read(pad).unwrap(), 7);
    }
}
