//! # Shared Pool
//!
//! A [`PoolAllocator`] behind a `parking_lot` mutex.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::PoolResult;
use crate::memory::{PoolAllocator, PoolHandle, PoolStats};

/// Cloneable, thread-safe front for one pool.
///
/// Byte access goes through closures so that no slice escapes the lock.
///
/// # Example
///
/// ```rust,ignore
/// let pool = SharedPool::new(PoolAllocator::new(4096));
/// let worker = pool.clone();
///
/// std::thread::spawn(move || {
///     let h = worker.allocate(64)?;
///     worker.with_bytes_mut(h, |bytes| bytes.fill(1))
/// });
/// ```
#[derive(Clone, Debug)]
pub struct SharedPool {
    inner: Arc<Mutex<PoolAllocator>>,
}

impl SharedPool {
    /// Takes ownership of `pool`.
    #[must_use]
    pub fn new(pool: PoolAllocator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    /// Locked allocate.
    ///
    /// # Errors
    ///
    /// See [`PoolAllocator::allocate`].
    pub fn allocate(&self, size: usize) -> PoolResult<PoolHandle> {
        self.inner.lock().allocate(size)
    }

    /// Locked deallocate.
    ///
    /// # Errors
    ///
    /// See [`PoolAllocator::deallocate`].
    pub fn deallocate(&self, handle: PoolHandle) -> PoolResult<()> {
        self.inner.lock().deallocate(handle)
    }

    /// Runs `f` on the allocation's bytes while holding the lock.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles; `f` is not called then.
    pub fn with_bytes<R>(&self, handle: PoolHandle, f: impl FnOnce(&[u8]) -> R) -> PoolResult<R> {
        let pool = self.inner.lock();
        Ok(f(pool.bytes(handle)?))
    }

    /// Runs `f` on the allocation's mutable bytes while holding the lock.
    ///
    /// # Errors
    ///
    /// Fails for null, stale or unknown handles; `f` is not called then.
    pub fn with_bytes_mut<R>(
        &self,
        handle: PoolHandle,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> PoolResult<R> {
        let mut pool = self.inner.lock();
        Ok(f(pool.bytes_mut(handle)?))
    }

    /// Utilisation snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    /// Locks the pool for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, PoolAllocator> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_shared_pool_across_threads() {
        let pool = SharedPool::new(PoolAllocator::new(8 * 64));

        let workers: Vec<_> = (0..8u8)
            .map(|id| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let mut held = Vec::new();
                    for round in 0..32u8 {
                        let h = pool.allocate(8).unwrap();
                        pool.with_bytes_mut(h, |b| b.fill(id ^ round)).unwrap();
                        held.push((h, id ^ round));
                        if held.len() > 4 {
                            let (old, fill) = held.remove(0);
                            let ok = pool.with_bytes(old, |b| b.iter().all(|&x| x == fill));
                            assert!(ok.unwrap());
                            pool.deallocate(old).unwrap();
                        }
                    }
                    for (h, _) in held {
                        pool.deallocate(h).unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.live_handles, 0);
        assert_eq!(stats.allocations, 8 * 32);
        pool.lock().validate().unwrap();
    }

    #[test]
    fn test_with_bytes_rejects_stale() {
        let pool = SharedPool::new(PoolAllocator::new(16));
        let h = pool.allocate(4).unwrap();
        pool.deallocate(h).unwrap();
        assert!(pool.with_bytes(h, |_| ()).is_err());
    }
}
