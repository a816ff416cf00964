//! # Pool Error Types
//!
//! All errors that can occur while allocating from, or addressing into, a pool.

use thiserror::Error;

use crate::memory::PoolHandle;

/// Errors that can occur in the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The request cannot be satisfied by direct fit nor by compaction.
    #[error("out of memory: requested {requested} bytes, {free} free of {capacity}")]
    OutOfMemory {
        /// Bytes the caller asked for.
        requested: usize,
        /// Total free bytes at the time of the request.
        free: usize,
        /// Arena capacity.
        capacity: usize,
    },

    /// The null handle was resolved or used for access.
    #[error("null handle dereferenced")]
    NullHandle,

    /// The handle was deallocated (or the pool was reset) since it was issued.
    #[error("stale handle {0:?}: extent already deallocated")]
    StaleHandle(PoolHandle),

    /// The handle was never issued by this pool.
    #[error("unknown handle {0:?}")]
    UnknownHandle(PoolHandle),

    /// Typed access with a type whose size differs from the extent length.
    #[error("size mismatch: extent holds {actual} bytes, type needs {expected}")]
    SizeMismatch {
        /// Size of the requested type.
        expected: usize,
        /// Length of the extent.
        actual: usize,
    },

    /// A typed borrow failed the type's layout requirements.
    #[error("typed borrow rejected: {0:?}")]
    Cast(bytemuck::PodCastError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal bookkeeping no longer upholds its invariants.
    #[error("pool corrupted: {0}")]
    Corrupted(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
