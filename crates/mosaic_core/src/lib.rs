//! # Mosaic Core
//!
//! Fixed-capacity, general-purpose memory pool designed for:
//! - One arena reserved at construction, never resized
//! - Variable-size allocations addressed through stable handles
//! - Using aggregate free space, not just the largest free run
//!
//! ## Architecture Rules
//!
//! 1. **Handles, not addresses** - Callers hold handles; addresses are
//!    resolved right before each access
//! 2. **Eager coalescing** - No two neighbouring extents are ever both free
//! 3. **Lazy compaction** - Live data moves only inside an `allocate` that
//!    cannot be served any other way
//! 4. **Atomic failure** - A failed allocation changes nothing
//!
//! ## Example
//!
//! ```rust,ignore
//! use mosaic_core::PoolAllocator;
//!
//! let mut pool = PoolAllocator::new(105);
//! let handles: Vec<_> = (0..15).map(|_| pool.allocate(7)).collect::<Result<_, _>>()?;
//! for h in handles.iter().step_by(2) {
//!     pool.deallocate(*h)?;
//! }
//! // 56 bytes free in 7-byte holes: served by compaction.
//! let big = pool.allocate(24)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod sync;
pub mod typed;

pub use config::{CompactionMode, PoolConfig};
pub use error::{PoolError, PoolResult};
pub use memory::{
    Arena, CompactionReport, Extent, ExtentState, ExtentTable, PoolAllocator, PoolHandle,
    PoolStats, ARENA_ALIGN,
};
pub use sync::SharedPool;
pub use typed::TypedHandle;
