//! # Memory Management
//!
//! One arena per pool, carved into extents, addressed through handles.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once, at construction. Afterwards:
//! - No arena growth
//! - Free neighbours are merged as soon as an extent is freed
//! - Live data moves only when a request cannot be served otherwise
//!
//! ## Layers
//!
//! ```text
//!   PoolAllocator ──► AllocationEngine ──► ExtentTable
//!        │                   │
//!        ▼                   └───────────► HandleRegistry
//!      Arena
//! ```

mod arena;
mod engine;
mod extent;
mod handle;
mod pool;
mod stats;

pub use arena::{Arena, ARENA_ALIGN};
pub use engine::AllocationEngine;
pub use extent::{Extent, ExtentState, ExtentTable, Relocation};
pub use handle::{HandleRegistry, PoolHandle};
pub use pool::PoolAllocator;
pub use stats::{CompactionReport, PoolStats};
