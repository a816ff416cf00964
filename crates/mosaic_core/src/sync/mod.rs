//! # Shared Access
//!
//! The pool is single-threaded: every operation runs to completion on the
//! caller's thread and nothing inside it locks. Callers that need a pool
//! on several threads wrap the whole pool behind one mutex.
//!
//! ```text
//! Thread A:  lock ─► allocate ─► write bytes ─► unlock
//! Thread B:                                      lock ─► resolve ─► read ─► unlock
//! ```
//!
//! Handles may cross threads freely; bytes are only reachable while the
//! lock is held, so no address outlives a compaction.

mod shared_pool;

pub use shared_pool::SharedPool;
