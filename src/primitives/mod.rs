//! Low-level building blocks of the buffer pool.
//!
//! Includes the hybrid latch, the disk I/O boundary, and the page cache
//! built on top of them.

/// Concurrency primitives and synchronization.
///
/// The S/SX/X hybrid latch and its typed guards.
pub mod concurrency;

/// I/O abstractions and utilities.
///
/// Page-granular read/write collaborators and positional file I/O.
pub mod io;

/// Page cache and its supporting structures.
///
/// Buddy size classes, frames, the page hash, and the cache itself.
pub mod pager;
