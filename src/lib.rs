//! Buffer pool substrate: page identifiers, hybrid latches, buddy size
//! classes, and page checksum policy, tied together by a thin page cache.

#![warn(missing_docs)]

pub mod config;
pub mod primitives;
pub mod types;

pub use config::{CacheOptions, ConfigError};
pub use primitives::concurrency::{HybridLatch, LatchGuard};
pub use primitives::io::{FilePageIo, MemPageIo, PageIo};
pub use primitives::pager::{BuddySizeClasses, PageCache, PageHandle};
pub use types::{
    BufError, ChecksumAlgorithm, IoFix, LatchMode, PageId, RejectReason, Result, StoredChecksum,
    Verdict,
};
