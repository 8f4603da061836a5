#![forbid(unsafe_code)]
//! Value types shared by the cache, the latch layer, and the I/O boundary.

pub mod checksum;
mod error;
pub mod latch;
mod page_id;

pub use checksum::{ChecksumAlgorithm, RejectReason, StoredChecksum, Verdict};
pub use error::{BufError, Result};
pub use latch::{IoFix, LatchMode};
pub use page_id::PageId;
