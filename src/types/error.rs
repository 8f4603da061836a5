use crate::types::checksum::RejectReason;
use crate::types::latch::IoFix;
use crate::types::PageId;

/// Errors surfaced by the page cache substrate.
///
/// Misuse of [`PageId`] arithmetic or latch pairing is a contract violation
/// and panics in debug builds instead of producing one of these.
#[derive(thiserror::Error, Debug)]
pub enum BufError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A public entry point was handed an argument it cannot honour.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A page read from disk failed checksum validation.
    #[error("checksum mismatch on page {page}: {reason}")]
    ChecksumMismatch {
        /// Page that failed validation.
        page: PageId,
        /// Why the configured policy rejected it.
        reason: RejectReason,
    },
    /// The frame is io-fixed, pinned, or latched and cannot be evicted.
    #[error("page {page} is in use (io fix {io_fix:?})")]
    PageInUse {
        /// Frame that was asked to leave the cache.
        page: PageId,
        /// Io-fix state observed at the time of the request.
        io_fix: IoFix,
    },
    /// The I/O collaborator has no storage for the requested page.
    #[error("page {0} not found")]
    NotFound(PageId),
    /// Configuration could not be loaded or validated.
    #[error("config: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BufError>;
