#![forbid(unsafe_code)]
//! Disk I/O boundary of the page cache.
//!
//! The cache never touches files directly. Misses and flushes go through a
//! [`PageIo`] collaborator, which may be backed by tablespace files
//! ([`FilePageIo`]) or an in-memory map ([`MemPageIo`]).

use std::sync::Arc;

use crate::types::{PageId, Result};

mod file;
mod memory;

pub use file::{FilePageIo, StdFileIo};
pub use memory::MemPageIo;

#[cfg(unix)]
pub use file::stdio_unix;
#[cfg(windows)]
pub use file::stdio_win;

/// Page-granular I/O collaborator used by the cache on misses and flushes.
pub trait PageIo: Send + Sync + 'static {
    /// Fills `dst` with the stored image of `id`.
    ///
    /// Returns [`BufError::NotFound`](crate::types::BufError::NotFound) when nothing is stored for the page.
    fn submit_read(&self, id: PageId, dst: &mut [u8]) -> Result<()>;
    /// Persists `src` as the image of `id`.
    fn submit_write(&self, id: PageId, src: &[u8]) -> Result<()>;
    /// Makes previous writes durable.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: PageIo + ?Sized> PageIo for Arc<T> {
    fn submit_read(&self, id: PageId, dst: &mut [u8]) -> Result<()> {
        (**self).submit_read(id, dst)
    }

    fn submit_write(&self, id: PageId, src: &[u8]) -> Result<()> {
        (**self).submit_write(id, src)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

/// Trait for performing positioned file I/O operations.
pub trait FileIo: Send + Sync + 'static {
    /// Reads bytes from the file at the specified offset into the buffer.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes bytes to the file at the specified offset from the buffer.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Synchronizes all file data and metadata to disk.
    fn sync_all(&self) -> Result<()>;
    /// Returns the current length of the file in bytes.
    fn len(&self) -> Result<u64>;
}
