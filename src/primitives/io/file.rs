use std::collections::HashMap;
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{FileIo, PageIo};
use crate::types::{BufError, PageId, Result};

#[cfg(unix)]
/// Unix positional I/O helpers.
pub mod stdio_unix {
    use std::{
        fs::{File, OpenOptions},
        io::{self, ErrorKind},
        os::unix::fs::FileExt,
        path::Path,
    };

    use crate::types::Result;

    use super::StdFileIo;

    /// Opens a file read-write, creating it if missing.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<StdFileIo> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(StdFileIo::new(file))
    }

    /// Fills `dst` from `off` with `pread`, failing with `UnexpectedEof` short of it.
    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.read_at(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "read_at reached EOF",
                ));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    /// Writes all of `src` at `off` with `pwrite`.
    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.write_at(src, off)?;
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "write_at wrote zero bytes",
                ));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

#[cfg(windows)]
/// Windows positional I/O helpers.
pub mod stdio_win {
    use std::{
        fs::{File, OpenOptions},
        io::{self, ErrorKind},
        os::windows::fs::FileExt,
        path::Path,
    };

    use crate::types::Result;

    use super::StdFileIo;

    /// Opens a file read-write, creating it if missing.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<StdFileIo> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(StdFileIo::new(file))
    }

    /// Fills `dst` from `off` with `seek_read`.
    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.seek_read(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "seek_read reached EOF",
                ));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    /// Writes all of `src` at `off` with `seek_write`.
    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.seek_write(src, off)?;
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "seek_write wrote zero bytes",
                ));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

/// Positional file handle shared through an `Arc<File>`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens or creates a file for read-write access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        #[cfg(unix)]
        {
            return stdio_unix::open_rw(path);
        }
        #[cfg(windows)]
        {
            return stdio_win::open_rw(path);
        }
        #[allow(unreachable_code)]
        Err(BufError::Invalid("StdFileIo unsupported on this platform"))
    }

    fn file(&self) -> &File {
        &self.inner
    }

    #[cfg(unix)]
    fn read_exact(&self, off: u64, dst: &mut [u8]) -> io::Result<()> {
        stdio_unix::read_exact(self.file(), off, dst)
    }

    #[cfg(windows)]
    fn read_exact(&self, off: u64, dst: &mut [u8]) -> io::Result<()> {
        stdio_win::read_exact(self.file(), off, dst)
    }

    #[cfg(unix)]
    fn write_all(&self, off: u64, src: &[u8]) -> io::Result<()> {
        stdio_unix::write_all(self.file(), off, src)
    }

    #[cfg(windows)]
    fn write_all(&self, off: u64, src: &[u8]) -> io::Result<()> {
        stdio_win::write_all(self.file(), off, src)
    }

    #[cfg(not(any(unix, windows)))]
    fn read_exact(&self, _off: u64, _dst: &mut [u8]) -> io::Result<()> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "StdFileIo unsupported on this platform",
        ))
    }

    #[cfg(not(any(unix, windows)))]
    fn write_all(&self, _off: u64, _src: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "StdFileIo unsupported on this platform",
        ))
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        trace!(off, len = dst.len(), "file.read_at");
        Ok(self.read_exact(off, dst)?)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        trace!(off, len = src.len(), "file.write_at");
        Ok(self.write_all(off, src)?)
    }

    fn sync_all(&self) -> Result<()> {
        Ok(self.file().sync_all()?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata()?.len())
    }
}

/// [`PageIo`] over one file per tablespace; page `n` lives at `n * page_size`.
pub struct FilePageIo {
    page_size: usize,
    spaces: RwLock<HashMap<u32, Arc<dyn FileIo>>>,
}

impl FilePageIo {
    /// Creates an instance with no tablespaces registered.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            spaces: RwLock::new(HashMap::new()),
        }
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Opens (or creates) `path` as the file backing `space`.
    pub fn open_space(&self, space: u32, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io = StdFileIo::open(path)?;
        debug!(space, path = %path.display(), "io.open_space");
        self.register(space, Arc::new(io));
        Ok(())
    }

    /// Registers an already opened file for `space`, replacing any previous one.
    pub fn register(&self, space: u32, io: Arc<dyn FileIo>) {
        self.spaces.write().insert(space, io);
    }

    /// Number of whole pages stored for `space`, if registered.
    pub fn page_count(&self, space: u32) -> Result<Option<u64>> {
        match self.space(space) {
            Some(io) => Ok(Some(io.len()? / self.page_size as u64)),
            None => Ok(None),
        }
    }

    fn space(&self, space: u32) -> Option<Arc<dyn FileIo>> {
        self.spaces.read().get(&space).cloned()
    }

    fn offset(&self, id: PageId) -> u64 {
        u64::from(id.page_no()) * self.page_size as u64
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(BufError::Invalid("buffer length does not match page size"));
        }
        Ok(())
    }
}

impl PageIo for FilePageIo {
    fn submit_read(&self, id: PageId, dst: &mut [u8]) -> Result<()> {
        self.check_len(dst.len())?;
        let io = self.space(id.space()).ok_or(BufError::NotFound(id))?;
        match io.read_at(self.offset(id), dst) {
            Err(BufError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                Err(BufError::NotFound(id))
            }
            other => other,
        }
    }

    fn submit_write(&self, id: PageId, src: &[u8]) -> Result<()> {
        self.check_len(src.len())?;
        let io = self.space(id.space()).ok_or(BufError::NotFound(id))?;
        io.write_at(self.offset(id), src)
    }

    fn sync(&self) -> Result<()> {
        let files: Vec<_> = self.spaces.read().values().cloned().collect();
        for io in files {
            io.sync_all()?;
        }
        Ok(())
    }
}
