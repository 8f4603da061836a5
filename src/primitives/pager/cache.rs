use std::sync::Arc;

use tracing::{debug, info, warn};

use super::buddy::BuddySizeClasses;
use super::frame::{Frame, FrameGuard, FrameRef};
use super::page_hash::{latch_ordered, PageHash};
use crate::config::CacheOptions;
use crate::primitives::concurrency::{Exclusive, Mode, Shared, Update};
use crate::primitives::io::PageIo;
use crate::types::checksum::{select_write_algorithm, stamp, validate_on_read};
use crate::types::{BufError, ChecksumAlgorithm, IoFix, LatchMode, PageId, Result, Verdict};

/// A page returned by [`PageCache::get`] in the mode the caller asked for.
pub enum PageHandle {
    /// S-latched.
    Shared(FrameGuard<Shared>),
    /// SX-latched.
    Update(FrameGuard<Update>),
    /// X-latched.
    Exclusive(FrameGuard<Exclusive>),
    /// Pinned only; the caller chose not to latch.
    Unlatched(FrameRef),
}

impl PageHandle {
    /// Page this handle refers to.
    pub fn id(&self) -> PageId {
        self.frame().id()
    }

    /// Mode held, `NoLatch` when unlatched.
    pub fn mode(&self) -> LatchMode {
        match self {
            PageHandle::Shared(_) => LatchMode::Shared,
            PageHandle::Update(_) => LatchMode::SharedExclusive,
            PageHandle::Exclusive(_) => LatchMode::Exclusive,
            PageHandle::Unlatched(_) => LatchMode::NoLatch,
        }
    }

    /// Underlying frame.
    pub fn frame(&self) -> &Arc<Frame> {
        match self {
            PageHandle::Shared(g) => g.frame(),
            PageHandle::Update(g) => g.frame(),
            PageHandle::Exclusive(g) => g.frame(),
            PageHandle::Unlatched(f) => f.frame(),
        }
    }

    /// Page image, unless unlatched.
    pub fn page(&self) -> Option<&[u8]> {
        match self {
            PageHandle::Shared(g) => Some(g.page()),
            PageHandle::Update(g) => Some(g.page()),
            PageHandle::Exclusive(g) => Some(g.page()),
            PageHandle::Unlatched(_) => None,
        }
    }

    /// Mutable page image, only under X.
    pub fn page_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            PageHandle::Exclusive(g) => Some(g.page_mut()),
            _ => None,
        }
    }
}

/// Thin page cache: page hash, frame latches, miss reads and checksummed
/// write-back over a [`PageIo`].
pub struct PageCache<IO: PageIo> {
    options: CacheOptions,
    sizes: BuddySizeClasses,
    hash: PageHash,
    io: IO,
}

impl<IO: PageIo> PageCache<IO> {
    /// Builds a cache after validating `options`.
    pub fn new(options: CacheOptions, io: IO) -> Result<Self> {
        options.validate()?;
        let sizes =
            BuddySizeClasses::with_low_shift(options.page_size_shift, options.buddy_low_shift)?;
        let hash = PageHash::new(options.hash_buckets, options.page_size());
        info!(
            page_size = options.page_size(),
            buckets = options.hash_buckets,
            checksum = %options.checksum_algorithm,
            "page_cache.open"
        );
        Ok(Self {
            options,
            sizes,
            hash,
            io,
        })
    }

    /// Options the cache was built with.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Size classes for sub-page allocations.
    pub fn size_classes(&self) -> &BuddySizeClasses {
        &self.sizes
    }

    /// Configured checksum algorithm.
    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.options.checksum_algorithm
    }

    /// Page hash backing the cache.
    pub fn page_hash(&self) -> &PageHash {
        &self.hash
    }

    /// I/O collaborator.
    pub fn io(&self) -> &IO {
        &self.io
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.hash.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// Pins `id`, reading it on a miss, without keeping a latch.
    pub fn fix(&self, id: PageId) -> Result<FrameRef> {
        Ok(self.get_as::<Shared>(id)?.unlatch())
    }

    /// Returns `id` latched in mode `M`, reading it on a miss.
    pub fn get_as<M: Mode>(&self, id: PageId) -> Result<FrameGuard<M>> {
        loop {
            let fix = self.lookup_or_read(id)?;
            let guard = fix.latch::<M>();
            if guard.frame().is_abandoned() {
                // The read that created this frame failed; try again.
                continue;
            }
            return Ok(guard);
        }
    }

    /// Returns `id` in the run-time chosen `mode`.
    pub fn get(&self, id: PageId, mode: LatchMode) -> Result<PageHandle> {
        Ok(match mode {
            LatchMode::Shared => PageHandle::Shared(self.get_as(id)?),
            LatchMode::SharedExclusive => PageHandle::Update(self.get_as(id)?),
            LatchMode::Exclusive => PageHandle::Exclusive(self.get_as(id)?),
            LatchMode::NoLatch => PageHandle::Unlatched(self.fix(id)?),
        })
    }

    /// Latches two distinct pages in mode `M`, lower identifier first.
    pub fn get_pair<M: Mode>(
        &self,
        a: PageId,
        b: PageId,
    ) -> Result<(FrameGuard<M>, FrameGuard<M>)> {
        if a == b {
            return Err(BufError::Invalid("get_pair needs two distinct pages"));
        }
        let first = self.fix(a)?;
        let second = self.fix(b)?;
        Ok(latch_ordered(first, second))
    }

    /// Adds a zeroed, dirty page that does not exist on disk yet.
    pub fn create(&self, id: PageId) -> Result<FrameGuard<Exclusive>> {
        let mut bucket = self.hash.write_bucket(id);
        if bucket.lookup(id).is_some() {
            return Err(BufError::Invalid("page already cached"));
        }
        let mut guard = bucket.insert(id);
        drop(bucket);
        guard.page_mut().fill(0);
        debug!(page = %id, "page_cache.create");
        Ok(guard)
    }

    /// Writes `id` back if cached and dirty; returns whether a write happened.
    ///
    /// Holds SX for the duration, so readers proceed while the image is
    /// checksummed and written.
    pub fn flush(&self, id: PageId) -> Result<bool> {
        let Some(guard) = self.hash.read_bucket(id).latch_frame::<Update>(id) else {
            return Ok(false);
        };
        if !guard.frame().is_dirty() {
            return Ok(false);
        }
        let format = select_write_algorithm(self.options.checksum_algorithm);
        guard.set_io_fix(IoFix::Write);
        let mut image = guard.page().to_vec();
        stamp(&mut image, format);
        let result = self.io.submit_write(id, &image);
        guard.set_io_fix(IoFix::None);
        result?;
        guard.clear_dirty();
        debug!(page = %id, ?format, "page_cache.flush");
        Ok(true)
    }

    /// Flushes every dirty page in ascending identifier order.
    pub fn flush_all(&self) -> Result<usize> {
        let mut written = 0;
        for id in self.hash.ids() {
            if self.flush(id)? {
                written += 1;
            }
        }
        self.io.sync()?;
        Ok(written)
    }

    /// Drops `id` from the cache. See [`PageHash::evict`].
    pub fn evict(&self, id: PageId) -> Result<bool> {
        self.hash.evict(id)
    }

    fn lookup_or_read(&self, id: PageId) -> Result<FrameRef> {
        if let Some(fix) = self.hash.lookup(id) {
            return Ok(fix);
        }
        let mut bucket = self.hash.write_bucket(id);
        if let Some(fix) = bucket.lookup(id) {
            return Ok(fix);
        }
        let mut guard = bucket.insert(id);
        guard.set_io_fix(IoFix::Read);
        drop(bucket);

        debug!(page = %id, "page_cache.miss");
        let result = self
            .io
            .submit_read(id, guard.page_for_read())
            .and_then(|()| self.validate(id, guard.page()));
        guard.set_io_fix(IoFix::None);
        match result {
            Ok(()) => Ok(guard.unlatch()),
            Err(err) => {
                guard.frame().abandon();
                let frame = Arc::clone(guard.frame());
                drop(guard);
                self.hash.write_bucket(id).detach(&frame);
                Err(err)
            }
        }
    }

    fn validate(&self, id: PageId, page: &[u8]) -> Result<()> {
        match validate_on_read(page, self.options.checksum_algorithm) {
            Verdict::Accept(_) => Ok(()),
            Verdict::Reject(reason) => {
                warn!(page = %id, %reason, "page_cache.checksum_reject");
                Err(BufError::ChecksumMismatch { page: id, reason })
            }
        }
    }
}
