use std::sync::Arc;

use tracing::{debug, warn};

use super::frame::{Frame, FrameGuard, FrameRef};
use crate::primitives::concurrency::{Exclusive, HybridLatch, LatchGuard, Mode, Shared};
use crate::types::{BufError, PageId, Result};

#[derive(Default)]
struct Bucket {
    frames: Vec<Arc<Frame>>,
}

impl Bucket {
    fn position(&self, id: PageId) -> Option<usize> {
        self.frames
            .iter()
            .position(|frame| frame.id() == id && !frame.is_abandoned())
    }
}

/// Fixed array of latched buckets mapping page identifiers to frames.
///
/// A frame can only be reached through a [`BucketGuard`], and a bucket guard
/// is consumed before the frame latch is awaited. Latching a frame while
/// holding its bucket, or a bucket while holding a frame, does not type-check.
pub struct PageHash {
    buckets: Box<[HybridLatch<Bucket>]>,
    page_size: usize,
}

impl PageHash {
    /// Creates `buckets` empty buckets for frames of `page_size` bytes.
    pub fn new(buckets: usize, page_size: usize) -> Self {
        assert!(buckets > 0, "page hash needs at least one bucket");
        Self {
            buckets: (0..buckets).map(|_| HybridLatch::default()).collect(),
            page_size,
        }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index `id` hashes to.
    pub fn bucket_of(&self, id: PageId) -> usize {
        id.fold() as usize % self.buckets.len()
    }

    /// Shared-latches the bucket of `id`.
    pub fn read_bucket(&self, id: PageId) -> BucketGuard<'_, Shared> {
        BucketGuard {
            guard: self.bucket(id).read(),
            page_size: self.page_size,
        }
    }

    /// Exclusively latches the bucket of `id`.
    pub fn write_bucket(&self, id: PageId) -> BucketGuard<'_, Exclusive> {
        BucketGuard {
            guard: self.bucket(id).write(),
            page_size: self.page_size,
        }
    }

    fn bucket(&self, id: PageId) -> &HybridLatch<Bucket> {
        &self.buckets[self.bucket_of(id)]
    }

    /// Pins the frame of `id` if cached.
    pub fn lookup(&self, id: PageId) -> Option<FrameRef> {
        self.read_bucket(id).lookup(id)
    }

    /// Latches the frames of `a` and `b` in ascending identifier order.
    ///
    /// The guards are returned in argument order. `None` if either page is not
    /// cached. Panics if `a == b`.
    pub fn latch_pair<M: Mode>(
        &self,
        a: PageId,
        b: PageId,
    ) -> Option<(FrameGuard<M>, FrameGuard<M>)> {
        let first = self.lookup(a)?;
        let second = self.lookup(b)?;
        Some(latch_ordered(first, second))
    }

    /// Removes `id` from the hash.
    ///
    /// Refuses with [`BufError::PageInUse`] while the frame is io-fixed,
    /// pinned, or latched, and with [`BufError::Invalid`] while it is dirty.
    /// Returns whether a frame was removed.
    pub fn evict(&self, id: PageId) -> Result<bool> {
        let mut bucket = self.write_bucket(id);
        let Some(pos) = bucket.guard.position(id) else {
            return Ok(false);
        };
        let frame = &bucket.guard.frames[pos];
        if !frame.can_relocate() {
            let io_fix = frame.io_fix();
            warn!(page = %id, ?io_fix, "page_hash.evict refused");
            return Err(BufError::PageInUse { page: id, io_fix });
        }
        if frame.is_dirty() {
            warn!(page = %id, "page_hash.evict refused dirty page");
            return Err(BufError::Invalid("cannot evict a dirty page"));
        }
        bucket.guard.frames.swap_remove(pos);
        debug!(page = %id, "page_hash.evict");
        Ok(true)
    }

    /// Cached page identifiers, ascending.
    pub fn ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .buckets
            .iter()
            .flat_map(|bucket| {
                let guard = bucket.read();
                guard
                    .frames
                    .iter()
                    .filter(|frame| !frame.is_abandoned())
                    .map(|frame| frame.id())
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of cached frames, not counting abandoned ones awaiting detach.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| {
                bucket
                    .read()
                    .frames
                    .iter()
                    .filter(|frame| !frame.is_abandoned())
                    .count()
            })
            .sum()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A latched bucket of the page hash.
pub struct BucketGuard<'a, M: Mode> {
    guard: LatchGuard<'a, Bucket, M>,
    page_size: usize,
}

impl<M: Mode> BucketGuard<'_, M> {
    /// Pins the frame of `id` if it is in this bucket.
    pub fn lookup(&self, id: PageId) -> Option<FrameRef> {
        let pos = self.guard.position(id)?;
        Some(FrameRef::new(Arc::clone(&self.guard.frames[pos])))
    }

    /// Number of frames chained in this bucket.
    pub fn len(&self) -> usize {
        self.guard.frames.len()
    }

    /// True if the bucket holds no frames.
    pub fn is_empty(&self) -> bool {
        self.guard.frames.is_empty()
    }

    /// Releases the bucket, then latches the frame of `id` in mode `F`.
    pub fn latch_frame<F: Mode>(self, id: PageId) -> Option<FrameGuard<F>> {
        let fix = self.lookup(id)?;
        drop(self);
        Some(fix.latch::<F>())
    }
}

impl BucketGuard<'_, Exclusive> {
    /// Adds a fresh zeroed frame for `id` and returns it X-latched.
    ///
    /// The frame is unreachable by others until the bucket is released, so
    /// latching it never waits.
    pub fn insert(&mut self, id: PageId) -> FrameGuard<Exclusive> {
        debug_assert!(self.guard.position(id).is_none(), "page {id} already cached");
        let frame = Arc::new(Frame::new(id, self.page_size));
        self.guard.frames.push(Arc::clone(&frame));
        debug!(page = %id, "page_hash.insert");
        FrameRef::new(frame).latch::<Exclusive>()
    }

    /// Unlinks exactly `frame`; returns whether it was present.
    pub fn detach(&mut self, frame: &Arc<Frame>) -> bool {
        match self.guard.frames.iter().position(|f| Arc::ptr_eq(f, frame)) {
            Some(pos) => {
                self.guard.frames.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Latches two distinct frames lower identifier first; guards come back in
/// argument order.
pub(crate) fn latch_ordered<M: Mode>(
    a: FrameRef,
    b: FrameRef,
) -> (FrameGuard<M>, FrameGuard<M>) {
    assert_ne!(a.id(), b.id(), "latch_pair needs two distinct pages");
    if a.id() < b.id() {
        let a = a.latch::<M>();
        let b = b.latch::<M>();
        (a, b)
    } else {
        let b = b.latch::<M>();
        let a = a.latch::<M>();
        (a, b)
    }
}
