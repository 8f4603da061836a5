use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::primitives::concurrency::{
    ArcLatchGuard, Exclusive, HybridLatch, Mode, Shared, Update, WriteMode,
};
use crate::types::{IoFix, LatchMode, PageId};

/// Page image protected by a frame latch.
pub type PageBuf = Box<[u8]>;

/// A cached page: identity, io-fix and pin state, and the latched image.
///
/// Io-fix and pin state are atomics so the flush and eviction paths can
/// inspect them under the bucket latch alone. Changing the io-fix requires a
/// [`FrameGuard`] in SX or X mode.
pub struct Frame {
    id: PageId,
    io_fix: AtomicU8,
    pins: AtomicU32,
    dirty: AtomicBool,
    abandoned: AtomicBool,
    page: Arc<HybridLatch<PageBuf>>,
}

impl Frame {
    pub(crate) fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            io_fix: AtomicU8::new(IoFix::None as u8),
            pins: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            page: Arc::new(HybridLatch::new(vec![0u8; page_size].into_boxed_slice())),
        }
    }

    /// Page this frame caches.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Pending I/O, or [`IoFix::Pin`] if none is pending but the frame is pinned.
    pub fn io_fix(&self) -> IoFix {
        let io = IoFix::from_u8(self.io_fix.load(Ordering::Acquire));
        if io == IoFix::None && self.pin_count() > 0 {
            IoFix::Pin
        } else {
            io
        }
    }

    /// Pending I/O only, ignoring pins.
    pub fn pending_io(&self) -> IoFix {
        IoFix::from_u8(self.io_fix.load(Ordering::Acquire))
    }

    /// Outstanding pins.
    pub fn pin_count(&self) -> u32 {
        self.pins.load(Ordering::Acquire)
    }

    /// Whether the frame has modifications not yet written back.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// True once the frame has been dropped from the page hash after a failed read.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Whether any thread holds the page latch.
    pub fn is_latched(&self) -> bool {
        self.page.is_latched()
    }

    /// Whether the eviction path may reclaim or move this frame now.
    pub fn can_relocate(&self) -> bool {
        self.pending_io() == IoFix::None && self.pin_count() == 0 && !self.is_latched()
    }

    pub(crate) fn pin(&self) {
        let prev = self.pins.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev < u32::MAX, "pin count overflow on {}", self.id);
    }

    pub(crate) fn unpin(&self) {
        let prev = self.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin without a pin on {}", self.id);
    }

    pub(crate) fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    fn set_io_fix(&self, to: IoFix) {
        let from = self.pending_io();
        debug_assert!(
            IoFix::can_transition(from, to),
            "illegal io-fix transition {from:?} -> {to:?} on {}",
            self.id
        );
        self.io_fix.store(to as u8, Ordering::Release);
    }
}

/// A pinned, unlatched reference to a cached frame.
///
/// Only a bucket guard can hand one out, so a frame is always reached through
/// its bucket first. The pin keeps the frame in the cache until dropped; it
/// does not stop other threads from latching it.
pub struct FrameRef {
    frame: Arc<Frame>,
}

impl FrameRef {
    pub(crate) fn new(frame: Arc<Frame>) -> Self {
        frame.pin();
        Self { frame }
    }

    /// Page this reference points at.
    pub fn id(&self) -> PageId {
        self.frame.id
    }

    /// The frame itself.
    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    /// Latches the frame in mode `M`, blocking until granted.
    pub fn latch<M: Mode>(self) -> FrameGuard<M> {
        let page = self.frame.page.lock_arc::<M>();
        FrameGuard { page, fix: self }
    }

    /// Latches the frame in mode `M` if that is possible without waiting.
    pub fn try_latch<M: Mode>(self) -> Result<FrameGuard<M>, Self> {
        match self.frame.page.try_lock_arc::<M>() {
            Some(page) => Ok(FrameGuard { page, fix: self }),
            None => Err(self),
        }
    }
}

impl Clone for FrameRef {
    fn clone(&self) -> Self {
        FrameRef::new(Arc::clone(&self.frame))
    }
}

impl Drop for FrameRef {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

/// A latched frame. Releases the latch, then the pin, on drop.
pub struct FrameGuard<M: Mode> {
    page: ArcLatchGuard<PageBuf, M>,
    fix: FrameRef,
}

impl<M: Mode> std::fmt::Debug for FrameGuard<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard")
            .field("id", &self.id())
            .field("mode", &M::LATCH)
            .finish_non_exhaustive()
    }
}

impl<M: Mode> FrameGuard<M> {
    /// Page held by this guard.
    pub fn id(&self) -> PageId {
        self.fix.id()
    }

    /// The frame itself.
    pub fn frame(&self) -> &Arc<Frame> {
        self.fix.frame()
    }

    /// Mode held.
    pub fn mode(&self) -> LatchMode {
        M::LATCH
    }

    /// Current page image.
    pub fn page(&self) -> &[u8] {
        &self.page
    }

    /// Releases the latch but keeps the pin.
    pub fn unlatch(self) -> FrameRef {
        let FrameGuard { page, fix } = self;
        drop(page);
        fix
    }
}

impl<M: WriteMode> FrameGuard<M> {
    /// Records the start or completion of I/O on this frame.
    pub fn set_io_fix(&self, to: IoFix) {
        self.frame().set_io_fix(to);
    }

    pub(crate) fn clear_dirty(&self) {
        self.frame().dirty.store(false, Ordering::Release);
    }
}

impl FrameGuard<Shared> {
    /// S → SX without releasing, if no other writer is present.
    pub fn try_upgrade(self) -> Result<FrameGuard<Update>, Self> {
        let FrameGuard { page, fix } = self;
        match page.try_upgrade() {
            Ok(page) => Ok(FrameGuard { page, fix }),
            Err(page) => Err(FrameGuard { page, fix }),
        }
    }
}

impl FrameGuard<Update> {
    /// SX → X; waits for readers to leave.
    pub fn upgrade(self) -> FrameGuard<Exclusive> {
        let FrameGuard { page, fix } = self;
        FrameGuard {
            page: page.upgrade(),
            fix,
        }
    }
}

impl FrameGuard<Exclusive> {
    /// Mutable page image; marks the frame dirty.
    pub fn page_mut(&mut self) -> &mut [u8] {
        self.fix.frame.dirty.store(true, Ordering::Release);
        &mut self.page
    }

    /// Mutable page image for filling from disk; leaves the dirty flag alone.
    pub(crate) fn page_for_read(&mut self) -> &mut [u8] {
        &mut self.page
    }

    /// X → SX; readers may enter again.
    pub fn downgrade(self) -> FrameGuard<Update> {
        let FrameGuard { page, fix } = self;
        FrameGuard {
            page: page.downgrade(),
            fix,
        }
    }
}
