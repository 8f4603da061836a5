use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::guard::{ArcLatchGuard, DynGuard, LatchGuard};
use crate::types::LatchMode;

/// Writer claimed the latch; held once the reader count drains to zero.
const WRITER: u32 = 1 << 31;
/// An update (SX) holder is present.
const UPDATER: u32 = 1 << 30;
const READERS: u32 = UPDATER - 1;

const SPIN_ROUNDS: u32 = 64;

/// Shared / shared-exclusive / exclusive latch word without protected data.
///
/// The whole latch state lives in one atomic word: a writer bit, an update
/// bit, and a reader count. Uncontended acquisition is a single
/// compare-and-swap; contended callers spin briefly and then park on a
/// condition variable. There is no deadlock detection and no timeout.
///
/// Compatibility:
///
/// | held \ requested | S   | SX  | X   |
/// |------------------|-----|-----|-----|
/// | S                | yes | yes | no  |
/// | SX               | yes | no  | no  |
/// | X                | no  | no  | no  |
///
/// An X request first claims the writer bit (which stops new readers) and
/// then waits for the readers already inside to leave.
///
/// Acquire and release calls must pair up; a release in a mode that is not
/// held corrupts the latch word and trips a debug assertion. Data guarded
/// this way belongs in a [`HybridLatch`], whose guards do the pairing.
pub struct RawHybridLatch {
    state: AtomicU32,
    waiters: AtomicU32,
    park: Mutex<()>,
    cond: Condvar,
}

/// Point-in-time view of a latch word.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LatchState {
    /// Shared holders currently inside.
    pub readers: u32,
    /// Whether an SX holder is present.
    pub update: bool,
    /// Whether a writer has claimed the latch (held or draining readers).
    pub exclusive: bool,
}

impl Default for RawHybridLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RawHybridLatch {
    /// Creates an unlatched latch word.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
            park: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Decoded latch word.
    pub fn state(&self) -> LatchState {
        let raw = self.state.load(Ordering::Acquire);
        LatchState {
            readers: raw & READERS,
            update: raw & UPDATER != 0,
            exclusive: raw & WRITER != 0,
        }
    }

    /// True if any holder (or a draining writer) is present.
    pub fn is_latched(&self) -> bool {
        self.state.load(Ordering::Acquire) != 0
    }

    /// Attempts to acquire S without blocking.
    #[inline]
    pub fn try_read_lock(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current & WRITER != 0 {
                return false;
            }
            debug_assert!(current & READERS != READERS, "reader count overflow");
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Acquires S, blocking while a writer holds or has claimed the latch.
    #[inline]
    pub fn read_lock(&self) {
        if !self.try_read_lock() {
            self.read_lock_wait();
        }
    }

    /// Slow path of [`RawHybridLatch::read_lock`].
    #[cold]
    pub fn read_lock_wait(&self) {
        trace!(mode = ?LatchMode::Shared, "latch contended");
        self.park_until(|| self.try_read_lock());
    }

    /// Releases S.
    #[inline]
    pub fn read_unlock(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & READERS != 0, "read_unlock without a shared holder");
        if prev & WRITER != 0 && prev & READERS == 1 {
            self.wake();
        }
    }

    /// Attempts to acquire SX without blocking.
    #[inline]
    pub fn try_update_lock(&self) -> bool {
        self.try_set_exclusive_bit(UPDATER)
    }

    /// Acquires SX, blocking while another SX or X holder is present.
    #[inline]
    pub fn update_lock(&self) {
        if !self.try_update_lock() {
            self.update_lock_wait();
        }
    }

    /// Slow path of [`RawHybridLatch::update_lock`].
    #[cold]
    pub fn update_lock_wait(&self) {
        trace!(mode = ?LatchMode::SharedExclusive, "latch contended");
        self.park_until(|| self.try_update_lock());
    }

    /// Releases SX.
    #[inline]
    pub fn update_unlock(&self) {
        let prev = self.state.fetch_sub(UPDATER, Ordering::Release);
        debug_assert!(prev & UPDATER != 0, "update_unlock without an SX holder");
        self.wake();
    }

    /// Attempts to acquire X without blocking. Fails if anyone is inside.
    #[inline]
    pub fn try_write_lock(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquires X, blocking until every S, SX, and X holder has left.
    #[inline]
    pub fn write_lock(&self) {
        if !self.try_write_lock() {
            self.write_lock_wait();
        }
    }

    /// Slow path of [`RawHybridLatch::write_lock`]: claim the writer bit, then
    /// wait for the readers already inside to drain.
    #[cold]
    pub fn write_lock_wait(&self) {
        trace!(mode = ?LatchMode::Exclusive, "latch contended");
        self.park_until(|| self.try_set_exclusive_bit(WRITER));
        self.drain_readers();
    }

    /// Releases X.
    #[inline]
    pub fn write_unlock(&self) {
        let prev = self.state.fetch_sub(WRITER, Ordering::Release);
        debug_assert!(
            prev == WRITER,
            "write_unlock without an exclusive holder (state {prev:#x})"
        );
        self.wake();
    }

    /// Turns a held SX into X, waiting for current readers to leave.
    pub fn upgrade_update(&self) {
        let prev = self
            .state
            .fetch_xor(UPDATER | WRITER, Ordering::Acquire);
        debug_assert!(
            prev & UPDATER != 0 && prev & WRITER == 0,
            "upgrade without an SX holder"
        );
        if prev & READERS != 0 {
            trace!("draining readers for SX upgrade");
            self.drain_readers();
        }
    }

    /// Turns a held X back into SX, letting readers in again.
    pub fn downgrade_exclusive(&self) {
        let prev = self
            .state
            .fetch_xor(UPDATER | WRITER, Ordering::Release);
        debug_assert!(prev == WRITER, "downgrade without an exclusive holder");
        self.wake();
    }

    /// Turns a held S into SX if no other SX or X holder is present.
    pub fn try_upgrade_shared(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            debug_assert!(current & READERS != 0, "upgrade without a shared holder");
            if current & (WRITER | UPDATER) != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                (current - 1) | UPDATER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Acquires in mode `M`; resolved at compile time.
    #[inline]
    pub fn acquire<M: Mode>(&self) {
        M::lock(self);
    }

    /// Releases mode `M`; must pair with an earlier [`RawHybridLatch::acquire`] of the same mode.
    #[inline]
    pub fn release<M: Mode>(&self) {
        M::unlock(self);
    }

    fn try_set_exclusive_bit(&self, bit: u32) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current & (WRITER | UPDATER) != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current | bit,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn drain_readers(&self) {
        self.park_until(|| self.state.load(Ordering::Acquire) & READERS == 0);
    }

    fn park_until(&self, mut granted: impl FnMut() -> bool) {
        for _ in 0..SPIN_ROUNDS {
            if granted() {
                return;
            }
            std::hint::spin_loop();
        }
        let mut parked = self.park.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        // Pairs with the fence in `wake`: either we observe the release or
        // the releaser observes our waiter count.
        fence(Ordering::SeqCst);
        while !granted() {
            self.cond.wait(&mut parked);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn wake(&self) {
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) != 0 {
            let _parked = self.park.lock();
            self.cond.notify_all();
        }
    }
}

impl fmt::Debug for RawHybridLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHybridLatch")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// [`RawHybridLatch`] protecting a `T`, reachable only through guards.
///
/// Releasing happens only when a guard drops, so a latch cannot be unlocked
/// from under a live guard:
///
/// ```compile_fail
/// use bufcore::primitives::concurrency::{Exclusive, HybridLatch};
///
/// let latch = HybridLatch::new(0u32);
/// let _writer = latch.write();
/// latch.release::<Exclusive>();
/// ```
pub struct HybridLatch<T: ?Sized = ()> {
    raw: RawHybridLatch,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` only happens through guards; shared modes hand out
// `&T` to several threads, exclusive mode hands out `&mut T` to one.
unsafe impl<T: ?Sized + Send> Send for HybridLatch<T> {}
// SAFETY: see above.
unsafe impl<T: ?Sized + Send + Sync> Sync for HybridLatch<T> {}

impl<T> HybridLatch<T> {
    /// Creates an unlatched latch around `value`.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawHybridLatch::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the latch and returns the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for HybridLatch<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> HybridLatch<T> {
    /// Mutable access without latching; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Decoded latch word.
    pub fn state(&self) -> LatchState {
        self.raw.state()
    }

    /// True if any holder (or a draining writer) is present.
    pub fn is_latched(&self) -> bool {
        self.raw.is_latched()
    }

    pub(super) fn raw(&self) -> &RawHybridLatch {
        &self.raw
    }

    pub(super) fn data_ptr(&self) -> *mut T {
        self.data.get()
    }

    /// Acquires in mode `M` and returns a scoped guard.
    #[inline]
    pub fn lock<M: Mode>(&self) -> LatchGuard<'_, T, M> {
        M::lock(&self.raw);
        LatchGuard::new(self)
    }

    /// Non-blocking [`HybridLatch::lock`].
    #[inline]
    pub fn try_lock<M: Mode>(&self) -> Option<LatchGuard<'_, T, M>> {
        M::try_lock(&self.raw).then(|| LatchGuard::new(self))
    }

    /// Shared guard.
    #[inline]
    pub fn read(&self) -> LatchGuard<'_, T, Shared> {
        self.lock::<Shared>()
    }

    /// Update (SX) guard.
    #[inline]
    pub fn update(&self) -> LatchGuard<'_, T, Update> {
        self.lock::<Update>()
    }

    /// Exclusive guard.
    #[inline]
    pub fn write(&self) -> LatchGuard<'_, T, Exclusive> {
        self.lock::<Exclusive>()
    }

    /// Acquires according to a runtime [`LatchMode`]; `NoLatch` acquires nothing.
    pub fn lock_mode(&self, mode: LatchMode) -> DynGuard<'_, T> {
        match mode {
            LatchMode::Shared => DynGuard::Shared(self.read()),
            LatchMode::SharedExclusive => DynGuard::Update(self.update()),
            LatchMode::Exclusive => DynGuard::Exclusive(self.write()),
            LatchMode::NoLatch => DynGuard::Unlatched,
        }
    }

    /// Acquires in mode `M` and returns a guard that keeps the latch alive.
    #[inline]
    pub fn lock_arc<M: Mode>(self: &Arc<Self>) -> ArcLatchGuard<T, M> {
        M::lock(&self.raw);
        ArcLatchGuard::new(Arc::clone(self))
    }

    /// Non-blocking [`HybridLatch::lock_arc`].
    #[inline]
    pub fn try_lock_arc<M: Mode>(self: &Arc<Self>) -> Option<ArcLatchGuard<T, M>> {
        M::try_lock(&self.raw).then(|| ArcLatchGuard::new(Arc::clone(self)))
    }
}

impl<T: ?Sized> fmt::Debug for HybridLatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridLatch")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Shared {}
    impl Sealed for super::Update {}
    impl Sealed for super::Exclusive {}
}

/// Compile-time latch mode used to parameterise guards and `acquire`/`release`.
pub trait Mode: sealed::Sealed + Send + Sync + 'static {
    /// Runtime name of the mode.
    const LATCH: LatchMode;
    #[doc(hidden)]
    fn lock(latch: &RawHybridLatch);
    #[doc(hidden)]
    fn try_lock(latch: &RawHybridLatch) -> bool;
    #[doc(hidden)]
    fn unlock(latch: &RawHybridLatch);
}

/// Modes whose holder may change frame io-fix state (SX and X).
pub trait WriteMode: Mode {}

impl WriteMode for Update {}
impl WriteMode for Exclusive {}

/// S mode marker.
#[derive(Debug)]
pub enum Shared {}

/// SX mode marker.
#[derive(Debug)]
pub enum Update {}

/// X mode marker.
#[derive(Debug)]
pub enum Exclusive {}

impl Mode for Shared {
    const LATCH: LatchMode = LatchMode::Shared;

    #[inline]
    fn lock(latch: &RawHybridLatch) {
        latch.read_lock();
    }

    #[inline]
    fn try_lock(latch: &RawHybridLatch) -> bool {
        latch.try_read_lock()
    }

    #[inline]
    fn unlock(latch: &RawHybridLatch) {
        latch.read_unlock();
    }
}

impl Mode for Update {
    const LATCH: LatchMode = LatchMode::SharedExclusive;

    #[inline]
    fn lock(latch: &RawHybridLatch) {
        latch.update_lock();
    }

    #[inline]
    fn try_lock(latch: &RawHybridLatch) -> bool {
        latch.try_update_lock()
    }

    #[inline]
    fn unlock(latch: &RawHybridLatch) {
        latch.update_unlock();
    }
}

impl Mode for Exclusive {
    const LATCH: LatchMode = LatchMode::Exclusive;

    #[inline]
    fn lock(latch: &RawHybridLatch) {
        latch.write_lock();
    }

    #[inline]
    fn try_lock(latch: &RawHybridLatch) -> bool {
        latch.try_write_lock()
    }

    #[inline]
    fn unlock(latch: &RawHybridLatch) {
        latch.write_unlock();
    }
}
