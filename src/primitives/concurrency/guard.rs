use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::Arc;

use super::latch::{Exclusive, HybridLatch, Mode, Shared, Update};
use crate::types::LatchMode;

/// Scoped latch guard; the latch is released in mode `M` on drop.
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct LatchGuard<'a, T: ?Sized, M: Mode> {
    latch: &'a HybridLatch<T>,
    _mode: PhantomData<M>,
}

impl<'a, T: ?Sized, M: Mode> LatchGuard<'a, T, M> {
    pub(super) fn new(latch: &'a HybridLatch<T>) -> Self {
        Self {
            latch,
            _mode: PhantomData,
        }
    }

    /// Mode this guard holds.
    pub fn mode(&self) -> LatchMode {
        M::LATCH
    }

    /// Latch this guard belongs to.
    pub fn latch(&self) -> &'a HybridLatch<T> {
        self.latch
    }

    fn into_latch(self) -> &'a HybridLatch<T> {
        let this = ManuallyDrop::new(self);
        this.latch
    }
}

impl<'a, T: ?Sized> LatchGuard<'a, T, Shared> {
    /// S → SX without releasing, if no other SX or X holder exists.
    pub fn try_upgrade(self) -> Result<LatchGuard<'a, T, Update>, Self> {
        if self.latch.raw().try_upgrade_shared() {
            Ok(LatchGuard::new(self.into_latch()))
        } else {
            Err(self)
        }
    }
}

impl<'a, T: ?Sized> LatchGuard<'a, T, Update> {
    /// SX → X; waits for shared holders to leave.
    pub fn upgrade(self) -> LatchGuard<'a, T, Exclusive> {
        let latch = self.into_latch();
        latch.raw().upgrade_update();
        LatchGuard::new(latch)
    }
}

impl<'a, T: ?Sized> LatchGuard<'a, T, Exclusive> {
    /// X → SX; readers may enter again.
    pub fn downgrade(self) -> LatchGuard<'a, T, Update> {
        let latch = self.into_latch();
        latch.raw().downgrade_exclusive();
        LatchGuard::new(latch)
    }
}

impl<T: ?Sized, M: Mode> Deref for LatchGuard<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: every mode excludes X holders other than ourselves.
        unsafe { &*self.latch.data_ptr() }
    }
}

impl<T: ?Sized> DerefMut for LatchGuard<'_, T, Exclusive> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: X excludes every other holder.
        unsafe { &mut *self.latch.data_ptr() }
    }
}

impl<T: ?Sized, M: Mode> Drop for LatchGuard<'_, T, M> {
    fn drop(&mut self) {
        M::unlock(self.latch.raw());
    }
}

impl<T: ?Sized + fmt::Debug, M: Mode> fmt::Debug for LatchGuard<'_, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatchGuard")
            .field("mode", &M::LATCH)
            .field("data", &&**self)
            .finish()
    }
}

/// Owned latch guard that keeps its latch alive through an `Arc`.
///
/// Lets a frame guard outlive the bucket guard that located the frame.
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct ArcLatchGuard<T: ?Sized, M: Mode> {
    latch: Arc<HybridLatch<T>>,
    _mode: PhantomData<M>,
}

impl<T: ?Sized, M: Mode> ArcLatchGuard<T, M> {
    pub(super) fn new(latch: Arc<HybridLatch<T>>) -> Self {
        Self {
            latch,
            _mode: PhantomData,
        }
    }

    /// Mode this guard holds.
    pub fn mode(&self) -> LatchMode {
        M::LATCH
    }

    /// Latch this guard belongs to.
    pub fn latch(&self) -> &Arc<HybridLatch<T>> {
        &self.latch
    }

    fn into_latch(self) -> Arc<HybridLatch<T>> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the Arc is moved out exactly once.
        unsafe { ptr::read(&this.latch) }
    }
}

impl<T: ?Sized> ArcLatchGuard<T, Shared> {
    /// S → SX without releasing, if no other SX or X holder exists.
    pub fn try_upgrade(self) -> Result<ArcLatchGuard<T, Update>, Self> {
        if self.latch.raw().try_upgrade_shared() {
            Ok(ArcLatchGuard::new(self.into_latch()))
        } else {
            Err(self)
        }
    }
}

impl<T: ?Sized> ArcLatchGuard<T, Update> {
    /// SX → X; waits for shared holders to leave.
    pub fn upgrade(self) -> ArcLatchGuard<T, Exclusive> {
        let latch = self.into_latch();
        latch.raw().upgrade_update();
        ArcLatchGuard::new(latch)
    }
}

impl<T: ?Sized> ArcLatchGuard<T, Exclusive> {
    /// X → SX; readers may enter again.
    pub fn downgrade(self) -> ArcLatchGuard<T, Update> {
        let latch = self.into_latch();
        latch.raw().downgrade_exclusive();
        ArcLatchGuard::new(latch)
    }
}

impl<T: ?Sized, M: Mode> Deref for ArcLatchGuard<T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: every mode excludes X holders other than ourselves.
        unsafe { &*self.latch.data_ptr() }
    }
}

impl<T: ?Sized> DerefMut for ArcLatchGuard<T, Exclusive> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: X excludes every other holder.
        unsafe { &mut *self.latch.data_ptr() }
    }
}

impl<T: ?Sized, M: Mode> Drop for ArcLatchGuard<T, M> {
    fn drop(&mut self) {
        M::unlock(self.latch.raw());
    }
}

/// Guard for a mode chosen at run time.
///
/// `Unlatched` records that the call site elected not to latch; it grants no
/// access to the protected value.
pub enum DynGuard<'a, T: ?Sized> {
    /// Holding S.
    Shared(LatchGuard<'a, T, Shared>),
    /// Holding SX.
    Update(LatchGuard<'a, T, Update>),
    /// Holding X.
    Exclusive(LatchGuard<'a, T, Exclusive>),
    /// Nothing held.
    Unlatched,
}

impl<T: ?Sized> DynGuard<'_, T> {
    /// Mode held, `NoLatch` for [`DynGuard::Unlatched`].
    pub fn mode(&self) -> LatchMode {
        match self {
            DynGuard::Shared(_) => LatchMode::Shared,
            DynGuard::Update(_) => LatchMode::SharedExclusive,
            DynGuard::Exclusive(_) => LatchMode::Exclusive,
            DynGuard::Unlatched => LatchMode::NoLatch,
        }
    }

    /// Shared view of the value, unless unlatched.
    pub fn get(&self) -> Option<&T> {
        match self {
            DynGuard::Shared(g) => Some(&**g),
            DynGuard::Update(g) => Some(&**g),
            DynGuard::Exclusive(g) => Some(&**g),
            DynGuard::Unlatched => None,
        }
    }

    /// Mutable view of the value, only when holding X.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            DynGuard::Exclusive(g) => Some(&mut **g),
            _ => None,
        }
    }
}
