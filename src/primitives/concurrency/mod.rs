#![allow(unsafe_code)]
//! Hybrid S/SX/X latch used for cache buckets and cached frames.
//!
//! Callers must follow the acquisition order enforced by the page hash:
//! bucket before frame, and ascending [`PageId`](crate::types::PageId) when
//! several frames are latched at once. Violations hang; they are not detected.

mod guard;
mod latch;

pub use guard::{ArcLatchGuard, DynGuard, LatchGuard};
pub use latch::{
    Exclusive, HybridLatch, LatchState, Mode, RawHybridLatch, Shared, Update, WriteMode,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LatchMode;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(50);

    #[test]
    fn shared_holders_coexist() {
        let latch = Arc::new(HybridLatch::new(7u32));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let barrier = Arc::clone(&barrier);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    let guard = latch.read();
                    inside.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    assert_eq!(*guard, 7);
                    assert_eq!(inside.load(Ordering::SeqCst), threads);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!latch.is_latched());
    }

    #[test]
    fn exclusive_waits_for_shared_and_update() {
        let latch = Arc::new(HybridLatch::new(0u32));
        let reader = latch.read();
        let updater = latch.update();
        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let latch = Arc::clone(&latch);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let mut guard = latch.write();
                acquired.store(true, Ordering::SeqCst);
                *guard += 1;
            })
        };
        thread::sleep(SETTLE);
        assert!(!acquired.load(Ordering::SeqCst));
        drop(reader);
        thread::sleep(SETTLE);
        assert!(!acquired.load(Ordering::SeqCst), "SX still held");
        drop(updater);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(*latch.read(), 1);
    }

    #[test]
    fn update_admits_readers_but_not_writers() {
        let latch = Arc::new(HybridLatch::new(()));
        let updater = latch.update();
        assert!(latch.try_lock::<Update>().is_none());
        assert!(latch.try_lock::<Exclusive>().is_none());

        let second_update = Arc::new(AtomicBool::new(false));
        let handle = {
            let latch = Arc::clone(&latch);
            let flag = Arc::clone(&second_update);
            thread::spawn(move || {
                let _g = latch.update();
                flag.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(SETTLE);
        assert!(!second_update.load(Ordering::SeqCst));

        let reader = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                let _g = latch.read();
            })
        };
        reader.join().unwrap();

        drop(updater);
        handle.join().unwrap();
        assert!(second_update.load(Ordering::SeqCst));
    }

    #[test]
    fn pending_writer_blocks_new_readers() {
        let latch = Arc::new(HybridLatch::new(()));
        let reader = latch.read();
        let handle = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                let _g = latch.write();
            })
        };
        thread::sleep(SETTLE);
        let state = latch.state();
        assert!(state.exclusive);
        assert_eq!(state.readers, 1);
        assert!(latch.try_lock::<Shared>().is_none());
        drop(reader);
        handle.join().unwrap();
        assert!(!latch.is_latched());
    }

    #[test]
    fn shared_blocks_behind_exclusive_until_release() {
        let latch = Arc::new(HybridLatch::new(0u64));
        let writer = latch.write();
        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let latch = Arc::clone(&latch);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let value = *latch.read();
                acquired.store(true, Ordering::SeqCst);
                value
            })
        };
        thread::sleep(SETTLE);
        assert!(!acquired.load(Ordering::SeqCst));
        let mut writer = writer;
        *writer = 42;
        drop(writer);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn raw_acquire_release_pairs() {
        let latch = RawHybridLatch::new();
        latch.acquire::<Shared>();
        latch.acquire::<Shared>();
        assert_eq!(latch.state().readers, 2);
        latch.release::<Shared>();
        latch.release::<Shared>();
        latch.acquire::<Exclusive>();
        assert!(latch.state().exclusive);
        assert!(!latch.try_update_lock());
        latch.release::<Exclusive>();
        assert_eq!(latch.state(), LatchState::default());
    }

    #[test]
    fn raw_conversions_track_state() {
        let latch = RawHybridLatch::new();
        latch.read_lock();
        assert!(latch.try_upgrade_shared());
        assert_eq!(
            latch.state(),
            LatchState {
                readers: 0,
                update: true,
                exclusive: false
            }
        );
        latch.upgrade_update();
        assert!(latch.state().exclusive && !latch.state().update);
        latch.downgrade_exclusive();
        assert!(latch.try_read_lock());
        latch.read_unlock();
        latch.update_unlock();
        assert!(!latch.is_latched());
    }

    #[test]
    fn guards_release_only_on_drop() {
        let latch = HybridLatch::new(1u32);
        let mut writer = latch.write();
        assert!(latch.try_lock::<Shared>().is_none());
        *writer = 5;
        drop(writer);
        let reader = latch.read();
        assert_eq!(*reader, 5);
        assert!(latch.try_lock::<Exclusive>().is_none());
        drop(reader);
        assert!(!latch.is_latched());
    }

    #[test]
    fn upgrade_and_downgrade_keep_ownership() {
        let latch = HybridLatch::new(String::from("a"));
        let shared = latch.read();
        let update = shared.try_upgrade().expect("no competing SX");
        assert!(latch.state().update);
        assert_eq!(latch.state().readers, 0);
        let mut exclusive = update.upgrade();
        exclusive.push('b');
        let update = exclusive.downgrade();
        assert!(latch.try_lock::<Shared>().is_some());
        assert_eq!(update.as_str(), "ab");
        drop(update);
        assert!(!latch.is_latched());
    }

    #[test]
    fn try_upgrade_fails_under_other_updater() {
        let latch = HybridLatch::new(());
        let _updater = latch.update();
        let shared = latch.read();
        let shared = shared.try_upgrade().expect_err("SX already held");
        assert_eq!(shared.mode(), LatchMode::Shared);
    }

    #[test]
    fn dyn_guard_honours_no_latch() {
        let latch = HybridLatch::new(5);
        let guard = latch.lock_mode(LatchMode::NoLatch);
        assert_eq!(guard.mode(), LatchMode::NoLatch);
        assert!(guard.get().is_none());
        assert!(!latch.is_latched());
        let mut guard = latch.lock_mode(LatchMode::Exclusive);
        *guard.get_mut().unwrap() = 6;
        drop(guard);
        assert_eq!(latch.lock_mode(LatchMode::Shared).get(), Some(&6));
    }

    #[test]
    fn arc_guard_outlives_borrow() {
        let latch = Arc::new(HybridLatch::new(vec![1u8]));
        let mut guard = Arc::clone(&latch).lock_arc::<Exclusive>();
        guard.push(2);
        let guard = guard.downgrade();
        assert_eq!(guard.as_slice(), &[1, 2]);
        drop(guard);
        assert!(!latch.is_latched());
    }

    #[test]
    fn exclusive_counter_under_contention() {
        let latch = Arc::new(HybridLatch::new(0u64));
        let threads = 8;
        let rounds = 2_000;
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || {
                    for n in 0..rounds {
                        if (i + n) % 3 == 0 {
                            let g = latch.update();
                            let mut g = g.upgrade();
                            *g += 1;
                        } else {
                            *latch.write() += 1;
                        }
                        let _ = *latch.read();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*latch.read(), (threads * rounds) as u64);
    }
}
