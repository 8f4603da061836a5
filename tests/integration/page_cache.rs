#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bufcore::primitives::concurrency::{Exclusive, Shared};
use bufcore::primitives::io::{FilePageIo, MemPageIo, PageIo};
use bufcore::types::checksum::{layout, stamp};
use bufcore::{
    BufError, CacheOptions, ChecksumAlgorithm, IoFix, LatchMode, PageCache, PageId, Result,
    StoredChecksum,
};
use tempfile::tempdir;

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
const SETTLE: Duration = Duration::from_millis(50);

fn options() -> CacheOptions {
    CacheOptions {
        page_size_shift: PAGE_SHIFT,
        hash_buckets: 32,
        checksum_algorithm: ChecksumAlgorithm::FullCrc32,
        ..CacheOptions::default()
    }
}

fn disk_page(id: PageId, fill: u8, format: StoredChecksum) -> Vec<u8> {
    let mut page = vec![fill; PAGE_SIZE];
    page[layout::PAGE_NO].copy_from_slice(&id.page_no().to_be_bytes());
    page[layout::LSN].copy_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
    stamp(&mut page, format);
    page
}

/// Counts reads and can hold the first one until released.
struct GatedIo {
    inner: MemPageIo,
    reads: AtomicUsize,
    gate: Option<(Barrier, Barrier)>,
}

impl GatedIo {
    fn new(gated: bool) -> Self {
        Self {
            inner: MemPageIo::new(),
            reads: AtomicUsize::new(0),
            gate: gated.then(|| (Barrier::new(2), Barrier::new(2))),
        }
    }

    fn wait_entered(&self) {
        if let Some((entered, _)) = &self.gate {
            entered.wait();
        }
    }

    fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.wait();
        }
    }
}

impl PageIo for GatedIo {
    fn submit_read(&self, id: PageId, dst: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.wait();
            release.wait();
        }
        self.inner.submit_read(id, dst)
    }

    fn submit_write(&self, id: PageId, src: &[u8]) -> Result<()> {
        self.inner.submit_write(id, src)
    }
}

fn spawn_reader(cache: &Arc<PageCache<GatedIo>>, id: PageId) -> thread::JoinHandle<Result<u8>> {
    let cache = Arc::clone(cache);
    thread::spawn(move || cache.get_as::<Shared>(id).map(|guard| guard.page()[200]))
}

#[test]
fn miss_reads_from_tablespace_file() -> Result<()> {
    let dir = tempdir()?;
    let io = FilePageIo::new(PAGE_SIZE);
    io.open_space(3, dir.path().join("space3.ibd"))?;
    let id = PageId::make(3, 2);
    io.submit_write(id, &disk_page(id, 0x5A, StoredChecksum::Crc32))?;

    let cache = PageCache::new(options(), io)?;
    let handle = cache.get(id, LatchMode::Shared)?;
    assert_eq!(handle.page().map(|p| p[layout::PAGE_DATA]), Some(0x5A));
    assert_eq!(handle.frame().io_fix(), IoFix::Pin);
    drop(handle);

    // Page 0 lies before the written page and reads back as an empty page.
    let empty = cache.get_as::<Shared>(PageId::make(3, 0))?;
    assert!(empty.page().iter().all(|&b| b == 0));
    assert!(matches!(
        cache.get_as::<Shared>(PageId::make(3, 9)),
        Err(BufError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn exclusive_holder_blocks_shared_request() -> Result<()> {
    let cache = Arc::new(PageCache::new(options(), MemPageIo::new())?);
    let id = PageId::make(5, 10);
    drop(cache.create(id)?);

    let mut held = cache.get_as::<Exclusive>(id)?;
    let acquired = Arc::new(AtomicBool::new(false));
    let reader = {
        let cache = Arc::clone(&cache);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || -> Result<Option<u8>> {
            let handle = cache.get(id, LatchMode::Shared)?;
            acquired.store(true, Ordering::SeqCst);
            Ok(handle.page().map(|p| p[100]))
        })
    };

    thread::sleep(SETTLE);
    assert!(!acquired.load(Ordering::SeqCst));
    held.page_mut()[100] = 3;
    drop(held);
    assert_eq!(reader.join().expect("reader panicked")?, Some(3));
    Ok(())
}

#[test]
fn unlatched_handle_pins_without_blocking_writers() -> Result<()> {
    let cache = PageCache::new(options(), MemPageIo::new())?;
    let id = PageId::make(1, 1);
    drop(cache.create(id)?);
    cache.flush(id)?;

    let pinned = cache.get(id, LatchMode::NoLatch)?;
    assert_eq!(pinned.mode(), LatchMode::NoLatch);
    assert!(pinned.page().is_none());
    assert_eq!(pinned.frame().io_fix(), IoFix::Pin);

    // An X request is still granted: the pin is not a latch.
    let writer = cache
        .page_hash()
        .read_bucket(id)
        .lookup(id)
        .expect("cached")
        .try_latch::<Exclusive>();
    assert!(writer.is_ok());
    drop(writer);

    match cache.evict(id) {
        Err(BufError::PageInUse { page, io_fix }) => {
            assert_eq!(page, id);
            assert_eq!(io_fix, IoFix::Pin);
        }
        other => panic!("unexpected eviction outcome: {other:?}"),
    }
    drop(pinned);
    assert!(cache.evict(id)?);
    Ok(())
}

#[test]
fn read_in_flight_refuses_eviction_and_holds_back_readers() -> Result<()> {
    let io = GatedIo::new(true);
    let id = PageId::make(2, 7);
    io.inner.put(id, &disk_page(id, 0x77, StoredChecksum::FullCrc32));
    let cache = Arc::new(PageCache::new(options(), io)?);

    let first = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || -> Result<u8> { Ok(cache.get_as::<Shared>(id)?.page()[200]) })
    };
    cache.io().wait_entered();

    let frame = Arc::clone(cache.page_hash().lookup(id).expect("inserted").frame());
    assert_eq!(frame.pending_io(), IoFix::Read);
    match cache.evict(id) {
        Err(BufError::PageInUse { io_fix, .. }) => assert_eq!(io_fix, IoFix::Read),
        other => panic!("unexpected eviction outcome: {other:?}"),
    }

    let second = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || -> Result<u8> { Ok(cache.get_as::<Shared>(id)?.page()[200]) })
    };
    thread::sleep(SETTLE);
    assert!(!second.is_finished());

    cache.io().release();
    assert_eq!(first.join().expect("first reader panicked")?, 0x77);
    assert_eq!(second.join().expect("second reader panicked")?, 0x77);
    assert_eq!(cache.io().reads.load(Ordering::SeqCst), 1);
    assert_eq!(frame.pending_io(), IoFix::None);
    Ok(())
}

#[test]
fn waiter_on_failed_read_reads_again() -> Result<()> {
    let io = GatedIo::new(true);
    let id = PageId::make(2, 11);
    io.inner.put(id, &disk_page(id, 0x33, StoredChecksum::FullCrc32));
    io.inner.modify(id, |page| page[2000] ^= 0x01);
    let cache = Arc::new(PageCache::new(options(), io)?);

    let first = spawn_reader(&cache, id);
    cache.io().wait_entered();
    let second = spawn_reader(&cache, id);
    thread::sleep(SETTLE);
    assert!(!second.is_finished());

    cache.io().release();
    assert!(matches!(
        first.join().expect("first reader panicked"),
        Err(BufError::ChecksumMismatch { page, .. }) if page == id
    ));

    // The waiter finds the frame abandoned and issues its own read.
    cache.io().wait_entered();
    assert_eq!(cache.len(), 1);
    cache.io().release();
    assert!(matches!(
        second.join().expect("second reader panicked"),
        Err(BufError::ChecksumMismatch { page, .. }) if page == id
    ));
    assert_eq!(cache.io().reads.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
    assert!(cache.page_hash().ids().is_empty());
    Ok(())
}

#[test]
fn concurrent_misses_share_one_read() -> Result<()> {
    let io = GatedIo::new(false);
    let id = PageId::make(0, 42);
    io.inner.put(id, &disk_page(id, 0x42, StoredChecksum::FullCrc32));
    let cache = Arc::new(PageCache::new(options(), io)?);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<u8> {
                barrier.wait();
                Ok(cache.get_as::<Shared>(id)?.page()[64])
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("reader panicked")?, 0x42);
    }
    assert_eq!(cache.io().reads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
fn pair_is_latched_in_ascending_order() -> Result<()> {
    let cache = Arc::new(PageCache::new(options(), MemPageIo::new())?);
    let low = PageId::make(4, 1);
    let high = PageId::make(4, 8);
    drop(cache.create(low)?);
    drop(cache.create(high)?);

    let held = cache.get_as::<Exclusive>(low)?;
    let high_frame = Arc::clone(cache.page_hash().lookup(high).expect("cached").frame());
    let worker = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || -> Result<(PageId, PageId)> {
            let (a, b) = cache.get_pair::<Exclusive>(high, low)?;
            Ok((a.id(), b.id()))
        })
    };
    thread::sleep(SETTLE);
    assert!(!high_frame.is_latched());
    drop(held);
    assert_eq!(worker.join().expect("worker panicked")?, (high, low));
    Ok(())
}

#[test]
fn flushed_pages_survive_eviction() -> Result<()> {
    let cache = PageCache::new(options(), MemPageIo::new())?;
    let ids: Vec<PageId> = (0..6).map(|n| PageId::make(9, n)).collect();
    for (i, &id) in ids.iter().enumerate() {
        let mut guard = cache.create(id)?;
        guard.page_mut()[layout::PAGE_DATA..][..8].fill(i as u8 + 1);
    }

    match cache.evict(ids[0]) {
        Err(BufError::Invalid(msg)) => assert!(msg.contains("dirty")),
        other => panic!("unexpected eviction outcome: {other:?}"),
    }
    assert_eq!(cache.flush_all()?, ids.len());
    assert_eq!(cache.flush_all()?, 0);

    for &id in &ids {
        assert!(cache.evict(id)?);
    }
    assert!(cache.is_empty());
    for (i, &id) in ids.iter().enumerate() {
        let guard = cache.get_as::<Shared>(id)?;
        assert_eq!(guard.page()[layout::PAGE_DATA], i as u8 + 1);
        assert!(!guard.frame().is_dirty());
    }
    Ok(())
}

#[test]
fn corrupt_page_is_reported_then_retried_after_repair() -> Result<()> {
    let io = Arc::new(MemPageIo::new());
    let id = PageId::make(6, 3);
    io.put(id, &disk_page(id, 0x10, StoredChecksum::FullCrc32));
    io.modify(id, |page| page[900] ^= 0x01);
    let cache = PageCache::new(options(), Arc::clone(&io))?;

    match cache.get(id, LatchMode::SharedExclusive) {
        Err(BufError::ChecksumMismatch { page, .. }) => assert_eq!(page, id),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("corrupt page accepted"),
    }
    assert!(cache.is_empty());

    io.put(id, &disk_page(id, 0x10, StoredChecksum::FullCrc32));
    let handle = cache.get(id, LatchMode::SharedExclusive)?;
    assert_eq!(handle.page().map(|p| p[900]), Some(0x10));
    Ok(())
}
