#![forbid(unsafe_code)]

use std::sync::Arc;

use bufcore::primitives::concurrency::Shared;
use bufcore::primitives::io::MemPageIo;
use bufcore::types::checksum::{
    is_checksum_strict, layout, rejects_legacy, select_write_algorithm, stamp, validate_on_read,
};
use bufcore::{
    BufError, CacheOptions, ChecksumAlgorithm, PageCache, PageId, RejectReason, Result,
    StoredChecksum, Verdict,
};

const PAGE_SHIFT: u32 = 13;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

fn cache(io: &Arc<MemPageIo>, algo: ChecksumAlgorithm) -> Result<PageCache<Arc<MemPageIo>>> {
    let options = CacheOptions {
        page_size_shift: PAGE_SHIFT,
        hash_buckets: 8,
        checksum_algorithm: algo,
        ..CacheOptions::default()
    };
    PageCache::new(options, Arc::clone(io))
}

fn legacy_page(id: PageId, format: StoredChecksum) -> Vec<u8> {
    let mut page = vec![0xC3; PAGE_SIZE];
    page[layout::PAGE_NO].copy_from_slice(&id.page_no().to_be_bytes());
    page[layout::LSN].copy_from_slice(&0x00AB_CDEF_1234_5678u64.to_be_bytes());
    stamp(&mut page, format);
    page
}

fn stored_format(io: &MemPageIo, id: PageId) -> StoredChecksum {
    let page = io.get(id).expect("page stored");
    match validate_on_read(&page, ChecksumAlgorithm::Crc32) {
        Verdict::Accept(format) => format,
        Verdict::Reject(reason) => panic!("stored page {id} rejected: {reason}"),
    }
}

#[test]
fn switching_to_full_crc32_keeps_crc32_pages_readable() -> Result<()> {
    let io = Arc::new(MemPageIo::new());
    let old = PageId::make(1, 1);
    let new = PageId::make(1, 2);

    let before = cache(&io, ChecksumAlgorithm::Crc32)?;
    let mut guard = before.create(old)?;
    guard.page_mut()[layout::PAGE_DATA] = 0xAA;
    drop(guard);
    before.flush_all()?;
    drop(before);
    assert_eq!(stored_format(&io, old), StoredChecksum::Crc32);

    for algo in [ChecksumAlgorithm::FullCrc32, ChecksumAlgorithm::StrictFullCrc32] {
        let after = cache(&io, algo)?;
        assert_eq!(after.get_as::<Shared>(old)?.page()[layout::PAGE_DATA], 0xAA);
    }

    let after = cache(&io, ChecksumAlgorithm::FullCrc32)?;
    drop(after.create(new)?);
    after.flush(new)?;
    assert_eq!(stored_format(&io, new), StoredChecksum::FullCrc32);
    assert_eq!(stored_format(&io, old), StoredChecksum::Crc32);
    Ok(())
}

#[test]
fn strict_algorithms_refuse_legacy_pages() -> Result<()> {
    let io = Arc::new(MemPageIo::new());
    let innodb = PageId::make(2, 1);
    let plain = PageId::make(2, 2);
    io.put(innodb, &legacy_page(innodb, StoredChecksum::Innodb));
    io.put(plain, &legacy_page(plain, StoredChecksum::None));

    for algo in ChecksumAlgorithm::ALL {
        let cache = cache(&io, algo)?;
        for (id, format) in [(innodb, StoredChecksum::Innodb), (plain, StoredChecksum::None)] {
            let result = cache.get_as::<Shared>(id);
            if rejects_legacy(algo) {
                match result {
                    Err(BufError::ChecksumMismatch { page, reason }) => {
                        assert_eq!(page, id);
                        assert_eq!(reason, RejectReason::Disallowed(format));
                    }
                    Err(other) => panic!("{algo}: unexpected error {other:?}"),
                    Ok(_) => panic!("{algo} accepted a {format:?} page"),
                }
            } else {
                assert_eq!(result?.page()[layout::PAGE_DATA], 0xC3, "{algo}");
            }
        }
    }
    Ok(())
}

#[test]
fn torn_legacy_page_is_rejected_everywhere() {
    let id = PageId::make(3, 3);
    let mut page = legacy_page(id, StoredChecksum::Crc32);
    let tail = layout::trailer_tail(PAGE_SIZE);
    page[tail.start] ^= 0xFF;
    for algo in ChecksumAlgorithm::ALL {
        assert_eq!(
            validate_on_read(&page, algo),
            Verdict::Reject(RejectReason::TornPage),
            "{algo}"
        );
    }
}

#[test]
fn write_format_follows_algorithm_family() {
    assert_eq!(
        select_write_algorithm(ChecksumAlgorithm::StrictCrc32),
        StoredChecksum::Crc32
    );
    assert_eq!(
        select_write_algorithm(ChecksumAlgorithm::StrictFullCrc32),
        StoredChecksum::FullCrc32
    );
    // Strictness classification stays narrow even though both strict
    // variants refuse legacy pages.
    assert!(is_checksum_strict(ChecksumAlgorithm::StrictCrc32));
    assert!(!is_checksum_strict(ChecksumAlgorithm::StrictFullCrc32));
    assert!(rejects_legacy(ChecksumAlgorithm::StrictFullCrc32));
}

#[test]
fn caches_with_different_algorithms_coexist() -> Result<()> {
    let io = Arc::new(MemPageIo::new());
    let id = PageId::make(4, 4);
    io.put(id, &legacy_page(id, StoredChecksum::Innodb));

    let lenient = cache(&io, ChecksumAlgorithm::Crc32)?;
    let strict = cache(&io, ChecksumAlgorithm::StrictCrc32)?;
    assert!(lenient.get_as::<Shared>(id).is_ok());
    assert!(matches!(
        strict.get_as::<Shared>(id),
        Err(BufError::ChecksumMismatch { .. })
    ));
    assert_eq!(lenient.checksum_algorithm(), ChecksumAlgorithm::Crc32);
    assert_eq!(strict.checksum_algorithm(), ChecksumAlgorithm::StrictCrc32);
    Ok(())
}
