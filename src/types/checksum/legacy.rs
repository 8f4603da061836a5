//! The engine's pre-CRC page checksum, kept so old pages stay readable.

use super::layout::{trailer_checksum, FLUSH_LSN_END, HEADER_CHECKSUM, PAGE_DATA};

const HASH_RANDOM_MASK: u64 = 1_463_735_687;
const HASH_RANDOM_MASK2: u64 = 1_653_893_711;

#[inline]
fn fold_pair(n1: u64, n2: u64) -> u64 {
    ((((n1 ^ HASH_RANDOM_MASK2) << 8).wrapping_add(n2)) ^ HASH_RANDOM_MASK).wrapping_add(n1)
}

fn fold_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| fold_pair(acc, u64::from(b)))
}

/// Header-slot value: folds of the header tail and the page body.
pub(crate) fn new_checksum(page: &[u8]) -> u32 {
    let body_end = trailer_checksum(page.len()).start;
    let sum = fold_bytes(&page[HEADER_CHECKSUM.end..FLUSH_LSN_END])
        .wrapping_add(fold_bytes(&page[PAGE_DATA..body_end]));
    sum as u32
}

/// Trailer-slot value: fold of the header, including the header checksum.
pub(crate) fn old_checksum(page: &[u8]) -> u32 {
    fold_bytes(&page[..FLUSH_LSN_END]) as u32
}
