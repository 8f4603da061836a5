//! Byte offsets of the page fields that carry integrity data.
//!
//! Only the checksum-bearing fields are fixed here; the rest of the page body
//! belongs to higher layers.

use core::ops::Range;

/// Legacy checksum (or tablespace id on very old pages).
pub const HEADER_CHECKSUM: Range<usize> = 0..4;
/// Page number within the tablespace.
pub const PAGE_NO: Range<usize> = 4..8;
/// Newest modification LSN.
pub const LSN: Range<usize> = 16..24;
/// Low 32 bits of [`LSN`], mirrored into the legacy trailer.
pub const LSN_LOW: Range<usize> = 20..24;
/// End of the header span covered by legacy checksums.
pub const FLUSH_LSN_END: usize = 26;
/// Start of the page body.
pub const PAGE_DATA: usize = 38;
/// Length of the page trailer.
pub const TRAILER_LEN: usize = 8;
/// Smallest buffer the checksum code will look at.
pub const MIN_PAGE_LEN: usize = PAGE_DATA + TRAILER_LEN;

/// Old-style checksum slot in the trailer.
pub fn trailer_checksum(page_len: usize) -> Range<usize> {
    page_len - TRAILER_LEN..page_len - 4
}

/// Last four bytes: LSN low word on legacy pages, CRC-32C on full-CRC pages.
pub fn trailer_tail(page_len: usize) -> Range<usize> {
    page_len - 4..page_len
}

pub(crate) fn read_u32(page: &[u8], range: Range<usize>) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&page[range]);
    u32::from_be_bytes(bytes)
}

pub(crate) fn write_u32(page: &mut [u8], range: Range<usize>, value: u32) {
    page[range].copy_from_slice(&value.to_be_bytes());
}
