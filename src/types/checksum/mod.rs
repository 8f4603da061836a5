#![forbid(unsafe_code)]
//! Page checksum policy.
//!
//! A [`ChecksumAlgorithm`] decides two things: the format stamped on every
//! page written from now on ([`select_write_algorithm`]), and which stored
//! formats are still accepted when a page is read back
//! ([`validate_on_read`]). Switching from `crc32` to `full_crc32` therefore
//! takes effect for new writes immediately while the existing page
//! population stays readable.
//!
//! | configured          | full_crc32 | crc32 | innodb | none |
//! |---------------------|------------|-------|--------|------|
//! | `crc32`             | ok         | ok    | ok     | ok   |
//! | `strict_crc32`      | ok         | ok    | reject | reject |
//! | `full_crc32`        | ok         | ok    | ok     | ok   |
//! | `strict_full_crc32` | ok         | ok    | reject | reject |
//!
//! [`is_checksum_strict`] is deliberately narrower than this table: it is true
//! for `strict_crc32` only, even though `strict_full_crc32` rejects the same
//! legacy formats. Callers that decide read acceptance must use
//! [`rejects_legacy`]; `is_checksum_strict` keeps its historical meaning for
//! the code paths that already depend on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{BufError, Result};

pub mod layout;
mod legacy;

use layout::{
    read_u32, trailer_checksum, trailer_tail, write_u32, FLUSH_LSN_END, HEADER_CHECKSUM,
    LSN_LOW, MIN_PAGE_LEN, PAGE_DATA,
};

/// Value stored in both legacy checksum slots of a page written without a checksum.
pub const NO_CHECKSUM_MAGIC: u32 = 0xDEAD_BEEF;

/// Streaming checksum over page fragments.
pub trait Checksum {
    /// Forgets everything fed so far.
    fn reset(&mut self);
    /// Feeds more bytes.
    fn update(&mut self, bytes: &[u8]);
    /// Checksum of everything fed since the last reset.
    fn finalize(&self) -> u32;
}

/// CRC-32C (Castagnoli), the polynomial used by every CRC page format.
#[derive(Default, Clone, Copy)]
pub struct Crc32c {
    state: u32,
}

impl Checksum for Crc32c {
    fn reset(&mut self) {
        self.state = 0;
    }

    fn update(&mut self, bytes: &[u8]) {
        self.state = crc32c::crc32c_append(self.state, bytes);
    }

    fn finalize(&self) -> u32 {
        self.state
    }
}

/// Operator-selected page checksum algorithm.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    /// Write `crc32`; read `full_crc32`, `crc32`, `innodb`, `none`.
    Crc32,
    /// Write `crc32`; read `full_crc32`, `crc32`.
    StrictCrc32,
    /// Write `full_crc32`; read `full_crc32`, `crc32`, `innodb`, `none`.
    #[default]
    FullCrc32,
    /// Write `full_crc32`; read `full_crc32`, `crc32`.
    StrictFullCrc32,
}

impl ChecksumAlgorithm {
    /// Every algorithm, in configuration order.
    pub const ALL: [ChecksumAlgorithm; 4] = [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::StrictCrc32,
        ChecksumAlgorithm::FullCrc32,
        ChecksumAlgorithm::StrictFullCrc32,
    ];

    /// Name accepted by the configuration surface.
    pub const fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::StrictCrc32 => "strict_crc32",
            ChecksumAlgorithm::FullCrc32 => "full_crc32",
            ChecksumAlgorithm::StrictFullCrc32 => "strict_full_crc32",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = BufError;

    fn from_str(s: &str) -> Result<Self> {
        ChecksumAlgorithm::ALL
            .into_iter()
            .find(|algo| algo.as_str().eq_ignore_ascii_case(s))
            .ok_or(BufError::Invalid("unknown checksum algorithm"))
    }
}

/// Integrity format found on (or to be written to) a page.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StoredChecksum {
    /// All-zero page that was allocated but never written.
    Empty,
    /// CRC-32C over the whole page, stored in the last four bytes.
    FullCrc32,
    /// CRC-32C over header tail and body, stored in both legacy slots.
    Crc32,
    /// The legacy byte-fold checksum.
    Innodb,
    /// No checksum; both legacy slots hold [`NO_CHECKSUM_MAGIC`].
    None,
}

impl StoredChecksum {
    /// Formats that only non-strict algorithms accept on read.
    pub const fn is_legacy(self) -> bool {
        matches!(self, StoredChecksum::Innodb | StoredChecksum::None)
    }
}

/// Why a page read back from disk was not accepted.
#[derive(thiserror::Error, Copy, Clone, Debug, Eq, PartialEq)]
pub enum RejectReason {
    /// Buffer too small to hold the checksum fields.
    #[error("page too short to carry checksum fields")]
    Truncated,
    /// A legacy checksum matched but the header and trailer LSN words disagree.
    #[error("header and trailer LSN differ (torn write)")]
    TornPage,
    /// No known format matches the stored checksum fields.
    #[error("stored checksum matches no known algorithm")]
    Mismatch,
    /// The page carries a legacy format the configured algorithm refuses.
    #[error("{0:?} checksum not accepted under a strict algorithm")]
    Disallowed(StoredChecksum),
}

/// Outcome of [`validate_on_read`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Page accepted; carries the format that matched.
    Accept(StoredChecksum),
    /// Page rejected.
    Reject(RejectReason),
}

impl Verdict {
    /// True for [`Verdict::Accept`].
    pub const fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accept(_))
    }
}

/// True only for [`ChecksumAlgorithm::StrictCrc32`].
///
/// Intentionally narrow: `strict_full_crc32` also refuses legacy pages but is
/// not classified as strict here. See [`rejects_legacy`].
pub const fn is_checksum_strict(algo: ChecksumAlgorithm) -> bool {
    matches!(algo, ChecksumAlgorithm::StrictCrc32)
}

/// Whether `algo` refuses `innodb` and unchecksummed pages on read.
pub const fn rejects_legacy(algo: ChecksumAlgorithm) -> bool {
    matches!(
        algo,
        ChecksumAlgorithm::StrictCrc32 | ChecksumAlgorithm::StrictFullCrc32
    )
}

/// Format stamped on every page written under `configured`.
pub const fn select_write_algorithm(configured: ChecksumAlgorithm) -> StoredChecksum {
    match configured {
        ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::StrictCrc32 => StoredChecksum::Crc32,
        ChecksumAlgorithm::FullCrc32 | ChecksumAlgorithm::StrictFullCrc32 => {
            StoredChecksum::FullCrc32
        }
    }
}

/// Full-page CRC-32C over everything but the last four bytes.
pub fn full_crc32(page: &[u8]) -> u32 {
    let mut crc = Crc32c::default();
    crc.update(&page[..trailer_tail(page.len()).start]);
    crc.finalize()
}

/// Legacy-slot CRC-32C over the header tail and the page body.
pub fn legacy_crc32(page: &[u8]) -> u32 {
    let body_end = trailer_checksum(page.len()).start;
    let mut crc = Crc32c::default();
    crc.update(&page[HEADER_CHECKSUM.end..FLUSH_LSN_END]);
    let head = crc.finalize();
    crc.reset();
    crc.update(&page[PAGE_DATA..body_end]);
    head ^ crc.finalize()
}

/// Decides whether a page read from disk is acceptable under `configured`.
pub fn validate_on_read(page: &[u8], configured: ChecksumAlgorithm) -> Verdict {
    if page.len() < MIN_PAGE_LEN {
        return Verdict::Reject(RejectReason::Truncated);
    }
    if page.iter().all(|&b| b == 0) {
        return Verdict::Accept(StoredChecksum::Empty);
    }
    let len = page.len();
    if read_u32(page, trailer_tail(len)) == full_crc32(page) {
        return Verdict::Accept(StoredChecksum::FullCrc32);
    }

    let header = read_u32(page, HEADER_CHECKSUM);
    let trailer = read_u32(page, trailer_checksum(len));
    let found = if header == NO_CHECKSUM_MAGIC && trailer == NO_CHECKSUM_MAGIC {
        StoredChecksum::None
    } else if header == trailer && header == legacy_crc32(page) {
        StoredChecksum::Crc32
    } else if header == legacy::new_checksum(page) && trailer == legacy::old_checksum(page) {
        StoredChecksum::Innodb
    } else {
        return Verdict::Reject(RejectReason::Mismatch);
    };
    // Legacy checksums stop short of the trailer LSN word.
    if read_u32(page, LSN_LOW) != read_u32(page, trailer_tail(len)) {
        return Verdict::Reject(RejectReason::TornPage);
    }
    if found.is_legacy() && rejects_legacy(configured) {
        return Verdict::Reject(RejectReason::Disallowed(found));
    }
    Verdict::Accept(found)
}

/// Writes the integrity fields of `page` in `format`.
///
/// Legacy formats also mirror the LSN low word into the trailer. `Empty`
/// zero-fills the page.
pub fn stamp(page: &mut [u8], format: StoredChecksum) {
    assert!(
        page.len() >= MIN_PAGE_LEN,
        "page buffer shorter than {MIN_PAGE_LEN} bytes"
    );
    let len = page.len();
    match format {
        StoredChecksum::Empty => page.fill(0),
        StoredChecksum::FullCrc32 => {
            let crc = full_crc32(page);
            write_u32(page, trailer_tail(len), crc);
        }
        StoredChecksum::Crc32 => {
            mirror_lsn(page);
            let crc = legacy_crc32(page);
            write_u32(page, HEADER_CHECKSUM, crc);
            write_u32(page, trailer_checksum(len), crc);
        }
        StoredChecksum::Innodb => {
            mirror_lsn(page);
            let new = legacy::new_checksum(page);
            write_u32(page, HEADER_CHECKSUM, new);
            let old = legacy::old_checksum(page);
            write_u32(page, trailer_checksum(len), old);
        }
        StoredChecksum::None => {
            mirror_lsn(page);
            write_u32(page, HEADER_CHECKSUM, NO_CHECKSUM_MAGIC);
            write_u32(page, trailer_checksum(len), NO_CHECKSUM_MAGIC);
        }
    }
}

fn mirror_lsn(page: &mut [u8]) {
    let lsn_low = read_u32(page, LSN_LOW);
    let tail = trailer_tail(page.len());
    write_u32(page, tail, lsn_low);
}
