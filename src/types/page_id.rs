use std::fmt;
use std::ops::{Add, Sub};

const PAGE_NO_BITS: u32 = 32;
const PAGE_NO_MASK: u64 = (1 << PAGE_NO_BITS) - 1;

/// Identifies a cached page by `(tablespace, page number)`.
///
/// Both halves are packed into one `u64` with the tablespace in the high
/// word, so the derived ordering sorts by tablespace first and page number
/// second. Flush lists and multi-frame latching rely on that order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageId(u64);

impl PageId {
    /// Largest page number a tablespace can address.
    pub const MAX_PAGE_NO: u32 = u32::MAX;

    /// Packs a tablespace id and a page number.
    ///
    /// `space` must fit in 32 bits; this is checked in debug builds only.
    #[inline]
    pub fn make(space: u64, page_no: u32) -> Self {
        debug_assert!(
            space <= u64::from(u32::MAX),
            "tablespace id {space} does not fit in 32 bits"
        );
        PageId((space << PAGE_NO_BITS) | u64::from(page_no))
    }

    /// Rebuilds an identifier from the value returned by [`PageId::raw`].
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        PageId(raw)
    }

    /// Tablespace id.
    #[inline]
    pub const fn space(self) -> u32 {
        (self.0 >> PAGE_NO_BITS) as u32
    }

    /// Page number within the tablespace.
    #[inline]
    pub const fn page_no(self) -> u32 {
        (self.0 & PAGE_NO_MASK) as u32
    }

    /// Hash-bucket key. Pages of one tablespace land on consecutive folds,
    /// tablespaces are spread `2^20 + 1` apart.
    #[inline]
    pub const fn fold(self) -> u32 {
        let space = self.space();
        (space << 20)
            .wrapping_add(space)
            .wrapping_add(self.page_no())
    }

    /// Opaque packed form for logging and persistence.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Replaces the page number, keeping the tablespace.
    #[inline]
    pub fn set_page_no(&mut self, page_no: u32) {
        self.0 = (self.0 & !PAGE_NO_MASK) | u64::from(page_no);
    }

    /// The following page of the same tablespace.
    ///
    /// Calling this on [`PageId::MAX_PAGE_NO`] is a contract violation.
    #[inline]
    pub fn next(self) -> Self {
        self + 1
    }

    /// The preceding page of the same tablespace.
    ///
    /// Calling this on page zero is a contract violation.
    #[inline]
    pub fn prev(self) -> Self {
        self - 1
    }

    /// Offset forward by `n` pages, or `None` if that leaves the tablespace.
    #[inline]
    pub fn checked_add(self, n: u32) -> Option<Self> {
        self.page_no()
            .checked_add(n)
            .map(|page_no| self.with_page_no(page_no))
    }

    /// Offset backward by `n` pages, or `None` if that passes page zero.
    #[inline]
    pub fn checked_sub(self, n: u32) -> Option<Self> {
        self.page_no()
            .checked_sub(n)
            .map(|page_no| self.with_page_no(page_no))
    }

    #[inline]
    fn with_page_no(mut self, page_no: u32) -> Self {
        self.set_page_no(page_no);
        self
    }
}

impl Add<u32> for PageId {
    type Output = PageId;

    /// Read-ahead offset. Overflowing the page number is a contract violation.
    #[inline]
    fn add(self, n: u32) -> PageId {
        debug_assert!(
            self.page_no().checked_add(n).is_some(),
            "page number overflow: {self} + {n}"
        );
        self.with_page_no(self.page_no().wrapping_add(n))
    }
}

impl Sub<u32> for PageId {
    type Output = PageId;

    /// Backward offset. Passing page zero is a contract violation.
    #[inline]
    fn sub(self, n: u32) -> PageId {
        debug_assert!(
            self.page_no() >= n,
            "page number underflow: {self} - {n}"
        );
        self.with_page_no(self.page_no().wrapping_sub(n))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.space(), self.page_no())
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId{self}")
    }
}
