//! Size classes of the binary buddy allocator that packs compressed pages
//! into page-sized blocks.
//!
//! Everything here is derived from the page-size shift in one place;
//! callers never redo the arithmetic.

use crate::types::{BufError, Result};

/// Smallest supported page size shift (4 KiB).
pub const PAGE_SIZE_SHIFT_MIN: u32 = 12;
/// Largest supported page size shift (64 KiB).
pub const PAGE_SIZE_SHIFT_MAX: u32 = 16;
/// Shift of the smallest compressed page size (1 KiB).
pub const BUDDY_LOW_SHIFT: u32 = 10;
/// Smallest low shift a build may select (512 bytes).
pub const BUDDY_LOW_SHIFT_MIN: u32 = 9;
/// Upper bound on buddy size classes across all supported page sizes.
pub const BUDDY_SIZES_MAX: u32 = PAGE_SIZE_SHIFT_MAX - BUDDY_LOW_SHIFT_MIN;

/// Derived, immutable buddy size ladder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BuddySizeClasses {
    low_shift: u32,
    size_count: u32,
    size_count_max: u32,
    high: usize,
}

impl BuddySizeClasses {
    /// Ladder for `page_size_shift` with the system low shift.
    pub fn new(page_size_shift: u32) -> Result<Self> {
        Self::with_low_shift(page_size_shift, BUDDY_LOW_SHIFT)
    }

    /// Ladder for `page_size_shift` with an explicit smallest class.
    pub fn with_low_shift(page_size_shift: u32, low_shift: u32) -> Result<Self> {
        if !(PAGE_SIZE_SHIFT_MIN..=PAGE_SIZE_SHIFT_MAX).contains(&page_size_shift) {
            return Err(BufError::Invalid("page size shift out of range"));
        }
        if !(BUDDY_LOW_SHIFT_MIN..page_size_shift).contains(&low_shift) {
            return Err(BufError::Invalid("buddy low shift out of range"));
        }
        let size_count = page_size_shift - low_shift;
        let high = (1usize << low_shift) << size_count;
        debug_assert_eq!(high, 1usize << page_size_shift);
        Ok(Self {
            low_shift,
            size_count,
            size_count_max: PAGE_SIZE_SHIFT_MAX - low_shift,
            high,
        })
    }

    /// Shift of the smallest class.
    pub const fn low_shift(&self) -> u32 {
        self.low_shift
    }

    /// Size of the smallest class.
    pub const fn low(&self) -> usize {
        1 << self.low_shift
    }

    /// Number of classes below a full page under this configuration.
    pub const fn size_count(&self) -> u32 {
        self.size_count
    }

    /// Number of classes under the largest supported page size; sizes
    /// fixed-capacity per-class bookkeeping.
    pub const fn size_count_max(&self) -> u32 {
        self.size_count_max
    }

    /// Total span of the buddy system; equal to the page size.
    pub const fn high(&self) -> usize {
        self.high
    }

    /// Byte size of class `class`.
    pub fn class_size(&self, class: u32) -> usize {
        assert!(
            class < self.size_count,
            "buddy class {class} out of range (have {})",
            self.size_count
        );
        self.low() << class
    }

    /// Smallest class that holds `len` bytes, or `None` if only a whole page does.
    pub fn class_for(&self, len: usize) -> Option<u32> {
        (0..self.size_count).find(|&class| self.low() << class >= len)
    }

    /// Class sizes from smallest to largest.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size_count).map(move |class| self.low() << class)
    }
}
