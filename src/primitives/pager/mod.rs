#![forbid(unsafe_code)]

mod buddy;
mod cache;
mod frame;
mod page_hash;

pub use buddy::{
    BuddySizeClasses, BUDDY_LOW_SHIFT, BUDDY_LOW_SHIFT_MIN, BUDDY_SIZES_MAX, PAGE_SIZE_SHIFT_MAX,
    PAGE_SIZE_SHIFT_MIN,
};
pub use cache::{PageCache, PageHandle};
pub use frame::{Frame, FrameGuard, FrameRef, PageBuf};
pub use page_hash::{BucketGuard, PageHash};
