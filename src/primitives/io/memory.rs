use std::collections::HashMap;

use parking_lot::Mutex;

use super::PageIo;
use crate::types::{BufError, PageId, Result};

/// In-memory [`PageIo`] keyed by page identifier.
#[derive(Default)]
pub struct MemPageIo {
    pages: Mutex<HashMap<PageId, Box<[u8]>>>,
}

impl MemPageIo {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `image` for `id` directly, bypassing any cache.
    pub fn put(&self, id: PageId, image: &[u8]) {
        self.pages.lock().insert(id, image.into());
    }

    /// Copy of the stored image of `id`.
    pub fn get(&self, id: PageId) -> Option<Vec<u8>> {
        self.pages.lock().get(&id).map(|page| page.to_vec())
    }

    /// Applies `f` to the stored image of `id`. Returns false if absent.
    pub fn modify(&self, id: PageId, f: impl FnOnce(&mut [u8])) -> bool {
        match self.pages.lock().get_mut(&id) {
            Some(page) => {
                f(page);
                true
            }
            None => false,
        }
    }

    /// Number of stored pages.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

impl PageIo for MemPageIo {
    fn submit_read(&self, id: PageId, dst: &mut [u8]) -> Result<()> {
        let pages = self.pages.lock();
        let page = pages.get(&id).ok_or(BufError::NotFound(id))?;
        if page.len() != dst.len() {
            return Err(BufError::Invalid("buffer length does not match page size"));
        }
        dst.copy_from_slice(page);
        Ok(())
    }

    fn submit_write(&self, id: PageId, src: &[u8]) -> Result<()> {
        self.put(id, src);
        Ok(())
    }
}
