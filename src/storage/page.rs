use std::fmt;

use crate::{
    config::{INVALID_PAGE_ID, PAGE_SIZE},
    types::PageId,
};

/// A page resident in a buffer pool frame: the raw bytes plus the pin
/// count and the dirty flag the pool maintains.
///
/// A page with a non-zero pin count is never evicted; a dirty page is
/// written back before its frame is reused.
pub struct Page {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
            data: [0; PAGE_SIZE],
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn set_pin_count(&mut self, pin_count: u32) {
        self.pin_count = pin_count;
    }

    pub fn incr_pin_count(&mut self) {
        self.pin_count += 1;
    }

    pub fn decr_pin_count(&mut self) {
        // well-formed callers never unpin below zero, but a stray unpin
        // must not wrap the counter
        self.pin_count = self.pin_count.saturating_sub(1);
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Zero the page content and reset the metadata, making the frame
    /// ready to host a different page.
    pub fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
        self.data = [0; PAGE_SIZE];
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("pin_count", &self.pin_count)
            .field("is_dirty", &self.is_dirty)
            .finish()
    }
}
