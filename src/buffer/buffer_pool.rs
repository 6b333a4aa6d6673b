use std::collections::HashMap;

use log::{debug, error};

use crate::{
    buffer::replacer::{LruReplacer, Replacer},
    error::{DbError, DbResult},
    storage::{disk_manager::DiskManager, page::Page},
    types::{pod, FrameId, HandyRwLock, PageId, Pod},
};

/// A fixed array of frames caching pages of the database file.
///
/// The pool is the exclusive owner of every resident `Page`; all other
/// components borrow a page only between a matched `fetch_page` (or
/// `new_page`) and `unpin_page`. At most one copy of a logical page is
/// resident at any time, and each frame is in exactly one of three
/// states: pinned-mapped, unpinned-mapped (an eviction candidate in the
/// replacer) or free.
pub struct BufferPool {
    pool_size: usize,
    disk_manager: DiskManager,
    pages: Vec<Pod<Page>>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

impl BufferPool {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            pages.push(pod(Page::new()));
            free_list.push(i);
        }
        Self {
            pool_size,
            disk_manager,
            pages,
            page_table: HashMap::new(),
            free_list,
            replacer: Box::new(LruReplacer::new(pool_size)),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Bring the page into a frame (if it is not already resident), pin
    /// it and hand it out. Fails with `OutOfFrames` when every frame is
    /// pinned.
    pub fn fetch_page(&mut self, page_id: PageId) -> DbResult<Pod<Page>> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.replacer.pin(frame_id);
            let page = self.pages[frame_id].clone();
            page.wl().incr_pin_count();
            return Ok(page);
        }

        let frame_id = self.find_frame()?;
        {
            let page = self.pages[frame_id].clone();
            let mut page = page.wl();
            if let Err(e) = self.disk_manager.read_page(page_id, page.data_mut()) {
                self.free_list.push(frame_id);
                return Err(e);
            }
            page.set_page_id(page_id);
            page.set_pin_count(1);
            page.set_dirty(false);
        }
        self.page_table.insert(page_id, frame_id);
        Ok(self.pages[frame_id].clone())
    }

    /// Allocate a fresh logical page, host it in a zeroed frame pinned
    /// once, and return its id together with the page.
    pub fn new_page(&mut self) -> DbResult<(PageId, Pod<Page>)> {
        let frame_id = self.find_frame()?;
        let page_id = match self.disk_manager.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                self.free_list.push(frame_id);
                return Err(e);
            }
        };
        {
            let page = self.pages[frame_id].clone();
            let mut page = page.wl();
            page.reset();
            page.set_page_id(page_id);
            page.set_pin_count(1);
        }
        self.page_table.insert(page_id, frame_id);
        debug!("new page allocated, id: {}, frame: {}", page_id, frame_id);
        Ok((page_id, self.pages[frame_id].clone()))
    }

    /// Release one pin on the page. The dirty flag is OR-ed in, never
    /// cleared here. When the pin count reaches zero the frame becomes
    /// an eviction candidate. Returns false when the page is not
    /// resident.
    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let page = self.pages[frame_id].clone();
        let mut page = page.wl();
        if is_dirty {
            page.set_dirty(true);
        }
        page.decr_pin_count();
        if page.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Write the page to disk unconditionally and clear its dirty flag.
    pub fn flush_page(&mut self, page_id: PageId) -> DbResult<bool> {
        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = self.pages[frame_id].clone();
        let mut page = page.wl();
        self.disk_manager.write_page(page_id, page.data())?;
        page.set_dirty(false);
        Ok(true)
    }

    /// Flush every resident page and the allocation metadata.
    pub fn flush_all_pages(&mut self) -> DbResult {
        let page_ids: Vec<PageId> = self.page_table.keys().cloned().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        self.disk_manager.flush_meta()
    }

    /// Drop the page from the pool and deallocate it on disk.
    ///
    /// Deallocation is issued in every case; the call reports false only
    /// when the page is resident and still pinned.
    pub fn delete_page(&mut self, page_id: PageId) -> DbResult<bool> {
        self.disk_manager.deallocate_page(page_id)?;

        let frame_id = match self.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };
        let page = self.pages[frame_id].clone();
        let mut page = page.wl();
        if page.pin_count() != 0 {
            return Ok(false);
        }
        if page.is_dirty() {
            self.disk_manager.write_page(page_id, page.data())?;
        }
        page.reset();
        drop(page);
        self.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        self.free_list.push(frame_id);
        Ok(true)
    }

    pub fn is_page_free(&mut self, page_id: PageId) -> DbResult<bool> {
        self.disk_manager.is_page_free(page_id)
    }

    /// Debug helper: true when no page is pinned. Tests assert this at
    /// the boundary of every public storage operation.
    pub fn check_all_unpinned(&self) -> bool {
        let mut res = true;
        for frame in &self.pages {
            let page = frame.rl();
            if page.pin_count() != 0 {
                res = false;
                error!(
                    "page {} still pinned, pin count: {}",
                    page.page_id(),
                    page.pin_count()
                );
            }
        }
        res
    }

    /// Number of frames that could host a new page right now.
    pub fn free_size(&self) -> usize {
        self.free_list.len() + self.replacer.size()
    }

    /// Pick a frame to host a page: the free list first, then a victim
    /// from the replacer. A dirty victim is written back before its
    /// frame is reused.
    fn find_frame(&mut self) -> DbResult<FrameId> {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = match self.replacer.victim() {
            Some(frame_id) => frame_id,
            None => {
                error!("all buffer pool frames are pinned");
                return Err(DbError::OutOfFrames);
            }
        };
        let page = self.pages[frame_id].clone();
        let mut page = page.wl();
        if page.is_dirty() {
            self.disk_manager.write_page(page.page_id(), page.data())?;
            page.set_dirty(false);
        }
        debug!("frame {} evicts page {}", frame_id, page.page_id());
        self.page_table.remove(&page.page_id());
        Ok(frame_id)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            error!("failed to flush buffer pool on drop: {}", e);
        }
    }
}
