use std::sync::Arc;

use log::debug;

use crate::{
    buffer::buffer_pool::BufferPool,
    config::INVALID_PAGE_ID,
    error::{DbError, DbResult},
    record::{Row, RowId, Schema},
    storage::{page::Page, table_iterator::TableIterator, table_page::TablePage},
    types::{HandyRwLock, PageId, Pod},
};

/// Page count beyond which inserts stop scanning the chain first-fit and
/// jump straight to the tail. The scan is quadratic over the table size,
/// which hurts long before it ever finds a hole worth filling.
const FIRST_FIT_PAGE_LIMIT: u32 = 500;

/// A table stored as a chain of slotted pages.
///
/// The heap owns no pages, only the ids at the two ends of the chain;
/// every access goes through the buffer pool.
pub struct TableHeap {
    buffer_pool: Pod<BufferPool>,
    schema: Arc<Schema>,
    first_page_id: PageId,
    last_page_id: PageId,
    total_page: u32,
}

// init functions
impl TableHeap {
    /// Create an empty heap with a single empty page.
    pub fn new(buffer_pool: Pod<BufferPool>, schema: Arc<Schema>) -> DbResult<TableHeap> {
        let (page_id, page) = buffer_pool.wl().new_page()?;
        let mut table_page = TablePage::new();
        table_page.init(page_id, INVALID_PAGE_ID);
        table_page.write_to(&mut page.wl());
        buffer_pool.wl().unpin_page(page_id, true);

        Ok(TableHeap {
            buffer_pool,
            schema,
            first_page_id: page_id,
            last_page_id: page_id,
            total_page: 1,
        })
    }

    /// Re-attach to an existing heap rooted at `first_page_id`, walking
    /// the chain to recover the tail position.
    pub fn open(
        buffer_pool: Pod<BufferPool>,
        schema: Arc<Schema>,
        first_page_id: PageId,
    ) -> DbResult<TableHeap> {
        let mut last_page_id = first_page_id;
        let mut total_page = 0;
        let mut page_id = first_page_id;
        while page_id != INVALID_PAGE_ID {
            let page = buffer_pool.wl().fetch_page(page_id)?;
            let table_page = TablePage::from_page(&page.rl());
            buffer_pool.wl().unpin_page(page_id, false);
            last_page_id = page_id;
            total_page += 1;
            page_id = table_page.next_page_id();
        }

        Ok(TableHeap {
            buffer_pool,
            schema,
            first_page_id,
            last_page_id,
            total_page,
        })
    }
}

// read-only functions
impl TableHeap {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn pages_count(&self) -> u32 {
        self.total_page
    }

    pub fn get_tuple(&self, rid: &RowId) -> DbResult<Option<Row>> {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let table_page = TablePage::from_page(&page.rl());
        let row = table_page.get_tuple(rid.slot_num(), &self.schema);
        self.buffer_pool.wl().unpin_page(rid.page_id(), false);
        Ok(row)
    }

    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(self)
    }

    pub fn tuples_count(&self) -> usize {
        self.iter().count()
    }
}

// mutating functions
impl TableHeap {
    /// Insert the row into the first page of the chain with enough free
    /// space, appending a new page at the tail when none fits. Assigns
    /// `row.row_id`.
    pub fn insert_tuple(&mut self, row: &mut Row) -> DbResult {
        if self.total_page > FIRST_FIT_PAGE_LIMIT {
            return self.insert_at_tail(row);
        }

        let mut page_id = self.first_page_id;
        loop {
            let page = self.buffer_pool.wl().fetch_page(page_id)?;
            let mut table_page = TablePage::from_page(&page.rl());
            if table_page.insert_tuple(row) {
                table_page.write_to(&mut page.wl());
                self.buffer_pool.wl().unpin_page(page_id, true);
                return Ok(());
            }

            let next_page_id = table_page.next_page_id();
            if next_page_id == INVALID_PAGE_ID {
                return self.append_page_and_insert(row, page_id, table_page, page);
            }
            self.buffer_pool.wl().unpin_page(page_id, false);
            page_id = next_page_id;
        }
    }

    /// Soft-delete the tuple; the slot stays allocated until
    /// `apply_delete`.
    pub fn mark_delete(&mut self, rid: &RowId) -> DbResult<bool> {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let mut table_page = TablePage::from_page(&page.rl());
        let marked = table_page.mark_delete(rid.slot_num());
        if marked {
            table_page.write_to(&mut page.wl());
        }
        self.buffer_pool.wl().unpin_page(rid.page_id(), marked);
        Ok(marked)
    }

    /// Physically reclaim a slot.
    pub fn apply_delete(&mut self, rid: &RowId) -> DbResult {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let mut table_page = TablePage::from_page(&page.rl());
        table_page.apply_delete(rid.slot_num());
        table_page.write_to(&mut page.wl());
        self.buffer_pool.wl().unpin_page(rid.page_id(), true);
        Ok(())
    }

    pub fn rollback_delete(&mut self, rid: &RowId) -> DbResult<bool> {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let mut table_page = TablePage::from_page(&page.rl());
        let rolled_back = table_page.rollback_delete(rid.slot_num());
        if rolled_back {
            table_page.write_to(&mut page.wl());
        }
        self.buffer_pool.wl().unpin_page(rid.page_id(), rolled_back);
        Ok(rolled_back)
    }

    /// Overwrite the tuple at `rid` in place. Returns false when the new
    /// values do not fit in the slot's allocation; the row is left
    /// untouched in that case and the caller decides what to do.
    pub fn update_tuple(&mut self, row: &Row, rid: &RowId) -> DbResult<bool> {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let mut table_page = TablePage::from_page(&page.rl());
        let updated = table_page.update_tuple(row, rid.slot_num());
        if updated {
            table_page.write_to(&mut page.wl());
        }
        self.buffer_pool.wl().unpin_page(rid.page_id(), updated);
        Ok(updated)
    }

    /// Return every page of the chain to the disk allocator. The heap is
    /// unusable afterwards.
    pub fn free_heap(&mut self) -> DbResult {
        let mut page_id = self.first_page_id;
        while page_id != INVALID_PAGE_ID {
            let page = self.buffer_pool.wl().fetch_page(page_id)?;
            let next_page_id = TablePage::from_page(&page.rl()).next_page_id();
            self.buffer_pool.wl().unpin_page(page_id, false);
            self.buffer_pool.wl().delete_page(page_id)?;
            page_id = next_page_id;
        }
        self.first_page_id = INVALID_PAGE_ID;
        self.last_page_id = INVALID_PAGE_ID;
        self.total_page = 0;
        Ok(())
    }

    /// Fast path for large tables: try the last page, chain a fresh one
    /// when it is full.
    fn insert_at_tail(&mut self, row: &mut Row) -> DbResult {
        let page_id = self.last_page_id;
        let page = self.buffer_pool.wl().fetch_page(page_id)?;
        let mut table_page = TablePage::from_page(&page.rl());
        if table_page.insert_tuple(row) {
            table_page.write_to(&mut page.wl());
            self.buffer_pool.wl().unpin_page(page_id, true);
            return Ok(());
        }
        self.append_page_and_insert(row, page_id, table_page, page)
    }

    /// Chain a new page after `tail_page_id` and insert there. The
    /// caller hands over its pin on the tail page.
    fn append_page_and_insert(
        &mut self,
        row: &mut Row,
        tail_page_id: PageId,
        mut tail_page: TablePage,
        tail_pod: Pod<Page>,
    ) -> DbResult {
        let new_page = self.buffer_pool.wl().new_page();
        let (new_page_id, page) = match new_page {
            Ok(v) => v,
            Err(e) => {
                self.buffer_pool.wl().unpin_page(tail_page_id, false);
                return Err(e);
            }
        };

        let mut table_page = TablePage::new();
        table_page.init(new_page_id, tail_page_id);
        if !table_page.insert_tuple(row) {
            self.buffer_pool.wl().unpin_page(new_page_id, false);
            self.buffer_pool.wl().delete_page(new_page_id)?;
            self.buffer_pool.wl().unpin_page(tail_page_id, false);
            return Err(DbError::Failed("tuple is too large for a page".to_string()));
        }
        table_page.write_to(&mut page.wl());

        tail_page.set_next_page_id(new_page_id);
        tail_page.write_to(&mut tail_pod.wl());

        self.buffer_pool.wl().unpin_page(tail_page_id, true);
        self.buffer_pool.wl().unpin_page(new_page_id, true);
        self.last_page_id = new_page_id;
        self.total_page += 1;
        debug!(
            "heap page {} appended after {}, {} pages in total",
            new_page_id, tail_page_id, self.total_page
        );
        Ok(())
    }
}

// iterator support
impl TableHeap {
    /// Locate the first live tuple of the chain.
    pub(crate) fn first_live_rid(&self) -> DbResult<Option<RowId>> {
        let mut page_id = self.first_page_id;
        while page_id != INVALID_PAGE_ID {
            let page = self.buffer_pool.wl().fetch_page(page_id)?;
            let table_page = TablePage::from_page(&page.rl());
            self.buffer_pool.wl().unpin_page(page_id, false);
            if let Some(rid) = table_page.get_first_tuple_rid() {
                return Ok(Some(rid));
            }
            page_id = table_page.next_page_id();
        }
        Ok(None)
    }

    /// Locate the live tuple following `rid`, hopping to the next pages
    /// of the chain as needed.
    pub(crate) fn next_live_rid(&self, rid: &RowId) -> DbResult<Option<RowId>> {
        let page = self.buffer_pool.wl().fetch_page(rid.page_id())?;
        let table_page = TablePage::from_page(&page.rl());
        self.buffer_pool.wl().unpin_page(rid.page_id(), false);
        if let Some(next) = table_page.get_next_tuple_rid(rid) {
            return Ok(Some(next));
        }

        let mut page_id = table_page.next_page_id();
        while page_id != INVALID_PAGE_ID {
            let page = self.buffer_pool.wl().fetch_page(page_id)?;
            let table_page = TablePage::from_page(&page.rl());
            self.buffer_pool.wl().unpin_page(page_id, false);
            if let Some(rid) = table_page.get_first_tuple_rid() {
                return Ok(Some(rid));
            }
            page_id = table_page.next_page_id();
        }
        Ok(None)
    }
}
