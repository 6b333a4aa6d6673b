use log::error;

use crate::{
    buffer::buffer_pool::BufferPool,
    config::INVALID_PAGE_ID,
    error::DbResult,
    index::{index_key::IndexKey, tree_page::LeafNode},
    record::{RowId, Schema},
    types::{HandyRwLock, PageId, Pod},
};

/// Forward cursor over the leaf chain of a B+ tree.
///
/// The iterator keeps its current leaf pinned for as long as it points
/// into it; advancing to the next leaf pins it before the previous pin
/// is released, and dropping the iterator releases whatever it holds.
/// Two iterators are equal when they sit on the same leaf at the same
/// slot.
pub struct IndexIterator {
    buffer_pool: Pod<BufferPool>,
    key_schema: Schema,
    leaf_page_id: PageId,
    node: Option<LeafNode>,
    index: usize,
}

impl IndexIterator {
    /// Pin the given leaf and position the cursor on `index`.
    pub(crate) fn new_at(
        buffer_pool: Pod<BufferPool>,
        key_schema: Schema,
        leaf_page_id: PageId,
        index: usize,
    ) -> DbResult<IndexIterator> {
        let page = buffer_pool.wl().fetch_page(leaf_page_id)?;
        let node = LeafNode::from_page(&page.rl(), &key_schema);
        Ok(IndexIterator {
            buffer_pool,
            key_schema,
            leaf_page_id,
            node: Some(node),
            index,
        })
    }

    /// The position past the last entry of the last leaf.
    pub(crate) fn end(buffer_pool: Pod<BufferPool>, key_schema: Schema) -> IndexIterator {
        IndexIterator {
            buffer_pool,
            key_schema,
            leaf_page_id: INVALID_PAGE_ID,
            node: None,
            index: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.leaf_page_id == INVALID_PAGE_ID
    }

    /// Release the pin and become the end iterator.
    fn finish(&mut self) {
        if self.leaf_page_id != INVALID_PAGE_ID {
            self.buffer_pool.wl().unpin_page(self.leaf_page_id, false);
            self.leaf_page_id = INVALID_PAGE_ID;
            self.node = None;
            self.index = 0;
        }
    }
}

impl Iterator for IndexIterator {
    type Item = (IndexKey, RowId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node.as_ref()?;
            if self.index < node.entries.len() {
                let item = node.entries[self.index].clone();
                self.index += 1;
                return Some(item);
            }

            let next_page_id = node.next_page_id;
            if next_page_id == INVALID_PAGE_ID {
                self.finish();
                return None;
            }

            // pin the successor before letting go of the current leaf
            let fetch_result = self.buffer_pool.wl().fetch_page(next_page_id);
            let page = match fetch_result {
                Ok(page) => page,
                Err(e) => {
                    error!("index iterator failed to fetch leaf {}: {}", next_page_id, e);
                    self.finish();
                    return None;
                }
            };
            let next_node = LeafNode::from_page(&page.rl(), &self.key_schema);
            self.buffer_pool.wl().unpin_page(self.leaf_page_id, false);
            self.leaf_page_id = next_page_id;
            self.node = Some(next_node);
            self.index = 0;
        }
    }
}

impl PartialEq for IndexIterator {
    fn eq(&self, other: &Self) -> bool {
        self.leaf_page_id == other.leaf_page_id && self.index == other.index
    }
}

impl Drop for IndexIterator {
    fn drop(&mut self) {
        self.finish();
    }
}
