use log::debug;

use crate::{
    buffer::buffer_pool::BufferPool,
    config::{INDEX_ROOTS_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE},
    error::{DbError, DbResult},
    index::{
        index_iterator::IndexIterator,
        index_key::IndexKey,
        index_roots_page::IndexRootsPage,
        tree_page::{
            self, InternalNode, LeafNode, TreeNode, TreePageType, CHILD_ID_SIZE,
            INTERNAL_HEADER_SIZE, LEAF_HEADER_SIZE, ROW_ID_SIZE,
        },
    },
    record::{RowId, Schema},
    types::{HandyRwLock, IndexId, PageId, Pod},
};

/// A durable ordered map from index keys to row ids, stored as a B+
/// tree of buffer pool pages.
///
/// The tree owns no pages, only `root_page_id`; parent/child links are
/// page-id-valued and every traversal re-fetches through the pool, so a
/// node surviving an eviction is found again in whatever frame it lands
/// in. Keys are unique.
pub struct BPlusTree {
    index_id: IndexId,
    buffer_pool: Pod<BufferPool>,
    key_schema: Schema,
    root_page_id: PageId,
    leaf_max_size: u32,
    internal_max_size: u32,
}

// init functions
impl BPlusTree {
    /// Attach to the index's tree, loading the root id from the index
    /// roots directory page. Pass zero max sizes to derive them from the
    /// page capacity.
    pub fn new(
        index_id: IndexId,
        buffer_pool: Pod<BufferPool>,
        key_schema: Schema,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> DbResult<BPlusTree> {
        let key_size = IndexKey::key_size(&key_schema);
        let leaf_max_size = if leaf_max_size > 0 {
            leaf_max_size
        } else {
            ((PAGE_SIZE - LEAF_HEADER_SIZE) / (key_size + ROW_ID_SIZE) - 1) as u32
        };
        let internal_max_size = if internal_max_size > 0 {
            internal_max_size
        } else {
            ((PAGE_SIZE - INTERNAL_HEADER_SIZE) / (key_size + CHILD_ID_SIZE) - 1) as u32
        };

        let root_page_id = {
            let page = buffer_pool.wl().fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let roots = IndexRootsPage::from_page(&page.rl());
            buffer_pool.wl().unpin_page(INDEX_ROOTS_PAGE_ID, false);
            roots.get_root_id(index_id).unwrap_or(INVALID_PAGE_ID)
        };

        Ok(BPlusTree {
            index_id,
            buffer_pool,
            key_schema,
            root_page_id,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }
}

// point lookup
impl BPlusTree {
    /// Point lookup. `Ok(None)` when the key is absent.
    pub fn get_value(&self, key: &IndexKey) -> DbResult<Option<RowId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let leaf = self.read_leaf(leaf_page_id)?;
        Ok(leaf.lookup(key))
    }
}

// insertion
impl BPlusTree {
    /// Insert the key/value pair, keeping keys unique: an insert of a
    /// key already present changes nothing and reports false.
    pub fn insert(&mut self, key: &IndexKey, rid: RowId) -> DbResult<bool> {
        if self.is_empty() {
            self.start_new_tree(key, rid)?;
            return Ok(true);
        }

        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let mut leaf = self.read_leaf(leaf_page_id)?;
        if leaf.lookup(key).is_some() {
            return Ok(false);
        }

        leaf.insert(key.clone(), rid);
        if leaf.size() <= leaf.max_size as usize {
            self.write_leaf(&leaf)?;
            return Ok(true);
        }
        self.split_leaf(leaf)?;
        Ok(true)
    }

    /// Seed the tree with its first leaf.
    fn start_new_tree(&mut self, key: &IndexKey, rid: RowId) -> DbResult {
        let (page_id, page) = self.buffer_pool.wl().new_page()?;
        let mut leaf = LeafNode::new(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        leaf.insert(key.clone(), rid);
        leaf.write_to(&mut page.wl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(page_id, true);

        self.root_page_id = page_id;
        self.update_root_page_id()?;
        debug!("index {}: new tree rooted at page {}", self.index_id, page_id);
        Ok(())
    }

    /// Split an overflowing leaf: move the upper half into a fresh right
    /// sibling, thread it into the leaf chain and push the sibling's
    /// first key up to the parent.
    ///
    /// The new sibling is written before the old leaf's chain pointer
    /// changes, so every page image hitting the disk describes a
    /// walkable tree.
    fn split_leaf(&mut self, mut leaf: LeafNode) -> DbResult {
        let (new_page_id, new_page) = self.buffer_pool.wl().new_page()?;
        let mut new_leaf = LeafNode::new(new_page_id, leaf.parent_page_id, self.leaf_max_size);
        leaf.move_half_to(&mut new_leaf);
        new_leaf.next_page_id = leaf.next_page_id;
        leaf.next_page_id = new_page_id;

        let separator = new_leaf.first_key().clone();
        new_leaf.write_to(&mut new_page.wl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(new_page_id, true);
        self.write_leaf(&leaf)?;

        debug!(
            "index {}: leaf {} split, new sibling {}",
            self.index_id, leaf.page_id, new_page_id
        );
        self.insert_into_parent(leaf.page_id, leaf.parent_page_id, separator, new_page_id)
    }

    /// Hook `new_child` (the right half of a split) into the parent of
    /// `old_child`, growing a new root when `old_child` was the root and
    /// splitting the parent recursively when it overflows in turn.
    fn insert_into_parent(
        &mut self,
        old_child: PageId,
        parent_page_id: PageId,
        key: IndexKey,
        new_child: PageId,
    ) -> DbResult {
        if old_child == self.root_page_id {
            let (root_page_id, root_page) = self.buffer_pool.wl().new_page()?;
            let root = InternalNode::new_root(
                root_page_id,
                self.internal_max_size,
                key,
                old_child,
                new_child,
            );
            root.write_to(&mut root_page.wl(), &self.key_schema);
            self.buffer_pool.wl().unpin_page(root_page_id, true);

            self.set_parent_pointer(old_child, root_page_id)?;
            self.set_parent_pointer(new_child, root_page_id)?;
            self.root_page_id = root_page_id;
            self.update_root_page_id()?;
            debug!("index {}: new root {}", self.index_id, root_page_id);
            return Ok(());
        }

        let mut parent = self.read_internal(parent_page_id)?;
        self.set_parent_pointer(new_child, parent_page_id)?;
        parent.insert_node_after(old_child, key, new_child);
        if parent.size() <= parent.max_size as usize {
            self.write_internal(&parent)?;
            return Ok(());
        }

        // the parent overflows as well, split it and keep going up
        let (new_page_id, new_page) = self.buffer_pool.wl().new_page()?;
        let mut new_internal =
            InternalNode::new(new_page_id, parent.parent_page_id, self.internal_max_size);
        parent.move_half_to(&mut new_internal);
        for (_, child) in new_internal.entries.clone() {
            self.set_parent_pointer(child, new_page_id)?;
        }

        let separator = new_internal.key_at(0).clone();
        new_internal.write_to(&mut new_page.wl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(new_page_id, true);
        self.write_internal(&parent)?;

        debug!(
            "index {}: internal {} split, new sibling {}",
            self.index_id, parent_page_id, new_page_id
        );
        self.insert_into_parent(parent_page_id, parent.parent_page_id, separator, new_page_id)
    }
}

// deletion
impl BPlusTree {
    /// Remove the entry for `key`; absent keys are a no-op. Underflowing
    /// nodes borrow from or merge with a sibling, collapsing the root
    /// when it runs empty.
    pub fn remove(&mut self, key: &IndexKey) -> DbResult {
        if self.is_empty() {
            return Ok(());
        }
        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let mut leaf = self.read_leaf(leaf_page_id)?;
        if !leaf.remove_record(key) {
            return Ok(());
        }
        self.write_leaf(&leaf)?;
        self.coalesce_or_redistribute(leaf_page_id)
    }

    /// Restore the size invariant of the node after a removal, recursing
    /// up the tree when a merge shrinks the parent.
    fn coalesce_or_redistribute(&mut self, page_id: PageId) -> DbResult {
        if page_id == self.root_page_id {
            return self.adjust_root();
        }

        let node = self.read_tree_node(page_id)?;
        let parent_page_id = node.parent_page_id();
        let mut parent = self.read_internal(parent_page_id)?;
        let index = parent.value_index(page_id).ok_or_else(|| {
            DbError::Corruption(format!(
                "page {} missing from its parent {}",
                page_id, parent_page_id
            ))
        })?;

        // a removal at position 0 changed the leaf's minimum, keep the
        // parent's separator in sync (the dummy slot needs no refresh)
        if let TreeNode::Leaf(leaf) = &node {
            if index > 0 && leaf.size() > 0 {
                parent.set_key_at(index, leaf.first_key().clone());
                self.write_internal(&parent)?;
            }
        }

        if node.size() >= node.min_size() {
            return Ok(());
        }

        // pick a sibling: the right one for the first child, the left
        // one for the last, and for the middle whichever lets us get
        // away with a single-entry rotation
        let last_index = parent.size() - 1;
        if index == 0 {
            let neighbor_page_id = parent.child_at(1);
            let neighbor = self.read_tree_node(neighbor_page_id)?;
            if node.size() + neighbor.size() > node.max_size() as usize {
                self.redistribute(parent, node, neighbor, index, true)
            } else {
                self.coalesce(parent, node, neighbor, index, true)
            }
        } else if index == last_index {
            let neighbor_page_id = parent.child_at(index - 1);
            let neighbor = self.read_tree_node(neighbor_page_id)?;
            if node.size() + neighbor.size() > node.max_size() as usize {
                self.redistribute(parent, node, neighbor, index, false)
            } else {
                self.coalesce(parent, node, neighbor, index, false)
            }
        } else {
            let left = self.read_tree_node(parent.child_at(index - 1))?;
            let right = self.read_tree_node(parent.child_at(index + 1))?;
            if node.size() + left.size() > node.max_size() as usize {
                self.redistribute(parent, node, left, index, false)
            } else if node.size() + right.size() > node.max_size() as usize {
                self.redistribute(parent, node, right, index, true)
            } else {
                self.coalesce(parent, node, left, index, false)
            }
        }
    }

    /// Move a single entry from the neighbor into the underfull node.
    /// For internal nodes the separator key rotates through the parent.
    fn redistribute(
        &mut self,
        mut parent: InternalNode,
        node: TreeNode,
        neighbor: TreeNode,
        index: usize,
        neighbor_is_right: bool,
    ) -> DbResult {
        match (node, neighbor) {
            (TreeNode::Leaf(mut node), TreeNode::Leaf(mut neighbor)) => {
                if neighbor_is_right {
                    // first of the right sibling becomes our last
                    let moved = neighbor.entries.remove(0);
                    node.entries.push(moved);
                    parent.set_key_at(index + 1, neighbor.first_key().clone());
                } else {
                    // last of the left sibling becomes our first
                    let moved = neighbor.entries.pop().expect("neighbor cannot be empty");
                    node.entries.insert(0, moved);
                    parent.set_key_at(index, node.first_key().clone());
                }
                self.write_leaf(&node)?;
                self.write_leaf(&neighbor)?;
            }
            (TreeNode::Internal(mut node), TreeNode::Internal(mut neighbor)) => {
                if neighbor_is_right {
                    // rotate the separator down into our tail and the
                    // neighbor's new dummy key up into the parent
                    let separator = parent.key_at(index + 1).clone();
                    let (_, child) = neighbor.entries.remove(0);
                    node.entries.push((separator, child));
                    self.set_parent_pointer(child, node.page_id)?;
                    parent.set_key_at(index + 1, neighbor.key_at(0).clone());
                } else {
                    let separator = parent.key_at(index).clone();
                    let (moved_key, child) = neighbor
                        .entries
                        .pop()
                        .expect("neighbor cannot be empty");
                    node.set_key_at(0, separator);
                    node.entries.insert(0, (moved_key.clone(), child));
                    self.set_parent_pointer(child, node.page_id)?;
                    parent.set_key_at(index, moved_key);
                }
                self.write_internal(&node)?;
                self.write_internal(&neighbor)?;
            }
            _ => {
                return Err(DbError::Corruption(
                    "sibling tree pages disagree on their variant".to_string(),
                ))
            }
        }
        self.write_internal(&parent)
    }

    /// Merge the right node of the pair into the left one, drop the
    /// separator from the parent and free the emptied page. The parent
    /// may underflow in turn.
    fn coalesce(
        &mut self,
        mut parent: InternalNode,
        node: TreeNode,
        neighbor: TreeNode,
        index: usize,
        neighbor_is_right: bool,
    ) -> DbResult {
        let parent_page_id = parent.page_id;
        let separator_index = if neighbor_is_right { index + 1 } else { index };

        let freed_page_id = match (node, neighbor) {
            (TreeNode::Leaf(node), TreeNode::Leaf(neighbor)) => {
                let (mut left, mut right) = if neighbor_is_right {
                    (node, neighbor)
                } else {
                    (neighbor, node)
                };
                let freed = right.page_id;
                right.move_all_to(&mut left);
                left.next_page_id = right.next_page_id;
                self.write_leaf(&left)?;
                freed
            }
            (TreeNode::Internal(node), TreeNode::Internal(neighbor)) => {
                let (mut left, mut right) = if neighbor_is_right {
                    (node, neighbor)
                } else {
                    (neighbor, node)
                };
                let freed = right.page_id;
                let moved: Vec<PageId> =
                    right.entries.iter().map(|(_, child)| *child).collect();
                right.move_all_to(&mut left, parent.key_at(separator_index).clone());
                for child in moved {
                    self.set_parent_pointer(child, left.page_id)?;
                }
                self.write_internal(&left)?;
                freed
            }
            _ => {
                return Err(DbError::Corruption(
                    "sibling tree pages disagree on their variant".to_string(),
                ))
            }
        };

        parent.remove(separator_index);
        self.write_internal(&parent)?;
        self.buffer_pool.wl().delete_page(freed_page_id)?;
        debug!(
            "index {}: page {} coalesced away",
            self.index_id, freed_page_id
        );
        self.coalesce_or_redistribute(parent_page_id)
    }

    /// The root may under-fill; collapse it once it carries no
    /// information: an empty root leaf ends the tree, an internal root
    /// with a single child promotes that child.
    fn adjust_root(&mut self) -> DbResult {
        let root = self.read_tree_node(self.root_page_id)?;
        match root {
            TreeNode::Leaf(leaf) if leaf.size() == 0 => {
                let old_root = self.root_page_id;
                self.buffer_pool.wl().delete_page(old_root)?;
                self.root_page_id = INVALID_PAGE_ID;
                self.update_root_page_id()?;
                debug!("index {}: tree is empty again", self.index_id);
            }
            TreeNode::Internal(internal) if internal.size() == 1 => {
                let old_root = self.root_page_id;
                let child = internal.only_child();
                self.set_parent_pointer(child, INVALID_PAGE_ID)?;
                self.buffer_pool.wl().delete_page(old_root)?;
                self.root_page_id = child;
                self.update_root_page_id()?;
                debug!(
                    "index {}: root collapsed, {} promoted",
                    self.index_id, child
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Dismantle the whole tree, page by page, leaving the index empty.
    pub fn destroy(&mut self) -> DbResult {
        while !self.is_empty() {
            let leaf_page_id = self.find_leaf_page(None)?;
            let leaf = self.read_leaf(leaf_page_id)?;
            match leaf.entries.first() {
                Some((key, _)) => {
                    let key = key.clone();
                    self.remove(&key)?;
                }
                None => {
                    // an empty root leaf, drop it directly
                    self.buffer_pool.wl().delete_page(leaf_page_id)?;
                    self.root_page_id = INVALID_PAGE_ID;
                    self.update_root_page_id()?;
                }
            }
        }
        Ok(())
    }
}

// iterators
impl BPlusTree {
    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> DbResult<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::end(
                self.buffer_pool.clone(),
                self.key_schema.clone(),
            ));
        }
        let leaf_page_id = self.find_leaf_page(None)?;
        IndexIterator::new_at(
            self.buffer_pool.clone(),
            self.key_schema.clone(),
            leaf_page_id,
            0,
        )
    }

    /// Iterator positioned at the first entry whose key is >= `key`.
    pub fn begin_at(&self, key: &IndexKey) -> DbResult<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::end(
                self.buffer_pool.clone(),
                self.key_schema.clone(),
            ));
        }
        let leaf_page_id = self.find_leaf_page(Some(key))?;
        let leaf = self.read_leaf(leaf_page_id)?;
        let index = leaf.key_index(key);
        IndexIterator::new_at(
            self.buffer_pool.clone(),
            self.key_schema.clone(),
            leaf_page_id,
            index,
        )
    }

    /// The position past the last entry of the last leaf.
    pub fn end(&self) -> IndexIterator {
        IndexIterator::end(self.buffer_pool.clone(), self.key_schema.clone())
    }
}

// page plumbing
impl BPlusTree {
    /// Walk from the root to the leaf responsible for `key` (the
    /// leftmost leaf when no key is given). Each step holds a single
    /// pin, released before descending.
    fn find_leaf_page(&self, key: Option<&IndexKey>) -> DbResult<PageId> {
        let mut page_id = self.root_page_id;
        loop {
            let page = self.buffer_pool.wl().fetch_page(page_id)?;
            let node_type = tree_page::page_type(&page.rl());
            match node_type {
                Ok(TreePageType::Leaf) => {
                    self.buffer_pool.wl().unpin_page(page_id, false);
                    return Ok(page_id);
                }
                Ok(TreePageType::Internal) => {
                    let internal = InternalNode::from_page(&page.rl(), &self.key_schema);
                    self.buffer_pool.wl().unpin_page(page_id, false);
                    page_id = match key {
                        Some(key) => internal.lookup(key),
                        None => internal.child_at(0),
                    };
                }
                Err(e) => {
                    self.buffer_pool.wl().unpin_page(page_id, false);
                    return Err(e);
                }
            }
        }
    }

    fn read_tree_node(&self, page_id: PageId) -> DbResult<TreeNode> {
        let page = self.buffer_pool.wl().fetch_page(page_id)?;
        let node = TreeNode::from_page(&page.rl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(page_id, false);
        node
    }

    fn read_leaf(&self, page_id: PageId) -> DbResult<LeafNode> {
        match self.read_tree_node(page_id)? {
            TreeNode::Leaf(leaf) => Ok(leaf),
            TreeNode::Internal(_) => Err(DbError::Corruption(format!(
                "page {} is not a leaf page",
                page_id
            ))),
        }
    }

    fn read_internal(&self, page_id: PageId) -> DbResult<InternalNode> {
        match self.read_tree_node(page_id)? {
            TreeNode::Internal(internal) => Ok(internal),
            TreeNode::Leaf(_) => Err(DbError::Corruption(format!(
                "page {} is not an internal page",
                page_id
            ))),
        }
    }

    fn write_leaf(&self, node: &LeafNode) -> DbResult {
        let page = self.buffer_pool.wl().fetch_page(node.page_id)?;
        node.write_to(&mut page.wl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(node.page_id, true);
        Ok(())
    }

    fn write_internal(&self, node: &InternalNode) -> DbResult {
        let page = self.buffer_pool.wl().fetch_page(node.page_id)?;
        node.write_to(&mut page.wl(), &self.key_schema);
        self.buffer_pool.wl().unpin_page(node.page_id, true);
        Ok(())
    }

    fn set_parent_pointer(&self, page_id: PageId, parent_page_id: PageId) -> DbResult {
        let page = self.buffer_pool.wl().fetch_page(page_id)?;
        tree_page::set_parent_page_id(&mut page.wl(), parent_page_id);
        self.buffer_pool.wl().unpin_page(page_id, true);
        Ok(())
    }

    /// Persist the root id in the index roots directory page. Called on
    /// every root change.
    fn update_root_page_id(&self) -> DbResult {
        let page = self.buffer_pool.wl().fetch_page(INDEX_ROOTS_PAGE_ID)?;
        let mut roots = IndexRootsPage::from_page(&page.rl());
        roots.set_root_id(self.index_id, self.root_page_id);
        roots.write_to(&mut page.wl());
        self.buffer_pool.wl().unpin_page(INDEX_ROOTS_PAGE_ID, true);
        Ok(())
    }
}

// integrity checking, used by tests after every batch of operations
impl BPlusTree {
    /// Walk the whole tree and assert every structural invariant: size
    /// bounds on non-root nodes, strictly ascending keys, separator/
    /// subtree agreement, parent pointers, and a leaf chain that visits
    /// every key in ascending order.
    pub fn check_integrity(&self) -> DbResult {
        if self.is_empty() {
            return Ok(());
        }
        let leaf_count = self.check_node(self.root_page_id, INVALID_PAGE_ID, None, None, true)?;

        // independently walk the leaf chain
        let mut chained = 0;
        let mut previous: Option<IndexKey> = None;
        let mut page_id = self.find_leaf_page(None)?;
        while page_id != INVALID_PAGE_ID {
            let leaf = self.read_leaf(page_id)?;
            for (key, _) in &leaf.entries {
                if let Some(previous) = &previous {
                    assert!(previous < key, "leaf chain keys must ascend");
                }
                previous = Some(key.clone());
                chained += 1;
            }
            page_id = leaf.next_page_id;
        }
        assert_eq!(
            chained, leaf_count,
            "leaf chain must visit every key exactly once"
        );
        Ok(())
    }

    fn check_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        lower: Option<&IndexKey>,
        upper: Option<&IndexKey>,
        is_root: bool,
    ) -> DbResult<usize> {
        let node = self.read_tree_node(page_id)?;
        assert_eq!(
            node.parent_page_id(),
            expected_parent,
            "page {} has a stale parent pointer",
            page_id
        );
        if !is_root {
            assert!(
                node.size() >= node.min_size(),
                "page {} underflows: {} < {}",
                page_id,
                node.size(),
                node.min_size()
            );
        }
        assert!(
            node.size() <= node.max_size() as usize,
            "page {} overflows",
            page_id
        );

        match node {
            TreeNode::Leaf(leaf) => {
                for window in leaf.entries.windows(2) {
                    assert!(window[0].0 < window[1].0, "leaf keys must ascend");
                }
                if let (Some(lower), Some((first, _))) = (lower, leaf.entries.first()) {
                    assert!(lower <= first, "leaf key below its subtree bound");
                }
                if let (Some(upper), Some((last, _))) = (upper, leaf.entries.last()) {
                    assert!(last < upper, "leaf key above its subtree bound");
                }
                Ok(leaf.size())
            }
            TreeNode::Internal(internal) => {
                for i in 2..internal.size() {
                    assert!(
                        internal.key_at(i - 1) < internal.key_at(i),
                        "internal keys must ascend"
                    );
                }
                let mut total = 0;
                for i in 0..internal.size() {
                    let child_lower = if i == 0 {
                        lower
                    } else {
                        Some(internal.key_at(i))
                    };
                    let child_upper = if i + 1 < internal.size() {
                        Some(internal.key_at(i + 1))
                    } else {
                        upper
                    };
                    total += self.check_node(
                        internal.child_at(i),
                        page_id,
                        child_lower,
                        child_upper,
                        false,
                    )?;
                }
                Ok(total)
            }
        }
    }
}
