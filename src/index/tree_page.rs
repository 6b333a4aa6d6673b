use std::io::Cursor;

use crate::{
    config::{INVALID_PAGE_ID, PAGE_SIZE},
    error::{DbError, DbResult},
    index::index_key::IndexKey,
    io::{ByteWriter, Decodeable},
    record::{RowId, Schema},
    storage::page::Page,
    types::PageId,
};

// The two tree page variants share a header prefix:
//
// | page_type (4) | size (4) | max_size (4) | parent_page_id (4) | page_id (4) |
//
// A leaf additionally stores `next_page_id` (4) before its entry array.
// Entries are fixed width: the serialized key followed by a RowId
// (leaf) or a child page id (internal). The first entry of an internal
// page carries a dummy key that is never consulted.
const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_PAGE_ID_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 16;
pub const INTERNAL_HEADER_SIZE: usize = 20;
const NEXT_PAGE_ID_OFFSET: usize = 20;
pub const LEAF_HEADER_SIZE: usize = 24;

pub const ROW_ID_SIZE: usize = 8;
pub const CHILD_ID_SIZE: usize = 4;

const INTERNAL_PAGE_TAG: u32 = 1;
const LEAF_PAGE_TAG: u32 = 2;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TreePageType {
    Internal,
    Leaf,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Peek the variant tag without decoding the whole node.
pub fn page_type(page: &Page) -> DbResult<TreePageType> {
    match read_u32(page.data(), PAGE_TYPE_OFFSET) {
        INTERNAL_PAGE_TAG => Ok(TreePageType::Internal),
        LEAF_PAGE_TAG => Ok(TreePageType::Leaf),
        tag => Err(DbError::Corruption(format!(
            "unknown tree page tag {} on page {}",
            tag,
            page.page_id()
        ))),
    }
}

pub fn parent_page_id(page: &Page) -> PageId {
    read_i32(page.data(), PARENT_PAGE_ID_OFFSET)
}

/// Poke the parent pointer without a full decode/encode cycle. Used
/// when a split or merge adopts children into a different parent.
pub fn set_parent_page_id(page: &mut Page, parent: PageId) {
    page.data_mut()[PARENT_PAGE_ID_OFFSET..PARENT_PAGE_ID_OFFSET + 4]
        .copy_from_slice(&parent.to_le_bytes());
}

/// A leaf node decoded into memory: sorted `(key, row_id)` pairs plus
/// the forward chain pointer.
pub struct LeafNode {
    pub page_id: PageId,
    pub parent_page_id: PageId,
    pub next_page_id: PageId,
    pub max_size: u32,
    pub entries: Vec<(IndexKey, RowId)>,
}

impl LeafNode {
    pub fn new(page_id: PageId, parent_page_id: PageId, max_size: u32) -> Self {
        Self {
            page_id,
            parent_page_id,
            next_page_id: INVALID_PAGE_ID,
            max_size,
            entries: Vec::new(),
        }
    }

    pub fn from_page(page: &Page, key_schema: &Schema) -> Self {
        let data = page.data();
        debug_assert_eq!(read_u32(data, PAGE_TYPE_OFFSET), LEAF_PAGE_TAG);
        let size = read_u32(data, SIZE_OFFSET) as usize;
        let max_size = read_u32(data, MAX_SIZE_OFFSET);
        let parent_page_id = read_i32(data, PARENT_PAGE_ID_OFFSET);
        let page_id = read_i32(data, PAGE_ID_OFFSET);
        let next_page_id = read_i32(data, NEXT_PAGE_ID_OFFSET);

        let mut reader = Cursor::new(&data[LEAF_HEADER_SIZE..]);
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let key = IndexKey::deserialize_from(&mut reader, key_schema);
            let rid = RowId::decode_from(&mut reader);
            entries.push((key, rid));
        }
        Self {
            page_id,
            parent_page_id,
            next_page_id,
            max_size,
            entries,
        }
    }

    pub fn write_to(&self, page: &mut Page, key_schema: &Schema) {
        let mut writer = ByteWriter::new();
        writer.write(&LEAF_PAGE_TAG);
        writer.write(&(self.entries.len() as u32));
        writer.write(&self.max_size);
        writer.write(&self.parent_page_id);
        writer.write(&self.page_id);
        writer.write(&self.next_page_id);
        for (key, rid) in &self.entries {
            key.serialize_to(&mut writer, key_schema);
            writer.write(rid);
        }
        let bytes = writer.to_padded_bytes(PAGE_SIZE);
        page.data_mut().copy_from_slice(&bytes);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn min_size(&self) -> usize {
        self.max_size as usize / 2
    }

    /// First index whose key is >= the probe, `size()` when every key is
    /// smaller.
    pub fn key_index(&self, key: &IndexKey) -> usize {
        let mut lo = 0;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.entries[mid].0 < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<RowId> {
        let index = self.key_index(key);
        if index < self.entries.len() && self.entries[index].0 == *key {
            return Some(self.entries[index].1);
        }
        None
    }

    /// Insert keeping the entries sorted. The caller has already ruled
    /// out duplicates.
    pub fn insert(&mut self, key: IndexKey, rid: RowId) -> usize {
        let index = self.key_index(&key);
        self.entries.insert(index, (key, rid));
        self.entries.len()
    }

    /// Remove the entry for `key` if present.
    pub fn remove_record(&mut self, key: &IndexKey) -> bool {
        let index = self.key_index(key);
        if index < self.entries.len() && self.entries[index].0 == *key {
            self.entries.remove(index);
            return true;
        }
        false
    }

    /// Split support: keep the lower half, hand the upper half
    /// `[max_size / 2, size)` to the fresh right sibling.
    pub fn move_half_to(&mut self, recipient: &mut LeafNode) {
        let split_at = self.max_size as usize / 2;
        recipient.entries.extend(self.entries.drain(split_at..));
    }

    /// Merge support: push every entry onto the recipient.
    pub fn move_all_to(&mut self, recipient: &mut LeafNode) {
        recipient.entries.append(&mut self.entries);
    }

    pub fn first_key(&self) -> &IndexKey {
        &self.entries[0].0
    }
}

/// An internal node decoded into memory: `(key, child)` pairs where
/// `entries[0]`'s key is the ignored dummy and child `i` roots the
/// subtree of keys in `[key_i, key_{i+1})`.
pub struct InternalNode {
    pub page_id: PageId,
    pub parent_page_id: PageId,
    pub max_size: u32,
    pub entries: Vec<(IndexKey, PageId)>,
}

impl InternalNode {
    pub fn new(page_id: PageId, parent_page_id: PageId, max_size: u32) -> Self {
        Self {
            page_id,
            parent_page_id,
            max_size,
            entries: Vec::new(),
        }
    }

    /// Build the root produced by the first leaf split: the old page on
    /// the left of `key`, the new page on the right. The dummy slot
    /// reuses `key`, its value is never read.
    pub fn new_root(
        page_id: PageId,
        max_size: u32,
        key: IndexKey,
        left: PageId,
        right: PageId,
    ) -> Self {
        Self {
            page_id,
            parent_page_id: INVALID_PAGE_ID,
            max_size,
            entries: vec![(key.clone(), left), (key, right)],
        }
    }

    pub fn from_page(page: &Page, key_schema: &Schema) -> Self {
        let data = page.data();
        debug_assert_eq!(read_u32(data, PAGE_TYPE_OFFSET), INTERNAL_PAGE_TAG);
        let size = read_u32(data, SIZE_OFFSET) as usize;
        let max_size = read_u32(data, MAX_SIZE_OFFSET);
        let parent_page_id = read_i32(data, PARENT_PAGE_ID_OFFSET);
        let page_id = read_i32(data, PAGE_ID_OFFSET);

        let mut reader = Cursor::new(&data[INTERNAL_HEADER_SIZE..]);
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let key = IndexKey::deserialize_from(&mut reader, key_schema);
            let child = i32::decode_from(&mut reader);
            entries.push((key, child));
        }
        Self {
            page_id,
            parent_page_id,
            max_size,
            entries,
        }
    }

    pub fn write_to(&self, page: &mut Page, key_schema: &Schema) {
        let mut writer = ByteWriter::new();
        writer.write(&INTERNAL_PAGE_TAG);
        writer.write(&(self.entries.len() as u32));
        writer.write(&self.max_size);
        writer.write(&self.parent_page_id);
        writer.write(&self.page_id);
        for (key, child) in &self.entries {
            key.serialize_to(&mut writer, key_schema);
            writer.write(child);
        }
        let bytes = writer.to_padded_bytes(PAGE_SIZE);
        page.data_mut().copy_from_slice(&bytes);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn min_size(&self) -> usize {
        self.max_size as usize / 2
    }

    /// Child page holding `key`: the slot `i >= 1` with
    /// `key_i <= key < key_{i+1}`, falling back to the outermost
    /// children. The dummy slot at index 0 is skipped.
    pub fn lookup(&self, key: &IndexKey) -> PageId {
        for i in 1..self.entries.len() {
            if *key < self.entries[i].0 {
                return self.entries[i - 1].1;
            }
        }
        self.entries[self.entries.len() - 1].1
    }

    pub fn key_at(&self, index: usize) -> &IndexKey {
        &self.entries[index].0
    }

    pub fn set_key_at(&mut self, index: usize, key: IndexKey) {
        self.entries[index].0 = key;
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.entries[index].1
    }

    /// Slot of the given child pointer.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        self.entries.iter().position(|(_, c)| *c == child)
    }

    /// Insert `(key, new_child)` right after the entry pointing at
    /// `old_child`.
    pub fn insert_node_after(&mut self, old_child: PageId, key: IndexKey, new_child: PageId) -> usize {
        let index = self
            .value_index(old_child)
            .expect("the split child must be present in its parent");
        self.entries.insert(index + 1, (key, new_child));
        self.entries.len()
    }

    pub fn remove(&mut self, index: usize) {
        self.entries.remove(index);
    }

    /// Split support: keep `[0, max_size / 2)`, hand the rest to the
    /// fresh right sibling. The first moved key becomes the sibling's
    /// dummy and is pushed up as the separator.
    pub fn move_half_to(&mut self, recipient: &mut InternalNode) {
        let split_at = self.max_size as usize / 2;
        recipient.entries.extend(self.entries.drain(split_at..));
    }

    /// Merge support: the separator from the parent replaces the dummy
    /// key, then everything moves to the recipient.
    pub fn move_all_to(&mut self, recipient: &mut InternalNode, middle_key: IndexKey) {
        if let Some(first) = self.entries.first_mut() {
            first.0 = middle_key;
        }
        recipient.entries.append(&mut self.entries);
    }

    /// Root collapse support: the single remaining child.
    pub fn only_child(&self) -> PageId {
        debug_assert_eq!(self.entries.len(), 1);
        self.entries[0].1
    }
}

/// A decoded tree node of either variant, for the code paths that treat
/// leaves and internal nodes uniformly.
pub enum TreeNode {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl TreeNode {
    pub fn from_page(page: &Page, key_schema: &Schema) -> DbResult<TreeNode> {
        match page_type(page)? {
            TreePageType::Leaf => Ok(TreeNode::Leaf(LeafNode::from_page(page, key_schema))),
            TreePageType::Internal => {
                Ok(TreeNode::Internal(InternalNode::from_page(page, key_schema)))
            }
        }
    }

    pub fn write_to(&self, page: &mut Page, key_schema: &Schema) {
        match self {
            TreeNode::Leaf(node) => node.write_to(page, key_schema),
            TreeNode::Internal(node) => node.write_to(page, key_schema),
        }
    }

    pub fn page_id(&self) -> PageId {
        match self {
            TreeNode::Leaf(node) => node.page_id,
            TreeNode::Internal(node) => node.page_id,
        }
    }

    pub fn parent_page_id(&self) -> PageId {
        match self {
            TreeNode::Leaf(node) => node.parent_page_id,
            TreeNode::Internal(node) => node.parent_page_id,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            TreeNode::Leaf(node) => node.size(),
            TreeNode::Internal(node) => node.size(),
        }
    }

    pub fn min_size(&self) -> usize {
        match self {
            TreeNode::Leaf(node) => node.min_size(),
            TreeNode::Internal(node) => node.min_size(),
        }
    }

    pub fn max_size(&self) -> u32 {
        match self {
            TreeNode::Leaf(node) => node.max_size,
            TreeNode::Internal(node) => node.max_size,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf(_))
    }
}
