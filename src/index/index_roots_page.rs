use std::io::Cursor;

use crate::{
    config::PAGE_SIZE,
    io::{ByteWriter, Decodeable},
    storage::page::Page,
    types::{IndexId, PageId},
};

/// The well-known directory page mapping every index id to the logical
/// id of its current root page. Rewritten on every root change so a
/// reopened database can find its trees again.
///
/// # Format
///
/// | count (4) | (index_id (4), root_page_id (4)) ... |
pub struct IndexRootsPage {
    roots: Vec<(IndexId, PageId)>,
}

impl IndexRootsPage {
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    pub fn from_page(page: &Page) -> Self {
        let mut reader = Cursor::new(&page.data()[..]);
        let count = u32::decode_from(&mut reader);
        let mut roots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index_id = u32::decode_from(&mut reader);
            let root_page_id = i32::decode_from(&mut reader);
            roots.push((index_id, root_page_id));
        }
        Self { roots }
    }

    pub fn write_to(&self, page: &mut Page) {
        let mut writer = ByteWriter::new();
        writer.write(&(self.roots.len() as u32));
        for (index_id, root_page_id) in &self.roots {
            writer.write(index_id);
            writer.write(root_page_id);
        }
        let bytes = writer.to_padded_bytes(PAGE_SIZE);
        page.data_mut().copy_from_slice(&bytes);
    }

    pub fn get_root_id(&self, index_id: IndexId) -> Option<PageId> {
        self.roots
            .iter()
            .find(|(id, _)| *id == index_id)
            .map(|(_, root)| *root)
    }

    /// Record the new root for the index, inserting the entry on first
    /// use.
    pub fn set_root_id(&mut self, index_id: IndexId, root_page_id: PageId) {
        for entry in self.roots.iter_mut() {
            if entry.0 == index_id {
                entry.1 = root_page_id;
                return;
            }
        }
        self.roots.push((index_id, root_page_id));
    }

    pub fn remove(&mut self, index_id: IndexId) {
        self.roots.retain(|(id, _)| *id != index_id);
    }
}
