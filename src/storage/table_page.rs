use std::io::Cursor;

use log::error;

use crate::{
    config::{INVALID_PAGE_ID, PAGE_SIZE},
    io::ByteWriter,
    record::{Row, RowId, Schema},
    storage::page::Page,
    types::PageId,
};

// Header layout:
//
// | page_id (4) | prev_page_id (4) | next_page_id (4) |
// | free_space_pointer (4) | tuple_count (4) | slot directory ... |
//
// Each slot is an (offset, size) pair. Tuple payloads grow from the page
// tail toward the slot directory; `free_space_pointer` is the lowest
// offset in use.
const PAGE_ID_OFFSET: usize = 0;
const PREV_PAGE_ID_OFFSET: usize = 4;
const NEXT_PAGE_ID_OFFSET: usize = 8;
const FREE_SPACE_POINTER_OFFSET: usize = 12;
const TUPLE_COUNT_OFFSET: usize = 16;
const HEADER_SIZE: usize = 20;
const SLOT_SIZE: usize = 8;

/// High bit of a slot's size marks a tuple that is soft-deleted but not
/// yet reclaimed.
const DELETED_MASK: u32 = 1 << 31;

/// A slotted page of the table heap, decoded from (and written back to)
/// a buffer pool page.
pub struct TablePage {
    data: Box<[u8; PAGE_SIZE]>,
}

impl TablePage {
    pub fn new() -> Self {
        Self {
            data: Box::new([0; PAGE_SIZE]),
        }
    }

    pub fn from_page(page: &Page) -> Self {
        Self {
            data: Box::new(*page.data()),
        }
    }

    pub fn write_to(&self, page: &mut Page) {
        *page.data_mut() = *self.data;
    }

    /// Set up an empty page freshly handed out by the buffer pool.
    pub fn init(&mut self, page_id: PageId, prev_page_id: PageId) {
        self.write_i32(PAGE_ID_OFFSET, page_id);
        self.write_i32(PREV_PAGE_ID_OFFSET, prev_page_id);
        self.write_i32(NEXT_PAGE_ID_OFFSET, INVALID_PAGE_ID);
        self.write_u32(FREE_SPACE_POINTER_OFFSET, PAGE_SIZE as u32);
        self.write_u32(TUPLE_COUNT_OFFSET, 0);
    }

    pub fn page_id(&self) -> PageId {
        self.read_i32(PAGE_ID_OFFSET)
    }

    pub fn prev_page_id(&self) -> PageId {
        self.read_i32(PREV_PAGE_ID_OFFSET)
    }

    pub fn next_page_id(&self) -> PageId {
        self.read_i32(NEXT_PAGE_ID_OFFSET)
    }

    pub fn set_prev_page_id(&mut self, page_id: PageId) {
        self.write_i32(PREV_PAGE_ID_OFFSET, page_id);
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        self.write_i32(NEXT_PAGE_ID_OFFSET, page_id);
    }

    pub fn tuple_count(&self) -> u32 {
        self.read_u32(TUPLE_COUNT_OFFSET)
    }

    fn free_space_pointer(&self) -> u32 {
        self.read_u32(FREE_SPACE_POINTER_OFFSET)
    }

    /// Insert the row, assigning its `row_id`. Returns false when the
    /// page cannot hold the serialized tuple.
    pub fn insert_tuple(&mut self, row: &mut Row) -> bool {
        let mut writer = ByteWriter::new();
        row.serialize_to(&mut writer);
        let bytes = writer.to_bytes();
        let size = bytes.len() as u32;

        // a slot whose tuple was physically reclaimed can be reused
        let count = self.tuple_count();
        let reuse = (0..count).find(|&i| self.slot_size_raw(i) == 0);

        let slot_array_end = match reuse {
            Some(_) => HEADER_SIZE + SLOT_SIZE * count as usize,
            None => HEADER_SIZE + SLOT_SIZE * (count as usize + 1),
        };
        let fsp = self.free_space_pointer() as usize;
        if fsp < slot_array_end + size as usize {
            return false;
        }

        let new_fsp = (fsp - size as usize) as u32;
        self.data[new_fsp as usize..fsp].copy_from_slice(&bytes);
        self.write_u32(FREE_SPACE_POINTER_OFFSET, new_fsp);

        let slot = match reuse {
            Some(slot) => slot,
            None => {
                self.write_u32(TUPLE_COUNT_OFFSET, count + 1);
                count
            }
        };
        self.set_slot(slot, new_fsp, size);
        row.set_row_id(RowId::new(self.page_id(), slot));
        true
    }

    /// Soft-delete: flag the slot, keep the payload in place.
    pub fn mark_delete(&mut self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() {
            return false;
        }
        let raw = self.slot_size_raw(slot_num);
        if raw == 0 || raw & DELETED_MASK != 0 {
            return false;
        }
        self.write_u32(self.slot_offset(slot_num) + 4, raw | DELETED_MASK);
        true
    }

    pub fn rollback_delete(&mut self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() {
            return false;
        }
        let raw = self.slot_size_raw(slot_num);
        if raw & DELETED_MASK == 0 {
            return false;
        }
        self.write_u32(self.slot_offset(slot_num) + 4, raw & !DELETED_MASK);
        true
    }

    /// Physically reclaim the slot's payload, compacting the tuple area
    /// so free space stays contiguous.
    pub fn apply_delete(&mut self, slot_num: u32) {
        if slot_num >= self.tuple_count() {
            return;
        }
        let raw = self.slot_size_raw(slot_num);
        if raw == 0 {
            return;
        }
        let size = (raw & !DELETED_MASK) as usize;
        let offset = self.slot_tuple_offset(slot_num) as usize;
        let fsp = self.free_space_pointer() as usize;

        // slide everything below the hole up over it
        self.data.copy_within(fsp..offset, fsp + size);
        for i in 0..self.tuple_count() {
            let i_raw = self.slot_size_raw(i);
            let i_offset = self.slot_tuple_offset(i);
            if i_raw != 0 && (i_offset as usize) < offset {
                self.write_u32(self.slot_offset(i), i_offset + size as u32);
            }
        }
        self.set_slot(slot_num, 0, 0);
        self.write_u32(FREE_SPACE_POINTER_OFFSET, (fsp + size) as u32);
    }

    /// Overwrite the tuple in place. Returns false when the slot is not
    /// live or the new payload does not fit in the slot's allocation.
    pub fn update_tuple(&mut self, row: &Row, slot_num: u32) -> bool {
        if !self.is_live(slot_num) {
            return false;
        }
        let mut writer = ByteWriter::new();
        row.serialize_to(&mut writer);
        let bytes = writer.to_bytes();

        let capacity = self.slot_size_raw(slot_num) & !DELETED_MASK;
        if bytes.len() as u32 > capacity {
            return false;
        }
        let offset = self.slot_tuple_offset(slot_num) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        true
    }

    pub fn get_tuple(&self, slot_num: u32, schema: &Schema) -> Option<Row> {
        if !self.is_live(slot_num) {
            return None;
        }
        let offset = self.slot_tuple_offset(slot_num) as usize;
        let size = (self.slot_size_raw(slot_num) & !DELETED_MASK) as usize;
        let mut reader = Cursor::new(&self.data[offset..offset + size]);
        match Row::deserialize_from(&mut reader, schema) {
            Ok(mut row) => {
                row.set_row_id(RowId::new(self.page_id(), slot_num));
                Some(row)
            }
            Err(e) => {
                error!(
                    "failed to decode tuple at page {} slot {}: {}",
                    self.page_id(),
                    slot_num,
                    e
                );
                None
            }
        }
    }

    pub fn get_first_tuple_rid(&self) -> Option<RowId> {
        (0..self.tuple_count())
            .find(|&i| self.is_live(i))
            .map(|i| RowId::new(self.page_id(), i))
    }

    pub fn get_next_tuple_rid(&self, cur: &RowId) -> Option<RowId> {
        (cur.slot_num() + 1..self.tuple_count())
            .find(|&i| self.is_live(i))
            .map(|i| RowId::new(self.page_id(), i))
    }

    fn is_live(&self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() {
            return false;
        }
        let raw = self.slot_size_raw(slot_num);
        raw != 0 && raw & DELETED_MASK == 0
    }

    fn slot_offset(&self, slot_num: u32) -> usize {
        HEADER_SIZE + SLOT_SIZE * slot_num as usize
    }

    fn slot_tuple_offset(&self, slot_num: u32) -> u32 {
        self.read_u32(self.slot_offset(slot_num))
    }

    fn slot_size_raw(&self, slot_num: u32) -> u32 {
        self.read_u32(self.slot_offset(slot_num) + 4)
    }

    fn set_slot(&mut self, slot_num: u32, offset: u32, size: u32) {
        let slot = self.slot_offset(slot_num);
        self.write_u32(slot, offset);
        self.write_u32(slot + 4, size);
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
