use bit_vec::BitVec;

use crate::config::{BITMAP_PAGE_HEADER_SIZE, BITMAP_SIZE, PAGE_SIZE};

/// Occupancy bitmap for one extent of data pages.
///
/// The serialized form is exactly one page: two u32 counters followed by
/// `BITMAP_SIZE` bits. `next_free_page` is a scan hint; every offset
/// below it is known to be allocated, so allocation can start the scan
/// there instead of at zero.
pub struct BitmapPage {
    page_allocated: u32,
    next_free_page: u32,
    bits: BitVec,
}

impl BitmapPage {
    pub fn new() -> Self {
        Self {
            page_allocated: 0,
            next_free_page: 0,
            bits: BitVec::from_elem(BITMAP_SIZE, false),
        }
    }

    pub fn from_bytes(data: &[u8; PAGE_SIZE]) -> Self {
        let page_allocated = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let next_free_page = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let mut bits = BitVec::from_bytes(&data[BITMAP_PAGE_HEADER_SIZE..]);
        bits.truncate(BITMAP_SIZE);
        Self {
            page_allocated,
            next_free_page,
            bits,
        }
    }

    pub fn to_bytes(&self) -> [u8; PAGE_SIZE] {
        let mut data = [0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&self.page_allocated.to_le_bytes());
        data[4..8].copy_from_slice(&self.next_free_page.to_le_bytes());
        let bits = self.bits.to_bytes();
        data[BITMAP_PAGE_HEADER_SIZE..BITMAP_PAGE_HEADER_SIZE + bits.len()]
            .copy_from_slice(&bits);
        data
    }

    pub fn page_allocated(&self) -> u32 {
        self.page_allocated
    }

    pub fn is_full(&self) -> bool {
        self.page_allocated as usize == BITMAP_SIZE
    }

    /// Allocate the first free offset at or after `next_free_page`.
    ///
    /// All offsets below `next_free_page` are allocated (deallocation
    /// rewinds the hint), so the forward scan cannot miss a free slot.
    pub fn allocate(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }
        while self.bits.get(self.next_free_page as usize) == Some(true) {
            self.next_free_page += 1;
        }
        let offset = self.next_free_page;
        self.bits.set(offset as usize, true);
        self.page_allocated += 1;
        Some(offset)
    }

    /// Free the given offset. Freeing an already-free offset is a no-op
    /// and reports false.
    pub fn deallocate(&mut self, offset: u32) -> bool {
        if offset as usize >= BITMAP_SIZE || self.is_free(offset) {
            return false;
        }
        self.bits.set(offset as usize, false);
        self.page_allocated -= 1;
        if offset < self.next_free_page {
            self.next_free_page = offset;
        }
        true
    }

    pub fn is_free(&self, offset: u32) -> bool {
        self.bits.get(offset as usize) != Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_then_free() {
        let mut bitmap = BitmapPage::new();
        assert_eq!(bitmap.allocate(), Some(0));
        assert_eq!(bitmap.allocate(), Some(1));
        assert_eq!(bitmap.allocate(), Some(2));
        assert_eq!(bitmap.page_allocated(), 3);
        assert!(!bitmap.is_free(1));

        assert!(bitmap.deallocate(1));
        assert!(bitmap.is_free(1));
        // double free is a no-op
        assert!(!bitmap.deallocate(1));
        assert_eq!(bitmap.page_allocated(), 2);

        // the freed slot is handed out again before the tail
        assert_eq!(bitmap.allocate(), Some(1));
        assert_eq!(bitmap.allocate(), Some(3));
    }

    #[test]
    fn test_exhaustion() {
        let mut bitmap = BitmapPage::new();
        for i in 0..BITMAP_SIZE {
            assert_eq!(bitmap.allocate(), Some(i as u32));
        }
        assert!(bitmap.is_full());
        assert_eq!(bitmap.allocate(), None);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut bitmap = BitmapPage::new();
        for _ in 0..100 {
            bitmap.allocate().unwrap();
        }
        bitmap.deallocate(57);

        let bytes = bitmap.to_bytes();
        let restored = BitmapPage::from_bytes(&bytes);
        assert_eq!(restored.page_allocated(), 99);
        assert!(restored.is_free(57));
        assert!(!restored.is_free(56));
        assert!(!restored.is_free(99));
        assert!(restored.is_free(100));
    }
}
