use crate::types::PageId;

/// Size of a page in bytes, the unit of all disk I/O.
pub const PAGE_SIZE: usize = 4096;

/// Bytes reserved at the head of a bitmap page for its counters.
pub const BITMAP_PAGE_HEADER_SIZE: usize = 8;

/// Number of data pages tracked by a single bitmap page, i.e. the number
/// of data pages in one extent.
pub const BITMAP_SIZE: usize = (PAGE_SIZE - BITMAP_PAGE_HEADER_SIZE) * 8;

pub const INVALID_PAGE_ID: PageId = -1;

/// Physical id of the file meta page.
pub const META_PAGE_ID: PageId = 0;

/// Logical id of the page holding the serialized catalog directory.
pub const CATALOG_META_PAGE_ID: PageId = 0;

/// Logical id of the page mapping index ids to their root pages.
pub const INDEX_ROOTS_PAGE_ID: PageId = 1;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 1024;

// Magic numbers guarding the serialized forms of the catalog metadata.
// A mismatch on read means the page does not hold what we expect and
// deserialization is aborted.
pub const CATALOG_METADATA_MAGIC: u32 = 89849;
pub const TABLE_METADATA_MAGIC: u32 = 344528;
pub const INDEX_METADATA_MAGIC: u32 = 344528;
pub const COLUMN_MAGIC: u32 = 210928;
