use std::path::Path;

use crate::{
    buffer::buffer_pool::BufferPool,
    catalog::catalog_manager::CatalogManager,
    config::{CATALOG_META_PAGE_ID, DEFAULT_POOL_SIZE, INDEX_ROOTS_PAGE_ID},
    error::{DbError, DbResult},
    index::index_roots_page::IndexRootsPage,
    storage::disk_manager::DiskManager,
    types::{pod, HandyRwLock, Pod},
};

/// The assembled storage engine: one database file behind a disk
/// manager, a buffer pool over it, and the catalog on top.
///
/// Creating an engine claims the two well-known logical pages (catalog
/// directory and index roots) before anything else can, so they always
/// carry the ids the rest of the code hard-wires.
pub struct StorageEngine {
    buffer_pool: Pod<BufferPool>,
    catalog: Pod<CatalogManager>,
}

impl StorageEngine {
    /// Create a fresh database file, wiping whatever was at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> DbResult<StorageEngine> {
        Self::build(path, DEFAULT_POOL_SIZE, true)
    }

    /// Open an existing database file.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<StorageEngine> {
        Self::build(path, DEFAULT_POOL_SIZE, false)
    }

    pub fn new_with_pool_size<P: AsRef<Path>>(path: P, pool_size: usize) -> DbResult<StorageEngine> {
        Self::build(path, pool_size, true)
    }

    pub fn open_with_pool_size<P: AsRef<Path>>(path: P, pool_size: usize) -> DbResult<StorageEngine> {
        Self::build(path, pool_size, false)
    }

    fn build<P: AsRef<Path>>(path: P, pool_size: usize, init: bool) -> DbResult<StorageEngine> {
        if init {
            let _ = std::fs::remove_file(&path);
        }
        let disk_manager = DiskManager::new(path)?;
        let buffer_pool = pod(BufferPool::new(pool_size, disk_manager));

        if init {
            let (catalog_page_id, _) = buffer_pool.wl().new_page()?;
            if catalog_page_id != CATALOG_META_PAGE_ID {
                return Err(DbError::Corruption(format!(
                    "catalog meta page allocated as {}",
                    catalog_page_id
                )));
            }
            buffer_pool.wl().unpin_page(catalog_page_id, true);

            let (roots_page_id, roots_page) = buffer_pool.wl().new_page()?;
            if roots_page_id != INDEX_ROOTS_PAGE_ID {
                return Err(DbError::Corruption(format!(
                    "index roots page allocated as {}",
                    roots_page_id
                )));
            }
            IndexRootsPage::new().write_to(&mut roots_page.wl());
            buffer_pool.wl().unpin_page(roots_page_id, true);
        }

        let catalog = pod(CatalogManager::new(buffer_pool.clone(), init)?);
        Ok(StorageEngine {
            buffer_pool,
            catalog,
        })
    }

    pub fn buffer_pool(&self) -> Pod<BufferPool> {
        self.buffer_pool.clone()
    }

    pub fn catalog(&self) -> Pod<CatalogManager> {
        self.catalog.clone()
    }

    /// Push everything to disk: catalog directory, every resident page
    /// and the allocation metadata.
    pub fn flush(&self) -> DbResult {
        self.catalog.wl().flush_catalog_meta_page()?;
        self.buffer_pool.wl().flush_all_pages()
    }
}
