use std::{collections::HashMap, io::Cursor, sync::Arc};

use log::debug;

use crate::{
    buffer::buffer_pool::BufferPool,
    catalog::metadata::{CatalogMeta, IndexMetadata, TableMetadata},
    config::{CATALOG_META_PAGE_ID, PAGE_SIZE},
    error::{DbError, DbResult},
    index::{b_plus_tree::BPlusTree, index_key::IndexKey},
    io::ByteWriter,
    record::Schema,
    storage::table_heap::TableHeap,
    types::{pod, HandyRwLock, IndexId, PageId, Pod, TableId},
};

/// A loaded table: its durable metadata plus the heap holding its rows.
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    pub fn table_id(&self) -> TableId {
        self.meta.table_id()
    }

    pub fn table_name(&self) -> &str {
        self.meta.table_name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.meta.schema()
    }

    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut TableHeap {
        &mut self.heap
    }
}

impl std::fmt::Debug for TableInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TableInfo")
            .field("table_id", &self.table_id())
            .field("table_name", &self.table_name())
            .finish()
    }
}

/// A loaded index: its durable metadata plus the B+ tree over the key
/// columns.
pub struct IndexInfo {
    meta: IndexMetadata,
    tree: BPlusTree,
}

impl IndexInfo {
    pub fn index_id(&self) -> IndexId {
        self.meta.index_id()
    }

    pub fn index_name(&self) -> &str {
        self.meta.index_name()
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id()
    }

    pub fn key_map(&self) -> &[u32] {
        self.meta.key_map()
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut BPlusTree {
        &mut self.tree
    }
}

impl std::fmt::Debug for IndexInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("IndexInfo")
            .field("index_id", &self.index_id())
            .field("index_name", &self.index_name())
            .field("table_id", &self.table_id())
            .finish()
    }
}

/// The table/index directory layered on top of the buffer pool.
///
/// Every create/drop re-serializes the catalog directory and persists
/// it with a single flush of the catalog meta page, so a reopened
/// database always sees the directory the last DDL left behind.
pub struct CatalogManager {
    buffer_pool: Pod<BufferPool>,
    catalog_meta: CatalogMeta,
    tables: HashMap<TableId, Pod<TableInfo>>,
    table_names: HashMap<String, TableId>,
    indexes: HashMap<IndexId, Pod<IndexInfo>>,
    // table name -> index name -> index id
    index_names: HashMap<String, HashMap<String, IndexId>>,
    next_table_id: TableId,
    next_index_id: IndexId,
}

// init functions
impl CatalogManager {
    /// `init` is true for a freshly created database; otherwise the
    /// directory and every table/index it names are loaded back.
    pub fn new(buffer_pool: Pod<BufferPool>, init: bool) -> DbResult<CatalogManager> {
        let mut manager = CatalogManager {
            buffer_pool,
            catalog_meta: CatalogMeta::new(),
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_table_id: 0,
            next_index_id: 0,
        };

        if init {
            manager.flush_catalog_meta_page()?;
            return Ok(manager);
        }

        let catalog_meta = {
            let page = manager.buffer_pool.wl().fetch_page(CATALOG_META_PAGE_ID)?;
            let meta = CatalogMeta::deserialize_from(&mut Cursor::new(&page.rl().data()[..]));
            manager
                .buffer_pool
                .wl()
                .unpin_page(CATALOG_META_PAGE_ID, false);
            meta?
        };
        manager.next_table_id = catalog_meta.next_table_id();
        manager.next_index_id = catalog_meta.next_index_id();

        let table_pages: Vec<(TableId, PageId)> = catalog_meta
            .table_meta_pages()
            .iter()
            .map(|(t, p)| (*t, *p))
            .collect();
        let index_pages: Vec<(IndexId, PageId)> = catalog_meta
            .index_meta_pages()
            .iter()
            .map(|(i, p)| (*i, *p))
            .collect();
        manager.catalog_meta = catalog_meta;

        for (table_id, page_id) in table_pages {
            manager.load_table(table_id, page_id)?;
        }
        for (index_id, page_id) in index_pages {
            manager.load_index(index_id, page_id)?;
        }
        Ok(manager)
    }

    fn load_table(&mut self, table_id: TableId, meta_page_id: PageId) -> DbResult {
        let meta = {
            let page = self.buffer_pool.wl().fetch_page(meta_page_id)?;
            let meta = TableMetadata::deserialize_from(&mut Cursor::new(&page.rl().data()[..]));
            self.buffer_pool.wl().unpin_page(meta_page_id, false);
            meta?
        };
        if meta.table_id() != table_id {
            return Err(DbError::Corruption(format!(
                "table meta page {} claims id {}, directory says {}",
                meta_page_id,
                meta.table_id(),
                table_id
            )));
        }

        let heap = TableHeap::open(
            self.buffer_pool.clone(),
            meta.schema().clone(),
            meta.first_page_id(),
        )?;
        self.table_names
            .insert(meta.table_name().to_string(), table_id);
        self.tables.insert(table_id, pod(TableInfo { meta, heap }));
        Ok(())
    }

    fn load_index(&mut self, index_id: IndexId, meta_page_id: PageId) -> DbResult {
        let meta = {
            let page = self.buffer_pool.wl().fetch_page(meta_page_id)?;
            let meta = IndexMetadata::deserialize_from(&mut Cursor::new(&page.rl().data()[..]));
            self.buffer_pool.wl().unpin_page(meta_page_id, false);
            meta?
        };
        if meta.index_id() != index_id {
            return Err(DbError::Corruption(format!(
                "index meta page {} claims id {}, directory says {}",
                meta_page_id,
                meta.index_id(),
                index_id
            )));
        }

        let table = self
            .tables
            .get(&meta.table_id())
            .ok_or_else(|| {
                DbError::Corruption(format!(
                    "index {} references missing table {}",
                    meta.index_name(),
                    meta.table_id()
                ))
            })?
            .clone();
        let table_name = table.rl().table_name().to_string();
        let schema = table.rl().schema().clone();
        let key_schema = Self::key_schema(&schema, meta.key_map());

        let tree = BPlusTree::new(index_id, self.buffer_pool.clone(), key_schema, 0, 0)?;
        self.index_names
            .entry(table_name)
            .or_insert_with(HashMap::new)
            .insert(meta.index_name().to_string(), index_id);
        self.indexes.insert(index_id, pod(IndexInfo { meta, tree }));
        Ok(())
    }

    fn key_schema(schema: &Schema, key_map: &[u32]) -> Schema {
        let columns = key_map
            .iter()
            .map(|&i| schema.column(i as usize).clone())
            .collect();
        Schema::new(columns, vec![])
    }
}

// table DDL
impl CatalogManager {
    /// Create a table plus its primary-key index and one index per
    /// unique column. The schema must name an explicit primary key.
    pub fn create_table(&mut self, table_name: &str, schema: Schema) -> DbResult<Pod<TableInfo>> {
        if self.table_names.contains_key(table_name) {
            return Err(DbError::TableAlreadyExist(table_name.to_string()));
        }
        if schema.primary_keys().is_empty() {
            return Err(DbError::PrimaryKeyNotDefined);
        }

        let schema = Arc::new(schema);
        let heap = TableHeap::new(self.buffer_pool.clone(), schema.clone())?;
        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let meta = TableMetadata::new(table_id, table_name, heap.first_page_id(), schema.clone());
        let meta_page_id = self.write_meta_page(|writer| meta.serialize_to(writer))?;
        self.catalog_meta.register_table(table_id, meta_page_id);

        let info = pod(TableInfo { meta, heap });
        self.table_names.insert(table_name.to_string(), table_id);
        self.tables.insert(table_id, info.clone());
        debug!("table {} created, id {}", table_name, table_id);

        // the primary key is always indexed
        let pk_columns: Vec<String> = schema
            .primary_keys()
            .iter()
            .map(|&i| schema.column(i as usize).name().to_string())
            .collect();
        self.create_index(
            table_name,
            &format!("{}__primary", table_name),
            &pk_columns,
        )?;

        // every unique column gets its own single-column index
        for (i, column) in schema.columns().iter().enumerate() {
            if column.is_unique() {
                self.create_index(
                    table_name,
                    &format!("{}__unique_{}", table_name, i),
                    &[column.name().to_string()],
                )?;
            }
        }

        self.flush_catalog_meta_page()?;
        Ok(info)
    }

    pub fn get_table(&self, table_name: &str) -> DbResult<Pod<TableInfo>> {
        let table_id = self
            .table_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?;
        Ok(self.tables[table_id].clone())
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> DbResult<Pod<TableInfo>> {
        self.tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::TableNotExist(format!("id {}", table_id)))
    }

    /// Drop the table, its indexes, its heap pages and its metadata
    /// page.
    pub fn drop_table(&mut self, table_name: &str) -> DbResult {
        let table_id = self
            .table_names
            .remove(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?;

        if let Some(index_map) = self.index_names.remove(table_name) {
            for (_, index_id) in index_map {
                self.destroy_index(index_id)?;
            }
        }

        let table = self.tables.remove(&table_id).expect("directory out of sync");
        table.wl().heap_mut().free_heap()?;

        let meta_page_id = self
            .catalog_meta
            .unregister_table(table_id)
            .expect("directory out of sync");
        self.buffer_pool.wl().delete_page(meta_page_id)?;
        debug!("table {} dropped", table_name);
        self.flush_catalog_meta_page()
    }
}

// index DDL
impl CatalogManager {
    /// Create an index over the named columns and backfill it from the
    /// table's current rows. A duplicate key among those rows aborts the
    /// build with `UniqueKeyCollision`.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        key_column_names: &[String],
    ) -> DbResult<Pod<IndexInfo>> {
        let table = self.get_table(table_name)?;
        if let Some(index_map) = self.index_names.get(table_name) {
            if index_map.contains_key(index_name) {
                return Err(DbError::IndexAlreadyExist(index_name.to_string()));
            }
        }

        let schema = table.rl().schema().clone();
        let mut key_map = Vec::with_capacity(key_column_names.len());
        for name in key_column_names {
            let position = schema
                .column_index_of(name)
                .ok_or_else(|| DbError::ColumnNameNotExist(name.to_string()))?;
            key_map.push(position as u32);
        }

        let index_id = self.next_index_id;
        self.next_index_id += 1;
        let key_schema = Self::key_schema(&schema, &key_map);
        let mut tree = BPlusTree::new(index_id, self.buffer_pool.clone(), key_schema, 0, 0)?;

        // index the rows that are already there
        {
            let table_ref = table.rl();
            for row in table_ref.heap().iter() {
                let key = IndexKey::from_row(&row, &key_map);
                if !tree.insert(&key, row.row_id())? {
                    tree.destroy()?;
                    return Err(DbError::UniqueKeyCollision);
                }
            }
        }

        let meta = IndexMetadata::new(index_id, index_name, table.rl().table_id(), key_map);
        let meta_page_id = self.write_meta_page(|writer| meta.serialize_to(writer))?;
        self.catalog_meta.register_index(index_id, meta_page_id);

        let info = pod(IndexInfo { meta, tree });
        self.indexes.insert(index_id, info.clone());
        self.index_names
            .entry(table_name.to_string())
            .or_insert_with(HashMap::new)
            .insert(index_name.to_string(), index_id);
        debug!("index {} on {} created, id {}", index_name, table_name, index_id);

        self.flush_catalog_meta_page()?;
        Ok(info)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> DbResult<Pod<IndexInfo>> {
        let index_id = self
            .index_names
            .get(table_name)
            .and_then(|m| m.get(index_name))
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;
        Ok(self.indexes[index_id].clone())
    }

    pub fn get_table_indexes(&self, table_name: &str) -> DbResult<Vec<Pod<IndexInfo>>> {
        // a table without indexes is still a valid lookup target
        self.get_table(table_name)?;
        let mut result = Vec::new();
        if let Some(index_map) = self.index_names.get(table_name) {
            for index_id in index_map.values() {
                result.push(self.indexes[index_id].clone());
            }
        }
        Ok(result)
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult {
        let index_id = self
            .index_names
            .get_mut(table_name)
            .and_then(|m| m.remove(index_name))
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;
        self.destroy_index(index_id)?;
        debug!("index {} on {} dropped", index_name, table_name);
        self.flush_catalog_meta_page()
    }

    fn destroy_index(&mut self, index_id: IndexId) -> DbResult {
        let info = self.indexes.remove(&index_id).expect("directory out of sync");
        info.wl().tree_mut().destroy()?;
        let meta_page_id = self
            .catalog_meta
            .unregister_index(index_id)
            .expect("directory out of sync");
        self.buffer_pool.wl().delete_page(meta_page_id)?;
        Ok(())
    }
}

// persistence
impl CatalogManager {
    /// Serialize the directory onto the catalog meta page and flush it
    /// in one write.
    pub fn flush_catalog_meta_page(&mut self) -> DbResult {
        let mut writer = ByteWriter::new();
        self.catalog_meta.serialize_to(&mut writer);
        let bytes = writer.to_padded_bytes(PAGE_SIZE);

        let page = self.buffer_pool.wl().fetch_page(CATALOG_META_PAGE_ID)?;
        page.wl().data_mut().copy_from_slice(&bytes);
        self.buffer_pool.wl().unpin_page(CATALOG_META_PAGE_ID, true);
        self.buffer_pool.wl().flush_page(CATALOG_META_PAGE_ID)?;
        Ok(())
    }

    /// Serialize one metadata record onto a freshly allocated page.
    fn write_meta_page<F: FnOnce(&mut ByteWriter)>(&mut self, serialize: F) -> DbResult<PageId> {
        let mut writer = ByteWriter::new();
        serialize(&mut writer);
        let bytes = writer.to_padded_bytes(PAGE_SIZE);

        let (page_id, page) = self.buffer_pool.wl().new_page()?;
        page.wl().data_mut().copy_from_slice(&bytes);
        self.buffer_pool.wl().unpin_page(page_id, true);
        Ok(page_id)
    }
}
