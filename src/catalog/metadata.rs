use std::{collections::BTreeMap, sync::Arc};

use crate::{
    config::{CATALOG_METADATA_MAGIC, INDEX_METADATA_MAGIC, TABLE_METADATA_MAGIC},
    error::{DbError, DbResult},
    io::{ByteWriter, Decodeable},
    record::Schema,
    types::{IndexId, PageId, TableId},
};

/// The catalog directory: where on disk each table's and each index's
/// metadata page lives. Serialized onto the well-known catalog meta
/// page.
///
/// # Format
///
/// | magic | table count | (table_id, page_id) ... | index count | (index_id, page_id) ... |
pub struct CatalogMeta {
    table_meta_pages: BTreeMap<TableId, PageId>,
    index_meta_pages: BTreeMap<IndexId, PageId>,
}

impl CatalogMeta {
    pub fn new() -> Self {
        Self {
            table_meta_pages: BTreeMap::new(),
            index_meta_pages: BTreeMap::new(),
        }
    }

    pub fn table_meta_pages(&self) -> &BTreeMap<TableId, PageId> {
        &self.table_meta_pages
    }

    pub fn index_meta_pages(&self) -> &BTreeMap<IndexId, PageId> {
        &self.index_meta_pages
    }

    pub fn register_table(&mut self, table_id: TableId, meta_page_id: PageId) {
        self.table_meta_pages.insert(table_id, meta_page_id);
    }

    pub fn unregister_table(&mut self, table_id: TableId) -> Option<PageId> {
        self.table_meta_pages.remove(&table_id)
    }

    pub fn register_index(&mut self, index_id: IndexId, meta_page_id: PageId) {
        self.index_meta_pages.insert(index_id, meta_page_id);
    }

    pub fn unregister_index(&mut self, index_id: IndexId) -> Option<PageId> {
        self.index_meta_pages.remove(&index_id)
    }

    pub fn next_table_id(&self) -> TableId {
        self.table_meta_pages
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(0)
    }

    pub fn next_index_id(&self) -> IndexId {
        self.index_meta_pages
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(0)
    }

    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&CATALOG_METADATA_MAGIC);
        writer.write(&(self.table_meta_pages.len() as u32));
        for (table_id, page_id) in &self.table_meta_pages {
            writer.write(table_id);
            writer.write(page_id);
        }
        writer.write(&(self.index_meta_pages.len() as u32));
        for (index_id, page_id) in &self.index_meta_pages {
            writer.write(index_id);
            writer.write(page_id);
        }
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R) -> DbResult<CatalogMeta> {
        let magic = u32::decode_from(reader);
        if magic != CATALOG_METADATA_MAGIC {
            return Err(DbError::Corruption(format!(
                "catalog metadata magic mismatch: {}",
                magic
            )));
        }
        let mut meta = CatalogMeta::new();
        let table_count = u32::decode_from(reader);
        for _ in 0..table_count {
            let table_id = u32::decode_from(reader);
            let page_id = i32::decode_from(reader);
            meta.table_meta_pages.insert(table_id, page_id);
        }
        let index_count = u32::decode_from(reader);
        for _ in 0..index_count {
            let index_id = u32::decode_from(reader);
            let page_id = i32::decode_from(reader);
            meta.index_meta_pages.insert(index_id, page_id);
        }
        Ok(meta)
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + 8 * self.table_meta_pages.len() + 4 + 8 * self.index_meta_pages.len()
    }
}

/// Durable description of one table, serialized onto its own metadata
/// page.
///
/// # Format
///
/// | magic | table_id | name | first_page_id | schema |
pub struct TableMetadata {
    table_id: TableId,
    table_name: String,
    first_page_id: PageId,
    schema: Arc<Schema>,
}

impl TableMetadata {
    pub fn new(
        table_id: TableId,
        table_name: &str,
        first_page_id: PageId,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            table_id,
            table_name: table_name.to_string(),
            first_page_id,
            schema,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&TABLE_METADATA_MAGIC);
        writer.write(&self.table_id);
        writer.write(&self.table_name);
        writer.write(&self.first_page_id);
        self.schema.serialize_to(writer);
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R) -> DbResult<TableMetadata> {
        let magic = u32::decode_from(reader);
        if magic != TABLE_METADATA_MAGIC {
            return Err(DbError::Corruption(format!(
                "table metadata magic mismatch: {}",
                magic
            )));
        }
        let table_id = u32::decode_from(reader);
        let table_name = String::decode_from(reader);
        let first_page_id = i32::decode_from(reader);
        let schema = Schema::deserialize_from(reader)?;
        Ok(TableMetadata {
            table_id,
            table_name,
            first_page_id,
            schema: Arc::new(schema),
        })
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + (4 + self.table_name.len()) + 4 + self.schema.serialized_size()
    }
}

/// Durable description of one index: which table it belongs to and
/// which columns form the key.
///
/// # Format
///
/// | magic | index_id | name | table_id | key count | key positions ... |
pub struct IndexMetadata {
    index_id: IndexId,
    index_name: String,
    table_id: TableId,
    key_map: Vec<u32>,
}

impl IndexMetadata {
    pub fn new(index_id: IndexId, index_name: &str, table_id: TableId, key_map: Vec<u32>) -> Self {
        Self {
            index_id,
            index_name: index_name.to_string(),
            table_id,
            key_map,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn key_map(&self) -> &[u32] {
        &self.key_map
    }

    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&INDEX_METADATA_MAGIC);
        writer.write(&self.index_id);
        writer.write(&self.index_name);
        writer.write(&self.table_id);
        writer.write(&(self.key_map.len() as u32));
        for key in &self.key_map {
            writer.write(key);
        }
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R) -> DbResult<IndexMetadata> {
        let magic = u32::decode_from(reader);
        if magic != INDEX_METADATA_MAGIC {
            return Err(DbError::Corruption(format!(
                "index metadata magic mismatch: {}",
                magic
            )));
        }
        let index_id = u32::decode_from(reader);
        let index_name = String::decode_from(reader);
        let table_id = u32::decode_from(reader);
        let key_count = u32::decode_from(reader);
        let mut key_map = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            key_map.push(u32::decode_from(reader));
        }
        Ok(IndexMetadata {
            index_id,
            index_name,
            table_id,
            key_map,
        })
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + (4 + self.index_name.len()) + 4 + 4 + 4 * self.key_map.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::record::{Column, TypeId};

    #[test]
    fn test_catalog_meta_round_trip() {
        let mut meta = CatalogMeta::new();
        meta.register_table(0, 5);
        meta.register_table(1, 9);
        meta.register_index(0, 12);

        let mut writer = ByteWriter::new();
        meta.serialize_to(&mut writer);
        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), meta.serialized_size());

        let decoded = CatalogMeta::deserialize_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.table_meta_pages(), meta.table_meta_pages());
        assert_eq!(decoded.index_meta_pages(), meta.index_meta_pages());
        assert_eq!(decoded.next_table_id(), 2);
        assert_eq!(decoded.next_index_id(), 1);
    }

    #[test]
    fn test_catalog_meta_magic_mismatch() {
        let bytes = vec![0u8; 32];
        assert!(CatalogMeta::deserialize_from(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_table_metadata_round_trip() {
        let schema = Arc::new(Schema::new(
            vec![
                Column::new_fixed("id", TypeId::Int, 0, false, false),
                Column::new_char("name", 16, 1, true, false),
            ],
            vec![0],
        ));
        let meta = TableMetadata::new(3, "people", 7, schema.clone());

        let mut writer = ByteWriter::new();
        meta.serialize_to(&mut writer);
        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), meta.serialized_size());

        let decoded = TableMetadata::deserialize_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.table_id(), 3);
        assert_eq!(decoded.table_name(), "people");
        assert_eq!(decoded.first_page_id(), 7);
        assert_eq!(decoded.schema().as_ref(), schema.as_ref());
    }

    #[test]
    fn test_index_metadata_round_trip() {
        let meta = IndexMetadata::new(4, "people_by_name", 3, vec![1, 0]);

        let mut writer = ByteWriter::new();
        meta.serialize_to(&mut writer);
        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), meta.serialized_size());

        let decoded = IndexMetadata::deserialize_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.index_id(), 4);
        assert_eq!(decoded.index_name(), "people_by_name");
        assert_eq!(decoded.table_id(), 3);
        assert_eq!(decoded.key_map(), &[1, 0]);
    }
}
