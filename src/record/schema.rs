use crate::{
    error::DbResult,
    io::{ByteWriter, Decodeable},
    record::column::Column,
};

/// An ordered list of columns plus the positions of the primary key
/// columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    primary_keys: Vec<u32>,
}

impl Schema {
    pub fn new(columns: Vec<Column>, primary_keys: Vec<u32>) -> Self {
        for pk in &primary_keys {
            assert!(
                (*pk as usize) < columns.len(),
                "primary key position {} out of range",
                pk
            );
        }
        Self {
            columns,
            primary_keys,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn primary_keys(&self) -> &[u32] {
        &self.primary_keys
    }

    pub fn column_index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// # Format
    ///
    /// | column_count | columns ... | pk_count | pk positions ... |
    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&(self.columns.len() as u32));
        for column in &self.columns {
            column.serialize_to(writer);
        }
        writer.write(&(self.primary_keys.len() as u32));
        for pk in &self.primary_keys {
            writer.write(pk);
        }
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R) -> DbResult<Schema> {
        let column_count = u32::decode_from(reader);
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            columns.push(Column::deserialize_from(reader)?);
        }
        let pk_count = u32::decode_from(reader);
        let mut primary_keys = Vec::with_capacity(pk_count as usize);
        for _ in 0..pk_count {
            primary_keys.push(u32::decode_from(reader));
        }
        Ok(Schema {
            columns,
            primary_keys,
        })
    }

    pub fn serialized_size(&self) -> usize {
        let columns: usize = self.columns.iter().map(|c| c.serialized_size()).sum();
        4 + columns + 4 + 4 * self.primary_keys.len()
    }
}
