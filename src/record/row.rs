use std::fmt;

use crate::{
    config::INVALID_PAGE_ID,
    error::{DbError, DbResult},
    io::{read_exact, ByteWriter, Decodeable, Encodeable},
    record::{field::Field, schema::Schema},
    types::PageId,
};

/// Location of a tuple: the page it lives on and its slot within that
/// page.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RowId {
    page_id: PageId,
    slot_num: u32,
}

pub const INVALID_ROW_ID: RowId = RowId {
    page_id: INVALID_PAGE_ID,
    slot_num: 0,
};

impl RowId {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn slot_num(&self) -> u32 {
        self.slot_num
    }

    pub fn is_valid(&self) -> bool {
        self.page_id != INVALID_PAGE_ID
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_num)
    }
}

impl Encodeable for RowId {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&self.page_id.to_le_bytes());
        buf.extend_from_slice(&self.slot_num.to_le_bytes());
        buf
    }
}

impl Decodeable for RowId {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let page_id = i32::decode_from(reader);
        let slot_num = u32::decode_from(reader);
        Self { page_id, slot_num }
    }
}

/// An ordered list of fields plus the row's current location.
#[derive(Clone, Debug)]
pub struct Row {
    row_id: RowId,
    fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            row_id: INVALID_ROW_ID,
            fields,
        }
    }

    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn set_row_id(&mut self, rid: RowId) {
        self.row_id = rid;
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// # Format
    ///
    /// | field_count | null bitmap | non-null payloads in order |
    ///
    /// The bitmap holds one bit per field, least significant bit first
    /// within each byte; a set bit means the field is present (not NULL).
    /// NULL fields contribute no payload bytes.
    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&(self.fields.len() as u32));

        let map_size = (self.fields.len() + 7) / 8;
        let mut null_map = vec![0u8; map_size];
        for (i, field) in self.fields.iter().enumerate() {
            if !field.is_null() {
                null_map[i / 8] |= 1 << (i % 8);
            }
        }
        writer.write_bytes(&null_map);

        for field in &self.fields {
            field.serialize_to(writer);
        }
    }

    /// Reconstruct a row. The schema supplies the type of every field,
    /// including the NULL ones the bitmap says are absent.
    pub fn deserialize_from<R: std::io::Read>(reader: &mut R, schema: &Schema) -> DbResult<Row> {
        let field_count = u32::decode_from(reader) as usize;
        if field_count != schema.column_count() {
            return Err(DbError::Corruption(format!(
                "row field count {} does not match schema column count {}",
                field_count,
                schema.column_count()
            )));
        }

        let map_size = (field_count + 7) / 8;
        let null_map = read_exact(reader, map_size);

        let mut fields = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let is_null = null_map[i / 8] & (1 << (i % 8)) == 0;
            fields.push(Field::deserialize_from(
                reader,
                schema.column(i).type_id(),
                is_null,
            ));
        }
        Ok(Row::new(fields))
    }

    pub fn serialized_size(&self) -> usize {
        let payload: usize = self.fields.iter().map(|f| f.serialized_size()).sum();
        4 + (self.fields.len() + 7) / 8 + payload
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "}}")
    }
}
