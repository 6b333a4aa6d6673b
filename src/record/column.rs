use crate::{
    config::COLUMN_MAGIC,
    error::{DbError, DbResult},
    io::{ByteWriter, Decodeable},
    record::field::TypeId,
};

/// Definition of a single table column.
///
/// `length` is the maximum byte length of the payload for CHAR columns;
/// for INT and FLOAT it is implicitly 4.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    type_id: TypeId,
    length: u32,
    table_ind: u32,
    nullable: bool,
    unique: bool,
}

impl Column {
    /// Construct an INT or FLOAT column. Panics on CHAR, which needs an
    /// explicit length.
    pub fn new_fixed(
        name: &str,
        type_id: TypeId,
        table_ind: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        assert!(
            type_id != TypeId::Char,
            "wrong constructor for CHAR column"
        );
        Self {
            name: name.to_string(),
            type_id,
            length: 4,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn new_char(
        name: &str,
        length: u32,
        table_ind: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::Char,
            length,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn table_ind(&self) -> u32 {
        self.table_ind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// # Format
    ///
    /// | magic | name_len | name | type | length | table_ind | nullable | unique |
    pub fn serialize_to(&self, writer: &mut ByteWriter) {
        writer.write(&COLUMN_MAGIC);
        writer.write(&self.name);
        writer.write(&self.type_id.to_u8());
        writer.write(&self.length);
        writer.write(&self.table_ind);
        writer.write(&self.nullable);
        writer.write(&self.unique);
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R) -> DbResult<Column> {
        let magic = u32::decode_from(reader);
        if magic != COLUMN_MAGIC {
            return Err(DbError::Corruption(format!(
                "column magic mismatch: {}",
                magic
            )));
        }
        let name = String::decode_from(reader);
        let type_tag = u8::decode_from(reader);
        let type_id = TypeId::from_u8(type_tag)
            .ok_or_else(|| DbError::Corruption(format!("unknown column type tag: {}", type_tag)))?;
        let length = u32::decode_from(reader);
        let table_ind = u32::decode_from(reader);
        let nullable = bool::decode_from(reader);
        let unique = bool::decode_from(reader);
        Ok(Column {
            name,
            type_id,
            length,
            table_ind,
            nullable,
            unique,
        })
    }

    pub fn serialized_size(&self) -> usize {
        // magic + name_len + name + type + length + table_ind + 2 flags
        4 + 4 + self.name.len() + 1 + 4 + 4 + 1 + 1
    }
}
