use std::cmp::Ordering;
use std::fmt;

use crate::{
    io::{read_exact, ByteWriter, Decodeable},
    record::{Field, Row, Schema, TypeId},
};

/// An index key: the row's key columns, serialized fixed-width so every
/// entry of a tree page has the same size.
///
/// Key fields are never NULL; ordering over NULL is three-valued and a
/// search tree needs a total order.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexKey {
    fields: Vec<Field>,
}

impl Eq for IndexKey {}

impl IndexKey {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Project the key columns out of a full row.
    pub fn from_row(row: &Row, key_map: &[u32]) -> Self {
        let fields = key_map
            .iter()
            .map(|&i| row.field(i as usize).clone())
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Serialized width of a key under the given key schema: 4 bytes for
    /// INT and FLOAT, length prefix plus maximum payload for CHAR.
    pub fn key_size(key_schema: &Schema) -> usize {
        key_schema
            .columns()
            .iter()
            .map(|c| match c.type_id() {
                TypeId::Int | TypeId::Float => 4,
                TypeId::Char => 4 + c.length() as usize,
            })
            .sum()
    }

    pub fn serialize_to(&self, writer: &mut ByteWriter, key_schema: &Schema) {
        assert_eq!(self.fields.len(), key_schema.column_count());
        for (i, field) in self.fields.iter().enumerate() {
            let column = key_schema.column(i);
            match (field, column.type_id()) {
                (Field::Int(v), TypeId::Int) => writer.write(v),
                (Field::Float(v), TypeId::Float) => writer.write(v),
                (Field::Char(s), TypeId::Char) => {
                    writer.write(&(s.len() as u32));
                    let mut payload = s.as_bytes().to_vec();
                    payload.resize(column.length() as usize, 0);
                    writer.write_bytes(&payload);
                }
                _ => panic!(
                    "index key field {} does not match its key schema column",
                    i
                ),
            }
        }
    }

    pub fn deserialize_from<R: std::io::Read>(reader: &mut R, key_schema: &Schema) -> Self {
        let mut fields = Vec::with_capacity(key_schema.column_count());
        for column in key_schema.columns() {
            let field = match column.type_id() {
                TypeId::Int => Field::Int(i32::decode_from(reader)),
                TypeId::Float => Field::Float(f32::decode_from(reader)),
                TypeId::Char => {
                    let len = u32::decode_from(reader) as usize;
                    let payload = read_exact(reader, column.length() as usize);
                    Field::Char(String::from_utf8(payload[..len].to_vec()).unwrap())
                }
            };
            fields.push(field);
        }
        Self { fields }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.fields.iter().zip(other.fields.iter()) {
            match a.key_cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}
