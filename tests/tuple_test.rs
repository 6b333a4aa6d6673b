use std::io::Cursor;

use tiny_db::{
    io::ByteWriter,
    record::{CmpBool, Column, Field, Row, Schema, TypeId},
    storage::TablePage,
};

mod common;

fn sample_schema() -> Schema {
    Schema::new(
        vec![
            Column::new_fixed("id", TypeId::Int, 0, false, false),
            Column::new_char("name", 64, 1, true, false),
            Column::new_fixed("account", TypeId::Float, 2, true, false),
        ],
        vec![0],
    )
}

#[test]
fn test_column_serialize_deserialize() {
    common::setup();

    let columns = vec![
        Column::new_fixed("id", TypeId::Int, 0, false, false),
        Column::new_char("name", 64, 1, true, false),
        Column::new_fixed("account", TypeId::Float, 2, true, false),
    ];

    let mut writer = ByteWriter::new();
    for column in &columns {
        column.serialize_to(&mut writer);
    }

    let bytes = writer.to_bytes();
    let mut reader = Cursor::new(bytes);
    for column in &columns {
        let decoded = Column::deserialize_from(&mut reader).unwrap();
        assert_eq!(&decoded, column);
        assert_eq!(decoded.serialized_size(), column.serialized_size());
    }
}

#[test]
fn test_column_magic_mismatch() {
    common::setup();

    // not a serialized column at all
    let bytes = vec![0u8; 64];
    let mut reader = Cursor::new(bytes);
    assert!(Column::deserialize_from(&mut reader).is_err());
}

#[test]
fn test_schema_serialize_deserialize() {
    common::setup();

    let schema = sample_schema();
    let mut writer = ByteWriter::new();
    schema.serialize_to(&mut writer);
    let bytes = writer.to_bytes();
    assert_eq!(bytes.len(), schema.serialized_size());

    let decoded = Schema::deserialize_from(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(decoded, schema);
    assert_eq!(decoded.primary_keys(), &[0]);
    assert_eq!(decoded.column_index_of("account"), Some(2));
    assert_eq!(decoded.column_index_of("missing"), None);
}

#[test]
fn test_field_comparisons() {
    common::setup();

    let int_fields = [
        Field::Int(188),
        Field::Int(-65537),
        Field::Int(33389),
        Field::Int(0),
    ];
    let null_int = Field::Null(TypeId::Int);

    for field in &int_fields {
        assert_eq!(field.compare_equals(field), CmpBool::True);
        assert_eq!(field.compare_equals(&Field::Int(999)), CmpBool::False);
        assert_eq!(field.compare_equals(&null_int), CmpBool::Unknown);
        assert_eq!(
            field.compare_greater_than_equals(&Field::Int(-65537)),
            CmpBool::True
        );
        assert_eq!(
            field.compare_less_than_equals(&Field::Int(33389)),
            CmpBool::True
        );
    }

    let floats = [Field::Float(-2.33), Field::Float(19.99)];
    assert_eq!(floats[0].compare_less_than(&floats[1]), CmpBool::True);
    assert_eq!(
        floats[1].compare_equals(&Field::Null(TypeId::Float)),
        CmpBool::Unknown
    );

    // mismatched types never produce a definite answer
    assert_eq!(
        Field::Int(1).compare_not_equals(&Field::Float(1.0)),
        CmpBool::Unknown
    );
}

#[test]
fn test_row_serialize_deserialize() {
    common::setup();

    let schema = sample_schema();
    let row = Row::new(vec![
        Field::Int(188),
        Field::Char("tiny-db".to_string()),
        Field::Float(19.99),
    ]);

    let mut writer = ByteWriter::new();
    row.serialize_to(&mut writer);
    let bytes = writer.to_bytes();
    assert_eq!(bytes.len(), row.serialized_size());

    // | field_count (4) | null bitmap (1) | ... | with all three fields
    // present the bitmap byte reads 0b00000111
    assert_eq!(bytes[4], 0b0000_0111);

    let decoded = Row::deserialize_from(&mut Cursor::new(bytes), &schema).unwrap();
    assert_eq!(decoded.field_count(), 3);
    for (expected, actual) in row.fields().iter().zip(decoded.fields()) {
        assert_eq!(expected.compare_equals(actual), CmpBool::True);
    }
}

#[test]
fn test_row_with_nulls_round_trip() {
    common::setup();

    let schema = sample_schema();
    let row = Row::new(vec![
        Field::Int(7),
        Field::Null(TypeId::Char),
        Field::Null(TypeId::Float),
    ]);

    let mut writer = ByteWriter::new();
    row.serialize_to(&mut writer);
    let bytes = writer.to_bytes();

    // only the first field is present
    assert_eq!(bytes[4], 0b0000_0001);

    let decoded = Row::deserialize_from(&mut Cursor::new(bytes), &schema).unwrap();
    assert!(!decoded.field(0).is_null());
    assert!(decoded.field(1).is_null());
    assert!(decoded.field(2).is_null());
    assert_eq!(decoded.field(1).type_id(), TypeId::Char);
    assert_eq!(decoded.field(2).type_id(), TypeId::Float);
}

#[test]
fn test_table_page_insert_and_delete() {
    common::setup();

    let schema = sample_schema();
    let mut page = TablePage::new();
    page.init(0, -1);

    let mut row = Row::new(vec![
        Field::Int(188),
        Field::Char("tiny-db".to_string()),
        Field::Float(19.99),
    ]);
    assert!(page.insert_tuple(&mut row));
    let rid = row.row_id();
    assert_eq!(rid.page_id(), 0);

    assert_eq!(page.get_first_tuple_rid(), Some(rid));
    let fetched = page.get_tuple(rid.slot_num(), &schema).unwrap();
    for (expected, actual) in row.fields().iter().zip(fetched.fields()) {
        assert_eq!(expected.compare_equals(actual), CmpBool::True);
    }

    // soft delete hides the tuple, rollback brings it back
    assert!(page.mark_delete(rid.slot_num()));
    assert!(page.get_tuple(rid.slot_num(), &schema).is_none());
    assert!(page.rollback_delete(rid.slot_num()));
    assert!(page.get_tuple(rid.slot_num(), &schema).is_some());

    // physical delete frees the slot for reuse
    assert!(page.mark_delete(rid.slot_num()));
    page.apply_delete(rid.slot_num());
    assert!(page.get_tuple(rid.slot_num(), &schema).is_none());
    assert_eq!(page.get_first_tuple_rid(), None);

    let mut replacement = Row::new(vec![
        Field::Int(42),
        Field::Char("again".to_string()),
        Field::Float(1.5),
    ]);
    assert!(page.insert_tuple(&mut replacement));
    assert_eq!(replacement.row_id().slot_num(), rid.slot_num());
}

#[test]
fn test_table_page_compaction_keeps_neighbors() {
    common::setup();

    let schema = sample_schema();
    let mut page = TablePage::new();
    page.init(3, -1);

    let mut rows = Vec::new();
    for i in 0..10 {
        let mut row = Row::new(vec![
            Field::Int(i),
            Field::Char(format!("row-{}", i)),
            Field::Float(i as f32),
        ]);
        assert!(page.insert_tuple(&mut row));
        rows.push(row);
    }

    // reclaim a middle tuple, the others must survive the compaction
    page.apply_delete(rows[4].row_id().slot_num());
    for (i, row) in rows.iter().enumerate() {
        let fetched = page.get_tuple(row.row_id().slot_num(), &schema);
        if i == 4 {
            assert!(fetched.is_none());
        } else {
            let fetched = fetched.unwrap();
            assert_eq!(
                fetched.field(0).compare_equals(&Field::Int(i as i32)),
                CmpBool::True
            );
        }
    }
}
