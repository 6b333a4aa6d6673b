use std::{collections::HashMap, sync::Arc};

use rand::Rng;

use tiny_db::{
    buffer::BufferPool,
    record::{CmpBool, Column, Field, Row, RowId, Schema, TypeId},
    storage::{DiskManager, TableHeap},
    types::{pod, HandyRwLock, Pod},
};

mod common;

fn sample_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        vec![
            Column::new_fixed("id", TypeId::Int, 0, false, false),
            Column::new_char("name", 64, 1, true, false),
            Column::new_fixed("account", TypeId::Float, 2, true, false),
        ],
        vec![0],
    ))
}

fn new_pool(name: &str) -> Pod<BufferPool> {
    let path = common::temp_db_path(name);
    let disk_manager = DiskManager::new(&path).unwrap();
    pod(BufferPool::new(256, disk_manager))
}

fn assert_rows_equal(expected: &Row, actual: &Row) {
    assert_eq!(expected.field_count(), actual.field_count());
    for (e, a) in expected.fields().iter().zip(actual.fields()) {
        if e.is_null() {
            assert!(a.is_null());
        } else {
            assert_eq!(e.compare_equals(a), CmpBool::True);
        }
    }
}

#[test]
fn test_insert_and_scan_many_rows() {
    common::setup();
    let pool = new_pool("heap_scan");
    let schema = sample_schema();
    let mut heap = TableHeap::new(pool.clone(), schema.clone()).unwrap();

    let row_count = 10_000;
    let mut rng = rand::thread_rng();
    let mut inserted: HashMap<RowId, Row> = HashMap::new();

    for i in 0..row_count {
        let name_len = rng.gen_range(0, 64);
        let name = if i % 7 == 0 {
            Field::Null(TypeId::Char)
        } else {
            Field::Char(common::random_string(&mut rng, name_len))
        };
        let mut row = Row::new(vec![
            Field::Int(i),
            name,
            Field::Float(rng.gen_range(-999.0, 999.0)),
        ]);
        heap.insert_tuple(&mut row).unwrap();
        assert!(row.row_id().is_valid());
        inserted.insert(row.row_id(), row);
    }
    assert_eq!(inserted.len(), row_count as usize);

    // the iterator yields each row id exactly once
    let mut seen = 0;
    let mut visited = std::collections::HashSet::new();
    for row in heap.iter() {
        assert!(visited.insert(row.row_id()), "row visited twice");
        seen += 1;
    }
    assert_eq!(seen, row_count);

    // every inserted row reads back field-equal
    for (rid, expected) in &inserted {
        let actual = heap.get_tuple(rid).unwrap().unwrap();
        assert_rows_equal(expected, &actual);
    }

    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_update_in_place() {
    common::setup();
    let pool = new_pool("heap_update");
    let schema = sample_schema();
    let mut heap = TableHeap::new(pool.clone(), schema.clone()).unwrap();

    let mut row = Row::new(vec![
        Field::Int(2000),
        Field::Char("123".to_string()),
        Field::Float(55.5),
    ]);
    heap.insert_tuple(&mut row).unwrap();
    let rid = row.row_id();

    // same shape, new values: fits in place
    let updated = Row::new(vec![
        Field::Int(1000),
        Field::Char("456".to_string()),
        Field::Float(-0.5),
    ]);
    assert!(heap.update_tuple(&updated, &rid).unwrap());
    let fetched = heap.get_tuple(&rid).unwrap().unwrap();
    assert_rows_equal(&updated, &fetched);

    // a larger payload does not fit in the slot and is refused,
    // leaving the old values intact
    let oversized = Row::new(vec![
        Field::Int(1),
        Field::Char("a much longer name than before".to_string()),
        Field::Float(0.0),
    ]);
    assert!(!heap.update_tuple(&oversized, &rid).unwrap());
    let fetched = heap.get_tuple(&rid).unwrap().unwrap();
    assert_rows_equal(&updated, &fetched);

    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_delete_lifecycle() {
    common::setup();
    let pool = new_pool("heap_delete");
    let schema = sample_schema();
    let mut heap = TableHeap::new(pool.clone(), schema.clone()).unwrap();

    let mut rows = Vec::new();
    for i in 0..100 {
        let mut row = Row::new(vec![
            Field::Int(i),
            Field::Char(format!("name-{}", i)),
            Field::Float(i as f32),
        ]);
        heap.insert_tuple(&mut row).unwrap();
        rows.push(row);
    }

    // soft delete hides a row from point reads and scans
    let victim = rows[10].row_id();
    assert!(heap.mark_delete(&victim).unwrap());
    assert!(heap.get_tuple(&victim).unwrap().is_none());
    assert_eq!(heap.iter().count(), 99);

    // rollback brings it back
    assert!(heap.rollback_delete(&victim).unwrap());
    assert!(heap.get_tuple(&victim).unwrap().is_some());
    assert_eq!(heap.iter().count(), 100);

    // apply_delete reclaims for good
    assert!(heap.mark_delete(&victim).unwrap());
    heap.apply_delete(&victim).unwrap();
    assert!(heap.get_tuple(&victim).unwrap().is_none());
    assert_eq!(heap.iter().count(), 99);

    // deleting an already-free slot is a quiet no-op
    heap.apply_delete(&victim).unwrap();
    assert_eq!(heap.iter().count(), 99);

    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_reopen_heap_by_first_page() {
    common::setup();
    let path = common::temp_db_path("heap_reopen");
    let schema = sample_schema();

    let first_page_id;
    let mut expected = Vec::new();
    {
        let disk_manager = DiskManager::new(&path).unwrap();
        let pool = pod(BufferPool::new(64, disk_manager));
        let mut heap = TableHeap::new(pool.clone(), schema.clone()).unwrap();
        for i in 0..500 {
            let mut row = Row::new(vec![
                Field::Int(i),
                Field::Char(format!("row-{}", i)),
                Field::Float(i as f32 / 2.0),
            ]);
            heap.insert_tuple(&mut row).unwrap();
            expected.push(row);
        }
        first_page_id = heap.first_page_id();
        // pool drop flushes everything
    }

    let disk_manager = DiskManager::new(&path).unwrap();
    let pool = pod(BufferPool::new(64, disk_manager));
    let heap = TableHeap::open(pool.clone(), schema, first_page_id).unwrap();
    assert_eq!(heap.tuples_count(), 500);
    for row in &expected {
        let fetched = heap.get_tuple(&row.row_id()).unwrap().unwrap();
        assert_rows_equal(row, &fetched);
    }
}
