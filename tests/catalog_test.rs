use std::collections::HashMap;

use tiny_db::{
    error::DbError,
    index::IndexKey,
    record::{CmpBool, Column, Field, Row, RowId, Schema, TypeId},
    types::HandyRwLock,
    StorageEngine,
};

mod common;

fn account_schema() -> Schema {
    Schema::new(
        vec![
            Column::new_fixed("id", TypeId::Int, 0, false, false),
            Column::new_char("name", 32, 1, true, false),
            Column::new_fixed("balance", TypeId::Float, 2, true, false),
        ],
        vec![0],
    )
}

#[test]
fn test_create_table_requires_primary_key() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("cat_no_pk")).unwrap();
    let catalog = engine.catalog();

    let schema = Schema::new(
        vec![Column::new_fixed("id", TypeId::Int, 0, false, false)],
        vec![],
    );
    let result = catalog.wl().create_table("orphan", schema);
    assert_eq!(result.unwrap_err(), DbError::PrimaryKeyNotDefined);
}

#[test]
fn test_table_ddl_surface() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("cat_ddl")).unwrap();
    let catalog = engine.catalog();

    catalog
        .wl()
        .create_table("accounts", account_schema())
        .unwrap();

    // duplicate names are refused
    let duplicate = catalog.wl().create_table("accounts", account_schema());
    assert_eq!(
        duplicate.unwrap_err(),
        DbError::TableAlreadyExist("accounts".to_string())
    );

    // lookups by name and by id agree
    let table = catalog.rl().get_table("accounts").unwrap();
    let table_id = table.rl().table_id();
    let by_id = catalog.rl().get_table_by_id(table_id).unwrap();
    assert_eq!(by_id.rl().table_name(), "accounts");

    assert!(matches!(
        catalog.rl().get_table("missing").unwrap_err(),
        DbError::TableNotExist(_)
    ));

    // the primary key index comes into existence with the table
    let indexes = catalog.rl().get_table_indexes("accounts").unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].rl().index_name(), "accounts__primary");

    catalog.wl().drop_table("accounts").unwrap();
    assert!(catalog.rl().get_table("accounts").is_err());
    assert!(matches!(
        catalog.wl().drop_table("accounts").unwrap_err(),
        DbError::TableNotExist(_)
    ));
}

#[test]
fn test_index_ddl_surface() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("cat_index_ddl")).unwrap();
    let catalog = engine.catalog();

    catalog
        .wl()
        .create_table("accounts", account_schema())
        .unwrap();

    catalog
        .wl()
        .create_index("accounts", "accounts_by_name", &["name".to_string()])
        .unwrap();

    assert_eq!(
        catalog
            .wl()
            .create_index("accounts", "accounts_by_name", &["name".to_string()])
            .unwrap_err(),
        DbError::IndexAlreadyExist("accounts_by_name".to_string())
    );
    assert_eq!(
        catalog
            .wl()
            .create_index("accounts", "bogus", &["nope".to_string()])
            .unwrap_err(),
        DbError::ColumnNameNotExist("nope".to_string())
    );
    assert!(matches!(
        catalog
            .wl()
            .create_index("missing", "idx", &["id".to_string()])
            .unwrap_err(),
        DbError::TableNotExist(_)
    ));

    let indexes = catalog.rl().get_table_indexes("accounts").unwrap();
    assert_eq!(indexes.len(), 2);

    catalog.wl().drop_index("accounts", "accounts_by_name").unwrap();
    assert!(matches!(
        catalog
            .wl()
            .drop_index("accounts", "accounts_by_name")
            .unwrap_err(),
        DbError::IndexNotFound(_)
    ));
    assert_eq!(catalog.rl().get_table_indexes("accounts").unwrap().len(), 1);
}

#[test]
fn test_backfill_rejects_duplicate_keys() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("cat_backfill")).unwrap();
    let catalog = engine.catalog();

    catalog
        .wl()
        .create_table("accounts", account_schema())
        .unwrap();
    let table = catalog.rl().get_table("accounts").unwrap();

    // two rows sharing a name
    for (id, name) in [(1, "alice"), (2, "alice")].iter() {
        let mut row = Row::new(vec![
            Field::Int(*id),
            Field::Char(name.to_string()),
            Field::Float(0.0),
        ]);
        table.wl().heap_mut().insert_tuple(&mut row).unwrap();
    }

    let result = catalog
        .wl()
        .create_index("accounts", "accounts_by_name", &["name".to_string()]);
    assert_eq!(result.unwrap_err(), DbError::UniqueKeyCollision);

    // the failed build leaves no directory entry behind
    assert_eq!(catalog.rl().get_table_indexes("accounts").unwrap().len(), 1);
}

#[test]
fn test_index_survives_reopen() {
    common::setup();
    let path = common::temp_db_path("cat_reopen");

    let row_count = 1000;
    let mut rids: HashMap<i32, RowId> = HashMap::new();
    {
        let engine = StorageEngine::new(&path).unwrap();
        let catalog = engine.catalog();
        catalog
            .wl()
            .create_table("accounts", account_schema())
            .unwrap();

        let table = catalog.rl().get_table("accounts").unwrap();
        let index = catalog.rl().get_index("accounts", "accounts__primary").unwrap();

        for i in 0..row_count {
            let mut row = Row::new(vec![
                Field::Int(i),
                Field::Char(format!("holder-{}", i)),
                Field::Float(i as f32 * 1.5),
            ]);
            table.wl().heap_mut().insert_tuple(&mut row).unwrap();
            let key = IndexKey::from_row(&row, index.rl().key_map());
            assert!(index.wl().tree_mut().insert(&key, row.row_id()).unwrap());
            rids.insert(i, row.row_id());
        }
        engine.flush().unwrap();
        // dropping the engine flushes the pool and the file meta
    }

    let engine = StorageEngine::open(&path).unwrap();
    let catalog = engine.catalog();
    let table = catalog.rl().get_table("accounts").unwrap();
    let index = catalog.rl().get_index("accounts", "accounts__primary").unwrap();

    for i in 0..row_count {
        let key = IndexKey::new(vec![Field::Int(i)]);
        let found = index.rl().tree().get_value(&key).unwrap();
        assert_eq!(found, Some(rids[&i]), "key {} lost across reopen", i);

        let row = table.rl().heap().get_tuple(&rids[&i]).unwrap().unwrap();
        assert_eq!(row.field(0).compare_equals(&Field::Int(i)), CmpBool::True);
    }
    index.rl().tree().check_integrity().unwrap();
}

#[test]
fn test_unique_column_gets_an_index() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("cat_unique")).unwrap();
    let catalog = engine.catalog();

    let schema = Schema::new(
        vec![
            Column::new_fixed("id", TypeId::Int, 0, false, false),
            Column::new_char("email", 48, 1, false, true),
        ],
        vec![0],
    );
    catalog.wl().create_table("users", schema).unwrap();

    let indexes = catalog.rl().get_table_indexes("users").unwrap();
    let mut names: Vec<String> = indexes
        .iter()
        .map(|i| i.rl().index_name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["users__primary", "users__unique_1"]);
}
