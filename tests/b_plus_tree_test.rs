use rand::{seq::SliceRandom, thread_rng};

use tiny_db::{
    config::INVALID_PAGE_ID,
    index::{tree_page, BPlusTree, IndexKey},
    record::{Column, Field, RowId, Schema, TypeId},
    types::HandyRwLock,
    StorageEngine,
};

mod common;

fn int_key_schema() -> Schema {
    Schema::new(
        vec![Column::new_fixed("k", TypeId::Int, 0, false, false)],
        vec![],
    )
}

fn key(v: i32) -> IndexKey {
    IndexKey::new(vec![Field::Int(v)])
}

fn rid(v: i32) -> RowId {
    RowId::new(v, v as u32)
}

#[test]
fn test_sequential_insert_then_reverse_remove() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_stress")).unwrap();
    let pool = engine.buffer_pool();

    let n = 100;
    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 4, 4).unwrap();
    assert!(tree.is_empty());

    for i in 1..=n {
        assert!(tree.insert(&key(i), rid(i)).unwrap());
        tree.check_integrity().unwrap();
        assert!(pool.rl().check_all_unpinned());
    }

    // every key is found, duplicates are refused
    for i in 1..=n {
        assert_eq!(tree.get_value(&key(i)).unwrap(), Some(rid(i)));
        assert!(!tree.insert(&key(i), rid(i)).unwrap());
    }
    assert_eq!(tree.get_value(&key(0)).unwrap(), None);
    assert_eq!(tree.get_value(&key(n + 1)).unwrap(), None);

    for i in (1..=n).rev() {
        tree.remove(&key(i)).unwrap();
        tree.check_integrity().unwrap();
        assert!(pool.rl().check_all_unpinned());
        assert_eq!(tree.get_value(&key(i)).unwrap(), None);
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
}

#[test]
fn test_first_split_creates_two_level_tree() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_split")).unwrap();
    let pool = engine.buffer_pool();

    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 4, 4).unwrap();

    for i in 1..=4 {
        assert!(tree.insert(&key(i), rid(i)).unwrap());
    }
    let leaf_root = tree.root_page_id();
    {
        let page = pool.wl().fetch_page(leaf_root).unwrap();
        assert_eq!(
            tree_page::page_type(&page.rl()).unwrap(),
            tree_page::TreePageType::Leaf
        );
        pool.wl().unpin_page(leaf_root, false);
    }

    // the fifth key overflows the single leaf, a new root appears
    assert!(tree.insert(&key(5), rid(5)).unwrap());
    let new_root = tree.root_page_id();
    assert_ne!(new_root, leaf_root);
    {
        let page = pool.wl().fetch_page(new_root).unwrap();
        assert_eq!(
            tree_page::page_type(&page.rl()).unwrap(),
            tree_page::TreePageType::Internal
        );
        pool.wl().unpin_page(new_root, false);
    }
    tree.check_integrity().unwrap();

    // removing back down to a single key collapses the root again
    for i in 1..=4 {
        tree.remove(&key(i)).unwrap();
        tree.check_integrity().unwrap();
    }
    let collapsed_root = tree.root_page_id();
    {
        let page = pool.wl().fetch_page(collapsed_root).unwrap();
        assert_eq!(
            tree_page::page_type(&page.rl()).unwrap(),
            tree_page::TreePageType::Leaf
        );
        pool.wl().unpin_page(collapsed_root, false);
    }
    assert_eq!(tree.get_value(&key(5)).unwrap(), Some(rid(5)));
    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_iterator_visits_keys_in_order() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_iter")).unwrap();
    let pool = engine.buffer_pool();

    let n = 200;
    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 4, 4).unwrap();
    let mut values: Vec<i32> = (1..=n).collect();
    values.shuffle(&mut thread_rng());
    for &v in &values {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }
    tree.check_integrity().unwrap();

    // full scan: ascending, every key exactly once
    let collected: Vec<(IndexKey, RowId)> = tree.begin().unwrap().collect();
    assert_eq!(collected.len(), n as usize);
    for (i, (k, r)) in collected.iter().enumerate() {
        let expected = i as i32 + 1;
        assert_eq!(*k, key(expected));
        assert_eq!(*r, rid(expected));
    }

    // range scan from the middle
    let from_middle: Vec<(IndexKey, RowId)> = tree.begin_at(&key(150)).unwrap().collect();
    assert_eq!(from_middle.len(), 51);
    assert_eq!(from_middle[0].0, key(150));

    // a scan starting past the maximum is immediately exhausted
    let mut past_end = tree.begin_at(&key(n + 10)).unwrap();
    assert_eq!(past_end.next(), None);
    assert!(past_end.is_end());

    // all iterators are gone, nothing stays pinned
    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_random_insert_remove_with_default_sizes() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_random")).unwrap();
    let pool = engine.buffer_pool();

    // derived max sizes, several hundred keys per page
    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 0, 0).unwrap();

    let mut values: Vec<i32> = (0..2000).collect();
    values.shuffle(&mut thread_rng());
    for &v in &values {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }
    tree.check_integrity().unwrap();

    // remove every other key in random order
    let (removed, kept): (Vec<i32>, Vec<i32>) = values.iter().cloned().partition(|v| v % 2 == 0);
    for &v in &removed {
        tree.remove(&key(v)).unwrap();
    }
    tree.check_integrity().unwrap();

    for &v in &removed {
        assert_eq!(tree.get_value(&key(v)).unwrap(), None);
    }
    for &v in &kept {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_destroy_empties_the_tree() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_destroy")).unwrap();
    let pool = engine.buffer_pool();

    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 4, 4).unwrap();
    for i in 0..50 {
        assert!(tree.insert(&key(i), rid(i)).unwrap());
    }
    tree.destroy().unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert!(pool.rl().check_all_unpinned());
}

#[test]
fn test_remove_absent_key_is_noop() {
    common::setup();
    let engine = StorageEngine::new(common::temp_db_path("bpt_absent")).unwrap();
    let pool = engine.buffer_pool();

    let mut tree = BPlusTree::new(0, pool.clone(), int_key_schema(), 4, 4).unwrap();
    tree.remove(&key(1)).unwrap();
    assert!(tree.is_empty());

    assert!(tree.insert(&key(1), rid(1)).unwrap());
    tree.remove(&key(2)).unwrap();
    assert_eq!(tree.get_value(&key(1)).unwrap(), Some(rid(1)));
    tree.check_integrity().unwrap();
    assert!(pool.rl().check_all_unpinned());
}
