// Boundary Condition Tests for boxstore
// These tests verify edge cases of keys, values, boxes, names and lifecycle

use boxstore::{BoundingBox, Error, Options, TableManager, Tuple};
use std::time::Duration;
use tempfile::TempDir;

const TABLE: &str = "2_boundary_test";

fn test_options(dir: &TempDir) -> Options {
    Options::default()
        .data_directory(dir.path())
        .sync_segments(false)
        .run_compact_thread(false)
        .checkpoint_interval_secs(0)
}

fn flush_and_wait(table: &TableManager) {
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
}

/// Test empty key and empty value
#[test]
fn test_empty_key_and_value() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.put(Tuple::new("", BoundingBox::EMPTY, "empty key", 1)).unwrap();
    table.put(Tuple::new("empty value", BoundingBox::EMPTY, "", 1)).unwrap();
    flush_and_wait(&table);

    assert_eq!(table.get("").unwrap().unwrap().data().unwrap().as_ref(), b"empty key");
    assert!(table.get("empty value").unwrap().unwrap().data().unwrap().is_empty());
}

/// Test keys at the size limit
#[test]
fn test_maximum_key_length() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    let longest = "k".repeat(u16::MAX as usize);
    table.put(Tuple::new(longest.clone(), BoundingBox::EMPTY, "v", 1)).unwrap();
    flush_and_wait(&table);
    assert!(table.get(&longest).unwrap().is_some());

    let too_long = "k".repeat(u16::MAX as usize + 1);
    let result = table.put(Tuple::new(too_long, BoundingBox::EMPTY, "v", 1));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

/// Test unicode keys and binary values
#[test]
fn test_unicode_keys_and_binary_values() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    let binary: Vec<u8> = (0..=255).collect();
    let keys = ["Straße", "東京", "🦀", "plain"];
    for (i, key) in keys.iter().enumerate() {
        table.put(Tuple::new(*key, BoundingBox::EMPTY, binary.clone(), i as i64)).unwrap();
    }
    flush_and_wait(&table);

    for key in keys {
        let tuple = table.get(key).unwrap().unwrap();
        assert_eq!(tuple.key(), key);
        assert_eq!(tuple.data().unwrap().as_ref(), binary.as_slice());
    }
}

/// Test large values survive a flush
#[test]
fn test_large_value() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    let large = vec![0xABu8; 4 * 1024 * 1024];
    table.put(Tuple::new("large", BoundingBox::EMPTY, large.clone(), 1)).unwrap();
    flush_and_wait(&table);

    let tuple = table.get("large").unwrap().unwrap();
    assert_eq!(tuple.data().unwrap().len(), large.len());
    assert_eq!(tuple.data().unwrap().as_ref(), large.as_slice());
}

/// Sentinel boxes overlap every query, mismatched dimensions overlap nothing
#[test]
fn test_sentinel_boxes() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();
    let unit = BoundingBox::from_intervals(&[(0.0, 1.0), (0.0, 1.0)]);

    table.put(Tuple::new("empty", BoundingBox::EMPTY, "v", 1)).unwrap();
    table.put(Tuple::new("full", BoundingBox::FULL, "v", 1)).unwrap();
    table.put(Tuple::new("unit", unit, "v", 1)).unwrap();
    flush_and_wait(&table);

    let far = BoundingBox::from_intervals(&[(500.0, 501.0), (500.0, 501.0)]);
    let keys: Vec<String> =
        table.tuples_inside(&far).unwrap().iter().map(|t| t.key().to_string()).collect();
    assert_eq!(keys, vec!["empty", "full"]);

    assert_eq!(table.tuples_inside(&BoundingBox::FULL).unwrap().len(), 3);

    let line = BoundingBox::from_intervals(&[(0.0, 1.0)]);
    assert_eq!(table.tuples_inside(&line).unwrap().len(), 2);
}

/// Degenerate boxes (points) overlap boxes that contain them
#[test]
fn test_point_boxes() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    let point = BoundingBox::from_intervals(&[(3.0, 3.0), (4.0, 4.0)]);
    table.put(Tuple::new("point", point.clone(), "v", 1)).unwrap();

    let around = BoundingBox::from_intervals(&[(0.0, 3.0), (4.0, 10.0)]);
    assert_eq!(table.tuples_inside(&around).unwrap().len(), 1);
    assert_eq!(table.tuples_inside(&point).unwrap().len(), 1);

    let beside = BoundingBox::from_intervals(&[(3.5, 10.0), (0.0, 10.0)]);
    assert!(table.tuples_inside(&beside).unwrap().is_empty());
}

/// Invalid boxes and dimensions are rejected
#[test]
fn test_invalid_boxes_rejected() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    let negative_extent = BoundingBox::new(vec![0.0, -1.0, 0.0, 1.0]);
    let result = table.put(Tuple::new("a", negative_extent, "v", 1));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let three_dimensions = BoundingBox::from_intervals(&[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)]);
    let result = table.put(Tuple::new("a", three_dimensions, "v", 1));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    assert!(table.get("a").unwrap().is_none());
}

/// Deleting a missing key stores a tombstone and hides nothing else
#[test]
fn test_delete_missing_key() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.delete("missing", 5).unwrap();
    flush_and_wait(&table);

    assert!(table.get("missing").unwrap().is_none());
    assert!(table.tuples_after_time(0).unwrap().is_empty());
    assert_eq!(table.stats().segment_tuples, 1);

    // A write newer than the tombstone is visible again
    table.put(Tuple::new("missing", BoundingBox::EMPTY, "back", 6)).unwrap();
    assert!(table.get("missing").unwrap().is_some());
}

/// Extreme timestamps keep their order
#[test]
fn test_extreme_timestamps() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.put(Tuple::new("key", BoundingBox::EMPTY, "min", i64::MIN)).unwrap();
    flush_and_wait(&table);
    table.put(Tuple::new("key", BoundingBox::EMPTY, "max", i64::MAX)).unwrap();

    assert_eq!(table.get("key").unwrap().unwrap().data().unwrap().as_ref(), b"max");
    assert!(table.tuples_after_time(i64::MAX).unwrap().is_empty());
    assert_eq!(table.tuples_after_time(i64::MAX - 1).unwrap().len(), 1);
}

/// Table names must be `<dimension>_<group>_<table>`
#[test]
fn test_invalid_table_names() {
    let dir = TempDir::new().unwrap();

    for name in ["", "table", "2_group", "0_group_table", "x_group_table", "2__table", "2_a_b_c"] {
        let result = TableManager::new(name, test_options(&dir));
        assert!(matches!(result, Err(Error::InvalidArgument(_))), "accepted {:?}", name);
    }

    let table = TableManager::new("3_group_table", test_options(&dir)).unwrap();
    assert_eq!(table.table_name().dimension(), 3);
    assert_eq!(table.table_name().group(), "group");
    assert_eq!(table.table_name().table(), "table");
}

/// Invalid options are rejected before anything is touched
#[test]
fn test_invalid_options() {
    let dir = TempDir::new().unwrap();

    let result = TableManager::new(TABLE, test_options(&dir).memtable_entries_max(0));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    let result = TableManager::new(TABLE, test_options(&dir).max_unflushed_memtables(0));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    assert!(!dir.path().join(TABLE).exists());
}

/// Options can be loaded from JSON
#[test]
fn test_options_from_json() {
    let dir = TempDir::new().unwrap();
    let json = format!(
        r#"{{
            "data_directory": {:?},
            "memtable_entries_max": 5,
            "run_compact_thread": false,
            "checkpoint_interval_secs": 0,
            "merge_strategy": {{ "big_table_threshold": 3 }}
        }}"#,
        dir.path().to_str().unwrap()
    );
    let options = Options::from_json_str(&json).unwrap();
    assert_eq!(options.memtable_entries_max, 5);
    assert_eq!(options.merge_strategy.big_table_threshold, 3);
    assert_eq!(options.merge_strategy.max_tables_per_job, 100);

    let table = TableManager::open(TABLE, options).unwrap();
    for i in 0..12 {
        table.put(Tuple::new(format!("key{}", i), BoundingBox::EMPTY, "v", i)).unwrap();
    }
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    assert_eq!(table.stats().segments, 2);

    assert!(Options::from_json_str("{ not json").is_err());
}

/// Operations outside the ready state fail with NotReady
#[test]
fn test_lifecycle_errors() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::new(TABLE, test_options(&dir)).unwrap();

    assert!(matches!(table.get("a"), Err(Error::NotReady(_))));
    assert!(matches!(table.flush(), Err(Error::NotReady(_))));
    assert!(matches!(table.compact_now(), Err(Error::NotReady(_))));
    table.shutdown().unwrap();

    table.init().unwrap();
    table.put(Tuple::new("a", BoundingBox::EMPTY, "v", 1)).unwrap();
    table.shutdown().unwrap();
    assert!(matches!(table.delete("a", 2), Err(Error::NotReady(_))));
    assert!(matches!(table.tuples_inside(&BoundingBox::FULL), Err(Error::NotReady(_))));
    assert!(matches!(table.tuples_after_time(0), Err(Error::NotReady(_))));

    table.init().unwrap();
    table.destroy().unwrap();
    assert!(!dir.path().join(TABLE).exists());
    assert!(matches!(table.get("a"), Err(Error::NotReady(_))));
    assert!(matches!(table.init(), Err(Error::NotReady(_))));
}
