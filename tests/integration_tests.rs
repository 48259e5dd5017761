// End-to-End Integration Tests for boxstore
// These tests verify the read/write API across memtables and segments

use boxstore::{BoundingBox, Options, TableManager, Tuple};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;

const TABLE: &str = "2_test_table";

fn test_options(dir: &TempDir) -> Options {
    Options::default()
        .data_directory(dir.path())
        .sync_segments(false)
        .run_compact_thread(false)
        .checkpoint_interval_secs(0)
}

fn square(low: f64, high: f64) -> BoundingBox {
    BoundingBox::from_intervals(&[(low, high), (low, high)])
}

fn value_of(tuple: Option<Tuple>) -> Option<Vec<u8>> {
    tuple.and_then(|t| t.data().map(|d| d.to_vec()))
}

/// Test complete CRUD flow
#[test]
fn test_e2e_complete_crud() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    // Create
    table.put(Tuple::new("user:1", square(0.0, 1.0), "Alice", 1)).unwrap();
    table.put(Tuple::new("user:2", square(0.0, 1.0), "Bob", 1)).unwrap();
    table.put(Tuple::new("user:3", square(0.0, 1.0), "Charlie", 1)).unwrap();

    // Read
    assert_eq!(value_of(table.get("user:1").unwrap()), Some(b"Alice".to_vec()));
    assert_eq!(value_of(table.get("user:2").unwrap()), Some(b"Bob".to_vec()));
    assert_eq!(value_of(table.get("user:3").unwrap()), Some(b"Charlie".to_vec()));

    // Update
    table.put(Tuple::new("user:2", square(0.0, 1.0), "Bob_Updated", 2)).unwrap();
    assert_eq!(value_of(table.get("user:2").unwrap()), Some(b"Bob_Updated".to_vec()));

    // Delete
    table.delete("user:1", 3).unwrap();
    assert_eq!(table.get("user:1").unwrap(), None);

    // Verify remaining data
    assert_eq!(value_of(table.get("user:3").unwrap()), Some(b"Charlie".to_vec()));
    assert!(table.get("user:4").unwrap().is_none());
}

/// The highest timestamp wins, wherever each version is stored
#[test]
fn test_version_resolution_across_sources() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.put(Tuple::new("key", BoundingBox::EMPTY, "t10", 10)).unwrap();
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));

    table.put(Tuple::new("key", BoundingBox::EMPTY, "t20", 20)).unwrap();
    assert_eq!(value_of(table.get("key").unwrap()), Some(b"t20".to_vec()));

    // An older version written later does not win
    table.put(Tuple::new("key", BoundingBox::EMPTY, "t5", 5)).unwrap();
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    assert_eq!(value_of(table.get("key").unwrap()), Some(b"t20".to_vec()));

    let tuple = table.get("key").unwrap().unwrap();
    assert_eq!(tuple.version_timestamp(), 20);
}

/// A tombstone hides older versions in memory, in segments and after compaction
#[test]
fn test_tombstone_masking() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.put(Tuple::new("doomed", square(0.0, 1.0), "v1", 1)).unwrap();
    table.put(Tuple::new("kept", square(0.0, 1.0), "v1", 1)).unwrap();
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));

    table.delete("doomed", 2).unwrap();
    assert!(table.get("doomed").unwrap().is_none());

    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    assert!(table.get("doomed").unwrap().is_none());
    assert_eq!(table.tuples_inside(&square(-1.0, 2.0)).unwrap().len(), 1);

    let summary = table.compact_now().unwrap().unwrap();
    assert!(!summary.inputs.is_empty());
    assert!(table.get("doomed").unwrap().is_none());
    assert!(table.get("kept").unwrap().is_some());
}

/// Overlap queries return the newest visible version of overlapping tuples only
#[test]
fn test_spatial_overlap_across_sources() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    table.put(Tuple::new("unit", square(0.0, 1.0), "a", 1)).unwrap();
    table.put(Tuple::new("far_negative", square(-10.0, -9.0), "b", 1)).unwrap();
    table.put(Tuple::new("lower_half", square(0.0, 0.5), "c", 1)).unwrap();
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));

    table.put(Tuple::new("shifted", square(0.5, 1.5), "d", 2)).unwrap();
    table.put(Tuple::new("far_positive", square(1000.0, 1001.0), "e", 2)).unwrap();

    let inside = table.tuples_inside(&square(-1.0, 2.0)).unwrap();
    let keys: Vec<&str> = inside.iter().map(|t| t.key()).collect();
    assert_eq!(keys, vec!["lower_half", "shifted", "unit"]);

    // A newer version replaces the old one in the result
    table.put(Tuple::new("unit", square(0.0, 1.0), "a2", 3)).unwrap();
    table.delete("lower_half", 3).unwrap();

    let inside = table.tuples_inside(&square(-1.0, 2.0)).unwrap();
    let keys: Vec<&str> = inside.iter().map(|t| t.key()).collect();
    assert_eq!(keys, vec!["shifted", "unit"]);
    assert_eq!(inside[1].data().unwrap().as_ref(), b"a2");

    // Closed intervals: touching boxes overlap
    let touching = table.tuples_inside(&square(1.5, 3.0)).unwrap();
    assert_eq!(touching.len(), 1);
    assert_eq!(touching[0].key(), "shifted");

    assert!(table.tuples_inside(&square(100.0, 200.0)).unwrap().is_empty());
}

/// Time queries see the newest version of keys written after the timestamp
#[test]
fn test_tuples_after_time_across_sources() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    for i in 0..10 {
        table.put(Tuple::new(format!("key{}", i), BoundingBox::EMPTY, "v", i * 10)).unwrap();
    }
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));

    table.put(Tuple::new("key1", BoundingBox::EMPTY, "updated", 200)).unwrap();
    table.delete("key9", 200).unwrap();

    let after = table.tuples_after_time(65).unwrap();
    let keys: Vec<&str> = after.iter().map(|t| t.key()).collect();
    assert_eq!(keys, vec!["key1", "key7", "key8"]);

    assert!(table.tuples_after_time(200).unwrap().is_empty());
    assert_eq!(table.tuples_after_time(i64::MIN).unwrap().len(), 9);
}

/// Filling the memtable beyond its capacity produces several segments
#[test]
fn test_capacity_triggered_flush() {
    let dir = TempDir::new().unwrap();
    let options = test_options(&dir).memtable_entries_max(100);
    let table = TableManager::open(TABLE, options).unwrap();

    for i in 0..350 {
        table.put(Tuple::new(format!("key_{:05}", i), square(0.0, 1.0), "value", i)).unwrap();
        assert!(table.stats().active_memtable_entries <= 100);
    }

    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    let stats = table.stats();
    assert!(stats.segments > 1, "expected several segments, got {}", stats.segments);
    assert_eq!(stats.segment_tuples + stats.active_memtable_entries as u64, 350);

    for i in (0..350).step_by(7) {
        assert!(table.get(&format!("key_{:05}", i)).unwrap().is_some());
    }
}

/// The byte limit also triggers a flush
#[test]
fn test_size_triggered_flush() {
    let dir = TempDir::new().unwrap();
    let options = test_options(&dir).memtable_size_max(64 * 1024);
    let table = TableManager::open(TABLE, options).unwrap();

    let value = vec![7u8; 4096];
    for i in 0..64 {
        table.put(Tuple::new(format!("blob_{:03}", i), BoundingBox::EMPTY, value.clone(), i)).unwrap();
    }

    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    assert!(table.stats().segments >= 3);
    assert_eq!(value_of(table.get("blob_000").unwrap()), Some(value));
}

/// clear() drops everything and leaves the table usable
#[test]
fn test_clear_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir)).unwrap();

    for i in 0..20 {
        table.put(Tuple::new(format!("key{}", i), square(0.0, 1.0), "v", i)).unwrap();
    }
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    table.put(Tuple::new("in_memory", square(0.0, 1.0), "v", 100)).unwrap();

    table.clear().unwrap();
    assert!(table.is_ready());
    for i in 0..20 {
        assert!(table.get(&format!("key{}", i)).unwrap().is_none());
    }
    assert!(table.get("in_memory").unwrap().is_none());
    assert!(table.tuples_inside(&BoundingBox::FULL).unwrap().is_empty());
    assert_eq!(table.stats().segments, 0);

    let leftovers = std::fs::read_dir(table.directory()).unwrap().count();
    assert_eq!(leftovers, 0);

    table.clear().unwrap();
    table.put(Tuple::new("fresh", square(0.0, 1.0), "v", 1)).unwrap();
    table.flush().unwrap();
    assert!(table.wait_until_flushed(Duration::from_secs(10)));
    assert!(table.get("fresh").unwrap().is_some());
    assert!(table.get("key0").unwrap().is_none());
}

/// Random operations agree with a simple in-memory model
#[test]
fn test_random_operations_match_model() {
    let dir = TempDir::new().unwrap();
    let options = test_options(&dir).memtable_entries_max(64);
    let table = TableManager::open(TABLE, options).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let mut model: BTreeMap<String, Option<(f64, i64)>> = BTreeMap::new();

    for ts in 1..=2_000i64 {
        let key = format!("key_{:03}", rng.random_range(0..200));
        if rng.random_bool(0.2) {
            table.delete(&key, ts).unwrap();
            model.insert(key, None);
        } else {
            let low: f64 = rng.random_range(-50.0..50.0);
            table.put(Tuple::new(key.clone(), square(low, low + 1.0), "v", ts)).unwrap();
            model.insert(key, Some((low, ts)));
        }

        if ts % 500 == 0 {
            table.compact_now().unwrap();
        }
    }

    for (key, expected) in &model {
        let actual = table.get(key).unwrap().map(|t| t.version_timestamp());
        assert_eq!(actual, expected.map(|(_, ts)| ts), "key {}", key);
    }

    let query = square(0.0, 10.0);
    let expected: Vec<&str> = model
        .iter()
        .filter(|(_, v)| matches!(v, Some((low, _)) if *low + 1.0 >= 0.0 && *low <= 10.0))
        .map(|(k, _)| k.as_str())
        .collect();
    let inside = table.tuples_inside(&query).unwrap();
    let actual: Vec<&str> = inside.iter().map(|t| t.key()).collect();
    assert_eq!(actual, expected);
}
