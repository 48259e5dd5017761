// Compaction tests for boxstore
// These tests verify segment merging through the public table API

use boxstore::compaction::CompactionKind;
use boxstore::{BoundingBox, MergeStrategyOptions, Options, TableManager, Tuple};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TABLE: &str = "2_compaction_test";

fn test_options(dir: &TempDir, big_table_threshold: usize) -> Options {
    Options::default()
        .data_directory(dir.path())
        .sync_segments(false)
        .run_flush_thread(false)
        .run_compact_thread(false)
        .checkpoint_interval_secs(0)
        .merge_strategy(MergeStrategyOptions {
            big_table_threshold,
            small_table_threshold: 1_000,
            max_tables_per_job: 100,
        })
}

fn write_segment(table: &TableManager, tuples: impl IntoIterator<Item = Tuple>) {
    for tuple in tuples {
        table.put(tuple).unwrap();
    }
    table.flush().unwrap();
}

fn value(key: impl Into<String>, data: &'static str, ts: i64) -> Tuple {
    Tuple::new(key, BoundingBox::EMPTY, data, ts)
}

#[test]
fn test_compaction_keeps_unique_keys() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir, 20)).unwrap();

    // 4 segments with 25 distinct keys each
    for segment in 0..4 {
        write_segment(&table, (0..25).map(|i| value(format!("s{}_k{:02}", segment, i), "v", 1)));
    }
    assert_eq!(table.segment_numbers(), vec![0, 1, 2, 3]);

    let summary = table.compact_now().unwrap().unwrap();
    assert_eq!(summary.kind, CompactionKind::Minor);
    assert_eq!(summary.tuples_read, 100);
    assert_eq!(summary.tuples_written, 100);

    assert_eq!(table.segment_numbers(), vec![4]);
    assert_eq!(table.stats().segment_tuples, 100);
    for segment in 0..4 {
        for i in 0..25 {
            assert!(table.get(&format!("s{}_k{:02}", segment, i)).unwrap().is_some());
        }
    }
}

#[test]
fn test_compaction_resolves_duplicate_keys() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir, 20)).unwrap();

    // The newest version of a key may sit in any segment
    write_segment(&table, vec![value("a", "a3", 3), value("b", "b1", 1), value("c", "c1", 1)]);
    write_segment(&table, vec![value("a", "a1", 1), value("b", "b2", 2)]);
    write_segment(&table, vec![value("a", "a2", 2), value("c", "c5", 5), value("d", "d1", 1)]);

    let summary = table.compact_now().unwrap().unwrap();
    assert_eq!(summary.tuples_read, 8);
    assert_eq!(summary.tuples_written, 4);

    let expected = [("a", "a3"), ("b", "b2"), ("c", "c5"), ("d", "d1")];
    for (key, data) in expected {
        let tuple = table.get(key).unwrap().unwrap();
        assert_eq!(tuple.data().unwrap().as_ref(), data.as_bytes(), "key {}", key);
    }
}

#[test]
fn test_minor_compaction_preserves_tombstones() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir, 20)).unwrap();

    write_segment(&table, vec![value("a", "v", 1), value("b", "v", 1)]);
    write_segment(&table, vec![Tuple::tombstone("a", 2)]);

    let summary = table.compact_now().unwrap().unwrap();
    assert_eq!(summary.kind, CompactionKind::Minor);
    assert_eq!(summary.tuples_written, 2);
    assert_eq!(table.stats().segment_tuples, 2);
    assert!(table.get("a").unwrap().is_none());
}

#[test]
fn test_major_compaction_elides_tombstones() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir, 2)).unwrap();

    write_segment(&table, vec![value("a", "v", 1), value("b", "v", 1), value("c", "v", 1)]);
    write_segment(&table, vec![Tuple::tombstone("a", 2), Tuple::tombstone("x", 2)]);
    // A tombstone older than the value it meets does not delete it
    write_segment(&table, vec![Tuple::tombstone("b", 0), value("c", "v2", 3)]);

    let summary = table.compact_now().unwrap().unwrap();
    assert_eq!(summary.kind, CompactionKind::Major);
    assert_eq!(summary.inputs, vec![0, 1, 2]);
    assert_eq!(summary.tuples_read, 7);
    assert_eq!(summary.tuples_written, 2);

    let stats = table.stats();
    assert_eq!(stats.segments, 1);
    assert_eq!(stats.segment_tuples, 2);
    assert!(table.get("a").unwrap().is_none());
    assert!(table.get("x").unwrap().is_none());
    assert_eq!(table.get("b").unwrap().unwrap().version_timestamp(), 1);
    assert_eq!(table.get("c").unwrap().unwrap().version_timestamp(), 3);
}

#[test]
fn test_major_compaction_output_rollover() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let options = test_options(&dir, 2).max_tuples_per_segment(10);
    let table = TableManager::open(TABLE, options).unwrap();

    for segment in 0..3 {
        write_segment(&table, (0..9).map(|i| value(format!("key{:02}", segment * 9 + i), "v", 1)));
    }

    let summary = table.compact_now().unwrap().unwrap();
    assert_eq!(summary.tuples_written, 27);
    assert_eq!(summary.outputs, vec![3, 4, 5]);
    assert_eq!(table.segment_numbers(), vec![3, 4, 5]);

    for i in 0..27 {
        assert!(table.get(&format!("key{:02}", i)).unwrap().is_some());
    }
    let everything = table.tuples_inside(&BoundingBox::FULL).unwrap();
    assert_eq!(everything.len(), 27);
}

#[test]
fn test_compacted_files_are_removed() {
    let dir = TempDir::new().unwrap();
    let table = TableManager::open(TABLE, test_options(&dir, 20)).unwrap();

    write_segment(&table, vec![value("a", "v", 1)]);
    write_segment(&table, vec![value("b", "v", 1)]);
    table.compact_now().unwrap().unwrap();

    let mut files: Vec<String> = std::fs::read_dir(table.directory())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["sstable_2.blm", "sstable_2.idx", "sstable_2.meta", "sstable_2.sst"]);
}

#[test]
fn test_background_compactor() {
    env_logger::try_init().ok();

    let dir = TempDir::new().unwrap();
    let options = test_options(&dir, 20).run_compact_thread(true).compaction_delay_ms(20);
    let table = TableManager::open(TABLE, options).unwrap();

    for segment in 0..6 {
        write_segment(&table, (0..10).map(|i| value(format!("key{}_{}", segment, i), "v", 1)));
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while table.stats().segments > 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let stats = table.stats();
    assert_eq!(stats.segments, 1);
    assert!(stats.compactions >= 1);
    assert_eq!(stats.segment_tuples, 60);
    assert!(table.get("key5_9").unwrap().is_some());
}
