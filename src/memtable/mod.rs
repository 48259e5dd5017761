//! # Memtable - In-Memory Write Buffer
//!
//! The memtable holds the current write window of a table until it is
//! flushed into a segment.
//!
//! ## Design
//!
//! - Based on crossbeam-skiplist for concurrent reads during writes
//! - Entries are keyed by [`VersionedKey`] (key ascending, version descending),
//!   so all versions of a key are adjacent and the newest comes first
//! - Deletes are stored as tombstone tuples
//! - Entry count and accumulated byte size decide when the table is full
//!
//! ## Thread Safety
//!
//! Iteration is safe while other threads insert; readers see entries in key
//! order. The table manager serializes inserts so the entry limit holds.

use crate::entity::{BoundingBox, Tuple, VersionedKey};
use crate::error::Result;
use crate::storage::{Lifecycle, TupleStore};
use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// Bounded in-memory store of tuple versions.
///
/// # Example
///
/// ```rust
/// use boxstore::memtable::Memtable;
/// use boxstore::{BoundingBox, Tuple};
///
/// let memtable = Memtable::new(1, 100, 1024 * 1024);
/// memtable.put(Tuple::new("key", BoundingBox::EMPTY, "value", 1));
/// memtable.delete("key", 2);
///
/// assert!(memtable.get("key").unwrap().is_tombstone());
/// ```
pub struct Memtable {
    number: u64,
    data: SkipMap<VersionedKey, Tuple>,
    size: AtomicUsize,
    oldest_timestamp: AtomicI64,
    newest_timestamp: AtomicI64,
    max_entries: usize,
    max_bytes: usize,
    flushing: AtomicBool,
    lifecycle: Lifecycle,
}

impl Memtable {
    /// Creates an empty memtable.
    ///
    /// `number` only identifies the memtable in log output.
    pub fn new(number: u64, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            number,
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
            oldest_timestamp: AtomicI64::new(i64::MAX),
            newest_timestamp: AtomicI64::new(i64::MIN),
            max_entries,
            max_bytes,
            flushing: AtomicBool::new(false),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Stores a tuple version.
    pub fn put(&self, tuple: Tuple) {
        let timestamp = tuple.version_timestamp();
        self.size.fetch_add(tuple.size(), Ordering::Relaxed);
        self.oldest_timestamp.fetch_min(timestamp, Ordering::AcqRel);
        self.newest_timestamp.fetch_max(timestamp, Ordering::AcqRel);
        self.data.insert(tuple.versioned_key(), tuple);
    }

    /// Stores a tombstone for `key`.
    pub fn delete(&self, key: &str, timestamp: i64) {
        self.put(Tuple::tombstone(key, timestamp));
    }

    /// Returns the newest version of `key`, tombstones included.
    pub fn get(&self, key: &str) -> Option<Tuple> {
        self.data
            .range(VersionedKey::newest(key)..=VersionedKey::oldest(key))
            .next()
            .map(|entry| entry.value().clone())
    }

    /// All live versions whose bounding box overlaps `bounding_box`.
    pub fn tuples_inside(&self, bounding_box: &BoundingBox) -> Vec<Tuple> {
        self.data
            .iter()
            .filter(|entry| entry.value().overlaps(bounding_box))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All versions, tombstones included, with a timestamp after `timestamp`.
    pub fn tuples_after_time(&self, timestamp: i64) -> Vec<Tuple> {
        if self.newest_tuple_timestamp() <= timestamp {
            return Vec::new();
        }

        self.data
            .iter()
            .filter(|entry| entry.value().version_timestamp() > timestamp)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The newest version of every key, in key order.
    ///
    /// This is what a flush writes: older versions in the same memtable are
    /// shadowed and never reach disk.
    pub fn newest_versions(&self) -> impl Iterator<Item = Tuple> + '_ {
        let mut last_key: Option<String> = None;
        self.data.iter().filter_map(move |entry| {
            let key = entry.key().key();
            if last_key.as_deref() == Some(key) {
                return None;
            }
            last_key = Some(key.to_string());
            Some(entry.value().clone())
        })
    }

    /// Number of stored versions.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Approximate size of the stored tuples in bytes.
    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Has the entry or byte limit been reached?
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_entries || self.approximate_size() >= self.max_bytes
    }

    /// Claims the memtable for a flush. Returns `None` while another flush of
    /// it is running; the claim ends when the guard is dropped.
    pub(crate) fn begin_flush(&self) -> Option<FlushGuard<'_>> {
        self.flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlushGuard { memtable: self })
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.data.clear();
        self.size.store(0, Ordering::Relaxed);
        self.oldest_timestamp.store(i64::MAX, Ordering::Release);
        self.newest_timestamp.store(i64::MIN, Ordering::Release);
    }
}

/// Flush claim on a memtable, see [`Memtable::begin_flush`].
pub(crate) struct FlushGuard<'a> {
    memtable: &'a Memtable,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.memtable.flushing.store(false, Ordering::Release);
    }
}

impl TupleStore for Memtable {
    fn internal_name(&self) -> String {
        format!("memtable_{}", self.number)
    }

    fn get(&self, key: &str) -> Result<Option<Tuple>> {
        Ok(Memtable::get(self, key))
    }

    fn tuples_inside(&self, bounding_box: &BoundingBox) -> Result<Vec<Tuple>> {
        Ok(Memtable::tuples_inside(self, bounding_box))
    }

    fn tuples_after_time(&self, timestamp: i64) -> Result<Vec<Tuple>> {
        Ok(Memtable::tuples_after_time(self, timestamp))
    }

    fn number_of_tuples(&self) -> u64 {
        self.len() as u64
    }

    fn oldest_tuple_timestamp(&self) -> i64 {
        self.oldest_timestamp.load(Ordering::Acquire)
    }

    fn newest_tuple_timestamp(&self) -> i64 {
        self.newest_timestamp.load(Ordering::Acquire)
    }

    fn size(&self) -> u64 {
        self.approximate_size() as u64
    }

    fn acquire(&self) -> bool {
        self.lifecycle.acquire()
    }

    fn release(&self) {
        if self.lifecycle.release() {
            self.clear();
        }
    }

    fn delete_on_close(&self) {
        if self.lifecycle.delete_on_close() {
            self.clear();
        }
    }

    fn is_delete_pending(&self) -> bool {
        self.lifecycle.is_delete_pending()
    }
}
