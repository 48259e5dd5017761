//! Versioned tuples and tombstones.

use super::BoundingBox;
use bytes::Bytes;
use std::cmp::{Ordering, Reverse};
use std::time::{SystemTime, UNIX_EPOCH};

/// Marker stored as both box and value bytes of a tombstone record.
pub const DELETED_MARKER: &[u8] = b"DEL";

/// Fixed per-tuple overhead used for memtable size accounting.
const TUPLE_OVERHEAD: usize = 32;

/// Payload of a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleBody {
    /// A live value with its spatial extent.
    Value {
        /// The stored bounding box.
        bounding_box: BoundingBox,
        /// The payload.
        data: Bytes,
    },
    /// The key was deleted as of the tuple's timestamp.
    Tombstone,
}

/// A single version of a key.
///
/// Tuples are immutable once built. Ordering is by key ascending, then by
/// `version_timestamp` descending so the newest version of a key sorts first.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    key: String,
    version_timestamp: i64,
    body: TupleBody,
}

impl Tuple {
    /// Creates a live tuple.
    pub fn new(
        key: impl Into<String>,
        bounding_box: BoundingBox,
        data: impl Into<Bytes>,
        version_timestamp: i64,
    ) -> Self {
        Self {
            key: key.into(),
            version_timestamp,
            body: TupleBody::Value { bounding_box, data: data.into() },
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(key: impl Into<String>, version_timestamp: i64) -> Self {
        Self { key: key.into(), version_timestamp, body: TupleBody::Tombstone }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version_timestamp(&self) -> i64 {
        self.version_timestamp
    }

    pub fn body(&self) -> &TupleBody {
        &self.body
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.body, TupleBody::Tombstone)
    }

    /// The bounding box; `None` for tombstones.
    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        match &self.body {
            TupleBody::Value { bounding_box, .. } => Some(bounding_box),
            TupleBody::Tombstone => None,
        }
    }

    /// The payload; `None` for tombstones.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.body {
            TupleBody::Value { data, .. } => Some(data),
            TupleBody::Tombstone => None,
        }
    }

    /// Does this live tuple overlap `query`? Tombstones never do.
    pub fn overlaps(&self, query: &BoundingBox) -> bool {
        self.bounding_box().is_some_and(|bbox| bbox.overlaps(query))
    }

    /// Approximate in-memory size, used for memtable accounting.
    pub fn size(&self) -> usize {
        let payload = match &self.body {
            TupleBody::Value { bounding_box, data } => bounding_box.encoded_len() + data.len(),
            TupleBody::Tombstone => 2 * DELETED_MARKER.len(),
        };
        self.key.len() + payload + TUPLE_OVERHEAD
    }

    /// Compares key ascending, then timestamp descending.
    pub fn compare_versions(&self, other: &Tuple) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.version_timestamp.cmp(&self.version_timestamp))
    }

    pub(crate) fn versioned_key(&self) -> VersionedKey {
        VersionedKey::new(self.key.clone(), self.version_timestamp)
    }
}

/// Sort key of a tuple version inside a memtable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionedKey {
    key: String,
    version: Reverse<i64>,
}

impl VersionedKey {
    pub fn new(key: String, version_timestamp: i64) -> Self {
        Self { key, version: Reverse(version_timestamp) }
    }

    /// The smallest versioned key for `key`, i.e. its newest possible version.
    pub fn newest(key: &str) -> Self {
        Self::new(key.to_string(), i64::MAX)
    }

    /// The largest versioned key for `key`, i.e. its oldest possible version.
    pub fn oldest(key: &str) -> Self {
        Self::new(key.to_string(), i64::MIN)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version_timestamp(&self) -> i64 {
        self.version.0
    }
}

/// Returns the tuple with the higher version timestamp.
///
/// On equal timestamps the first argument wins.
pub fn most_recent(first: Option<Tuple>, second: Option<Tuple>) -> Option<Tuple> {
    match (first, second) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => {
            if b.version_timestamp > a.version_timestamp {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}

/// Hides tombstones from callers.
pub fn visible(tuple: Option<Tuple>) -> Option<Tuple> {
    tuple.filter(|t| !t.is_tombstone())
}

/// Can a store whose newest tuple has `store_newest` hold something newer than `best`?
pub fn can_store_contain_newer(best: Option<&Tuple>, store_newest: i64) -> bool {
    match best {
        None => true,
        Some(tuple) => store_newest > tuple.version_timestamp,
    }
}

/// Current time in microseconds since the epoch.
pub fn microtime() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}
