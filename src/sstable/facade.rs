//! A finished segment as a read source.
//!
//! [`SSTableFacade`] bundles the reader, the metadata and the optional bloom
//! filter of a segment with its reference-counted lifecycle. The segment's
//! files are removed once it is marked delete-on-close and the last reader
//! has released it.

use super::metadata::SSTableMetadata;
use super::reader::{SSTableIterator, SSTableReader};
use super::SegmentFiles;
use crate::config::Options;
use crate::entity::{BoundingBox, Tuple};
use crate::error::{Error, Result};
use crate::filter::{BloomFilter, Filter};
use crate::storage::{Lifecycle, LifecycleState, TupleStore};
use std::io;

/// A reference-counted, immutable segment.
pub struct SSTableFacade {
    files: SegmentFiles,
    reader: SSTableReader,
    metadata: SSTableMetadata,
    bloom: Option<BloomFilter>,
    lifecycle: Lifecycle,
}

impl SSTableFacade {
    /// Opens a finished segment.
    ///
    /// Fails if the metadata is missing (the segment was never finished), if a
    /// preamble is wrong, or if the index disagrees with the metadata.
    pub fn open(files: SegmentFiles, options: &Options) -> Result<Self> {
        let metadata = SSTableMetadata::read_from(files.metadata_path())?;
        let reader = SSTableReader::open(files.clone())?;

        if reader.number_of_tuples() as u64 != metadata.tuples {
            return Err(Error::corruption(format!(
                "Segment {} index holds {} entries, metadata says {}",
                files.number(),
                reader.number_of_tuples(),
                metadata.tuples
            )));
        }

        if options.verify_checksums {
            reader.verify_checksum(metadata.data_checksum)?;
        }

        let bloom = Self::load_bloom_filter(&files);

        Ok(Self { files, reader, metadata, bloom, lifecycle: Lifecycle::new() })
    }

    fn load_bloom_filter(files: &SegmentFiles) -> Option<BloomFilter> {
        let data = match std::fs::read(files.bloom_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Unable to read bloom filter of segment {}: {}", files.number(), e);
                return None;
            }
        };

        match BloomFilter::decode(&data) {
            Ok(filter) => Some(filter),
            Err(e) => {
                log::warn!("Ignoring bloom filter of segment {}: {}", files.number(), e);
                None
            }
        }
    }

    /// The segment's sequence number.
    pub fn number(&self) -> u64 {
        self.files.number()
    }

    pub fn files(&self) -> &SegmentFiles {
        &self.files
    }

    pub fn metadata(&self) -> &SSTableMetadata {
        &self.metadata
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    /// Iterates over all tuples in key order.
    pub fn iter(&self) -> SSTableIterator<'_> {
        self.reader.iter()
    }

    /// The `position`-th tuple in key order.
    pub fn tuple_at(&self, position: usize) -> Result<Tuple> {
        self.reader.tuple_at(position)
    }

    /// Have the segment's files been removed?
    pub fn is_removed(&self) -> bool {
        self.lifecycle.state() == LifecycleState::Deleted
    }

    /// Removes the metadata file only. Recovery then skips the segment as
    /// unfinished, while current holders keep reading the mapped data.
    pub(crate) fn hide_from_recovery(&self) -> io::Result<()> {
        match std::fs::remove_file(self.files.metadata_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn remove_files(&self) {
        log::info!("Deleting segment {}", self.number());
        if let Err(e) = self.files.remove_all() {
            log::error!("Unable to delete files of segment {}: {}", self.number(), e);
        }
    }
}

impl TupleStore for SSTableFacade {
    fn internal_name(&self) -> String {
        format!("sstable_{}", self.number())
    }

    fn get(&self, key: &str) -> Result<Option<Tuple>> {
        if let Some(bloom) = &self.bloom {
            if !bloom.may_contain(key.as_bytes()) {
                return Ok(None);
            }
        }
        self.reader.get(key)
    }

    fn tuples_inside(&self, bounding_box: &BoundingBox) -> Result<Vec<Tuple>> {
        let mut result = Vec::new();
        for tuple in self.reader.iter() {
            let tuple = tuple?;
            if tuple.overlaps(bounding_box) {
                result.push(tuple);
            }
        }
        Ok(result)
    }

    fn tuples_after_time(&self, timestamp: i64) -> Result<Vec<Tuple>> {
        if self.metadata.newest_tuple <= timestamp {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for tuple in self.reader.iter() {
            let tuple = tuple?;
            if tuple.version_timestamp() > timestamp {
                result.push(tuple);
            }
        }
        Ok(result)
    }

    fn number_of_tuples(&self) -> u64 {
        self.metadata.tuples
    }

    fn oldest_tuple_timestamp(&self) -> i64 {
        self.metadata.oldest_tuple
    }

    fn newest_tuple_timestamp(&self) -> i64 {
        self.metadata.newest_tuple
    }

    fn size(&self) -> u64 {
        self.reader.size()
    }

    fn acquire(&self) -> bool {
        self.lifecycle.acquire()
    }

    fn release(&self) {
        if self.lifecycle.release() {
            self.remove_files();
        }
    }

    fn delete_on_close(&self) {
        if self.lifecycle.delete_on_close() {
            self.remove_files();
        }
    }

    fn is_delete_pending(&self) -> bool {
        self.lifecycle.is_delete_pending()
    }
}
