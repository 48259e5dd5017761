//! Segment builder.
//!
//! Writes a segment from tuples supplied in ascending key order.

use super::index::IndexBuilder;
use super::metadata::SSTableMetadata;
use super::record::encode_record;
use super::{SegmentFiles, DATA_MAGIC, FORMAT_VERSION};
use crate::config::Options;
use crate::entity::Tuple;
use crate::error::{Error, Result};
use crate::filter::{BloomFilter, Filter};
use std::fs::File;
use std::io::{BufWriter, Write};

/// SSTableBuilder writes one segment.
///
/// The metadata file is written by [`finish`](Self::finish) after every other
/// file is complete, so a crash mid-write leaves a segment recovery skips.
///
/// Usage:
/// ```no_run
/// use boxstore::sstable::{SSTableBuilder, SegmentFiles};
/// use boxstore::{BoundingBox, Options, Tuple};
///
/// let files = SegmentFiles::new("/tmp/2_group_table", 1);
/// let mut builder = SSTableBuilder::create(files, 2, &Options::default()).unwrap();
/// builder.add(&Tuple::new("key1", BoundingBox::EMPTY, "value1", 1)).unwrap();
/// builder.add(&Tuple::tombstone("key2", 2)).unwrap();
/// let metadata = builder.finish().unwrap();
/// assert_eq!(metadata.tuples, 2);
/// ```
pub struct SSTableBuilder {
    files: SegmentFiles,
    writer: BufWriter<File>,
    index: IndexBuilder,
    bloom: Option<BloomFilter>,
    checksum: crc32fast::Hasher,
    record_buf: Vec<u8>,
    offset: u64,
    last_key: Option<String>,
    oldest: i64,
    newest: i64,
    sync: bool,
}

impl SSTableBuilder {
    /// Creates the data file of a new segment.
    ///
    /// `expected_tuples` sizes the bloom filter.
    pub fn create(files: SegmentFiles, expected_tuples: usize, options: &Options) -> Result<Self> {
        let file = File::create(files.data_path())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(DATA_MAGIC)?;

        let bloom = options
            .use_bloom_filter
            .then(|| BloomFilter::new(expected_tuples, options.bloom_filter_fp_rate));

        Ok(Self {
            files,
            writer,
            index: IndexBuilder::new(),
            bloom,
            checksum: crc32fast::Hasher::new(),
            record_buf: Vec::new(),
            offset: DATA_MAGIC.len() as u64,
            last_key: None,
            oldest: i64::MAX,
            newest: i64::MIN,
            sync: options.sync_segments,
        })
    }

    pub fn files(&self) -> &SegmentFiles {
        &self.files
    }

    /// Appends a tuple. Keys must be strictly ascending.
    pub fn add(&mut self, tuple: &Tuple) -> Result<()> {
        if let Some(last_key) = &self.last_key {
            if tuple.key() <= last_key.as_str() {
                return Err(Error::invalid_argument(format!(
                    "Keys must be added in ascending order: {} after {}",
                    tuple.key(),
                    last_key
                )));
            }
        }

        self.record_buf.clear();
        encode_record(tuple, &mut self.record_buf)?;

        self.index.add(self.offset)?;
        self.writer.write_all(&self.record_buf)?;
        self.checksum.update(&self.record_buf);
        self.offset += self.record_buf.len() as u64;

        if let Some(bloom) = &mut self.bloom {
            bloom.add(tuple.key().as_bytes());
        }

        self.oldest = self.oldest.min(tuple.version_timestamp());
        self.newest = self.newest.max(tuple.version_timestamp());
        self.last_key = Some(tuple.key().to_string());
        Ok(())
    }

    /// Number of tuples added so far.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes written to the data file so far.
    pub fn data_size(&self) -> u64 {
        self.offset
    }

    /// Completes the segment and returns its metadata.
    pub fn finish(mut self) -> Result<SSTableMetadata> {
        self.writer.flush()?;
        if self.sync {
            self.writer.get_ref().sync_all()?;
        }

        self.index.write_to(self.files.index_path(), self.sync)?;

        if let Some(bloom) = &self.bloom {
            let mut writer = BufWriter::new(File::create(self.files.bloom_path())?);
            writer.write_all(&bloom.encode())?;
            writer.flush()?;
            if self.sync {
                writer.get_ref().sync_all()?;
            }
        }

        let metadata = SSTableMetadata {
            format_version: FORMAT_VERSION,
            tuples: self.index.len() as u64,
            oldest_tuple: self.oldest,
            newest_tuple: self.newest,
            data_checksum: self.checksum.clone().finalize(),
        };
        metadata.write_to(self.files.metadata_path(), self.sync)?;

        log::debug!(
            "Finished segment {} with {} tuples ({} bytes)",
            self.files.number(),
            metadata.tuples,
            self.offset
        );

        Ok(metadata)
    }

    /// Discards the partially written segment.
    pub fn abandon(self) -> Result<()> {
        let files = self.files.clone();
        drop(self);
        files.remove_all()?;
        Ok(())
    }
}
