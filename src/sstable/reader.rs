//! Segment reader.
//!
//! Reads the data and index files of a segment through read-only memory
//! maps. All offsets taken from the index are bounds-checked before use.

use super::index::SSTableIndex;
use super::record::{decode_key, decode_record};
use super::{SegmentFiles, DATA_MAGIC};
use crate::entity::Tuple;
use crate::error::{Error, Result};
use memmap2::Mmap;
use std::cmp::Ordering;
use std::fs::File;

/// SSTableReader provides read access to one segment.
///
/// Usage:
/// ```no_run
/// use boxstore::sstable::{SSTableReader, SegmentFiles};
///
/// let reader = SSTableReader::open(SegmentFiles::new("/tmp/2_group_table", 1)).unwrap();
/// if let Some(tuple) = reader.get("key1").unwrap() {
///     println!("Found: {:?}", tuple);
/// }
/// ```
#[derive(Debug)]
pub struct SSTableReader {
    files: SegmentFiles,
    data: Mmap,
    index: SSTableIndex,
}

impl SSTableReader {
    /// Opens a segment and validates the preambles of its data and index files.
    pub fn open(files: SegmentFiles) -> Result<Self> {
        let file = File::open(files.data_path())?;

        // SAFETY: data files are never modified after they are written.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < DATA_MAGIC.len() || &data[..DATA_MAGIC.len()] != DATA_MAGIC {
            return Err(Error::corruption(format!(
                "Data file {} has an unknown preamble",
                files.data_path().display()
            )));
        }

        let index = SSTableIndex::open(files.index_path())?;

        Ok(Self { files, data, index })
    }

    pub fn files(&self) -> &SegmentFiles {
        &self.files
    }

    pub fn number_of_tuples(&self) -> usize {
        self.index.len()
    }

    /// Size of the data file in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn checked_offset(&self, position: usize) -> Result<usize> {
        let offset = self.index.offset_at(position)?;
        if offset < DATA_MAGIC.len() || offset >= self.data.len() {
            return Err(Error::corruption(format!(
                "Index entry {} of segment {} points outside the data file",
                position,
                self.files.number()
            )));
        }
        Ok(offset)
    }

    /// Decodes the record at index `position`.
    pub fn tuple_at(&self, position: usize) -> Result<Tuple> {
        let offset = self.checked_offset(position)?;
        decode_record(&self.data, offset).map(|(tuple, _)| tuple)
    }

    /// Decodes the key of the record at index `position`.
    pub fn key_at(&self, position: usize) -> Result<&str> {
        let offset = self.checked_offset(position)?;
        decode_key(&self.data, offset)
    }

    /// Binary searches the index for `key`.
    pub fn find_position(&self, key: &str) -> Result<Option<usize>> {
        let mut low = 0;
        let mut high = self.index.len();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.key_at(mid)?.cmp(key) {
                Ordering::Equal => return Ok(Some(mid)),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }

        Ok(None)
    }

    /// Looks up the tuple stored for `key`, tombstones included.
    pub fn get(&self, key: &str) -> Result<Option<Tuple>> {
        match self.find_position(key)? {
            Some(position) => self.tuple_at(position).map(Some),
            None => Ok(None),
        }
    }

    /// Iterates over all records in key order.
    ///
    /// Every call starts a fresh pass over the data file.
    pub fn iter(&self) -> SSTableIterator<'_> {
        SSTableIterator { reader: self, offset: DATA_MAGIC.len(), failed: false }
    }

    /// Checks the stored CRC32 of all record bytes.
    pub fn verify_checksum(&self, expected: u32) -> Result<()> {
        let actual = crc32fast::hash(&self.data[DATA_MAGIC.len()..]);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }
}

/// Sequential pass over a segment's data file.
///
/// Stops after yielding the first decoding error.
pub struct SSTableIterator<'a> {
    reader: &'a SSTableReader,
    offset: usize,
    failed: bool,
}

impl Iterator for SSTableIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.reader.data.len() {
            return None;
        }

        match decode_record(&self.reader.data, self.offset) {
            Ok((tuple, next)) => {
                self.offset = next;
                Some(Ok(tuple))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
