//! Segment key index.
//!
//! The index stores one data file offset per record, in key order. Point
//! lookups binary search it, decoding the key at each probed offset.

use super::INDEX_MAGIC;
use crate::error::{Error, Result};
use bytes::BufMut;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const OFFSET_LEN: usize = 4;

/// Read-only view of an index file.
#[derive(Debug)]
pub struct SSTableIndex {
    mmap: Mmap,
    entries: usize,
}

impl SSTableIndex {
    /// Maps an index file and validates its preamble.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;

        // SAFETY: index files are never modified after they are written.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < INDEX_MAGIC.len() || &mmap[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            return Err(Error::corruption(format!(
                "Index file {} has an unknown preamble",
                path.as_ref().display()
            )));
        }

        let body = mmap.len() - INDEX_MAGIC.len();
        if body % OFFSET_LEN != 0 {
            return Err(Error::corruption(format!(
                "Index file {} has a truncated entry",
                path.as_ref().display()
            )));
        }

        Ok(Self { mmap, entries: body / OFFSET_LEN })
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Data file offset of the record at `position`.
    pub fn offset_at(&self, position: usize) -> Result<usize> {
        if position >= self.entries {
            return Err(Error::invalid_argument(format!(
                "Index position {} out of range ({} entries)",
                position, self.entries
            )));
        }

        let start = INDEX_MAGIC.len() + position * OFFSET_LEN;
        let mut raw = [0u8; OFFSET_LEN];
        raw.copy_from_slice(&self.mmap[start..start + OFFSET_LEN]);
        Ok(u32::from_be_bytes(raw) as usize)
    }
}

/// Collects record offsets while a segment is written.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    offsets: Vec<u32>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the offset of the next record.
    pub fn add(&mut self, offset: u64) -> Result<()> {
        let offset = u32::try_from(offset)
            .map_err(|_| Error::storage("Segment data file exceeds 4GB index range"))?;
        self.offsets.push(offset);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Writes the index file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P, sync: bool) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut encoded = Vec::with_capacity(INDEX_MAGIC.len() + self.offsets.len() * OFFSET_LEN);
        encoded.put_slice(INDEX_MAGIC);
        for offset in &self.offsets {
            encoded.put_u32(*offset);
        }

        writer.write_all(&encoded)?;
        writer.flush()?;
        if sync {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}
