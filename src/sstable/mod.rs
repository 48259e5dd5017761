//! Sorted table segments.
//!
//! A segment is an immutable, numbered set of files inside the table
//! directory:
//!
//! ```text
//! sstable_<n>.sst   [magic: 8B][record][record]...      records in key order
//! sstable_<n>.idx   [magic: 8B][offset: u32 BE]...       one offset per record
//! sstable_<n>.blm   key bloom filter (optional)
//! sstable_<n>.meta  JSON metadata, written last
//! ```
//!
//! ## Record Format
//!
//! ```text
//! [key_len: u16][box_len: u32][value_len: u32][version_timestamp: i64]
//! [key bytes][bounding box bytes][value bytes]
//! ```
//!
//! All integers are big-endian. A tombstone stores [`DELETED_MARKER`] as both
//! its box and value bytes.
//!
//! Keys are unique within a segment. A segment without readable metadata was
//! never finished and is ignored.

pub mod builder;
pub mod facade;
pub mod index;
pub mod metadata;
pub mod reader;
mod record;

pub use builder::SSTableBuilder;
pub use facade::SSTableFacade;
pub use index::{IndexBuilder, SSTableIndex};
pub use metadata::SSTableMetadata;
pub use reader::{SSTableIterator, SSTableReader};

use crate::entity::DELETED_MARKER;
use std::io;
use std::path::{Path, PathBuf};

/// Preamble of every data file.
pub const DATA_MAGIC: &[u8; 8] = b"bboxsst1";

/// Preamble of every index file.
pub const INDEX_MAGIC: &[u8; 8] = b"bboxidx1";

/// Current metadata format version.
pub const FORMAT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "sstable_";
const DATA_EXTENSION: &str = "sst";
const INDEX_EXTENSION: &str = "idx";
const METADATA_EXTENSION: &str = "meta";
const BLOOM_EXTENSION: &str = "blm";

const ALL_EXTENSIONS: [&str; 4] =
    [DATA_EXTENSION, INDEX_EXTENSION, METADATA_EXTENSION, BLOOM_EXTENSION];

/// File paths of segment `number` inside a table directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFiles {
    directory: PathBuf,
    number: u64,
}

impl SegmentFiles {
    pub fn new(directory: impl Into<PathBuf>, number: u64) -> Self {
        Self { directory: directory.into(), number }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}{}.{}", FILE_PREFIX, self.number, extension))
    }

    pub fn data_path(&self) -> PathBuf {
        self.path(DATA_EXTENSION)
    }

    pub fn index_path(&self) -> PathBuf {
        self.path(INDEX_EXTENSION)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path(METADATA_EXTENSION)
    }

    pub fn bloom_path(&self) -> PathBuf {
        self.path(BLOOM_EXTENSION)
    }

    /// Removes every file of the segment. Missing files are not an error.
    pub fn remove_all(&self) -> io::Result<()> {
        // Metadata first, so a crash in between leaves an unfinished segment
        // that recovery ignores.
        for extension in [METADATA_EXTENSION, DATA_EXTENSION, INDEX_EXTENSION, BLOOM_EXTENSION] {
            match std::fs::remove_file(self.path(extension)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Parses the segment number of a data file name such as `sstable_12.sst`.
pub fn parse_data_file_name(file_name: &str) -> Option<u64> {
    let (number, extension) = split_file_name(file_name)?;
    (extension == DATA_EXTENSION).then_some(number)
}

/// Parses the segment number of any segment file name, e.g. `sstable_3.meta`.
pub fn parse_segment_file_name(file_name: &str) -> Option<u64> {
    let (number, extension) = split_file_name(file_name)?;
    ALL_EXTENSIONS.contains(&extension).then_some(number)
}

fn split_file_name(file_name: &str) -> Option<(u64, &str)> {
    let rest = file_name.strip_prefix(FILE_PREFIX)?;
    let (number, extension) = rest.split_once('.')?;
    let number = number.parse::<u64>().ok()?;
    Some((number, extension))
}

fn is_deleted_marker(bytes: &[u8]) -> bool {
    bytes == DELETED_MARKER
}
