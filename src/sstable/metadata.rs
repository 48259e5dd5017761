//! Segment metadata, stored as JSON next to the data file.

use super::FORMAT_VERSION;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Summary of a finished segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SSTableMetadata {
    pub format_version: u32,
    /// Number of records.
    pub tuples: u64,
    /// Lowest version timestamp, `i64::MAX` for an empty segment.
    pub oldest_tuple: i64,
    /// Highest version timestamp, `i64::MIN` for an empty segment.
    pub newest_tuple: i64,
    /// CRC32 of all record bytes following the data file preamble.
    pub data_checksum: u32,
}

impl SSTableMetadata {
    pub fn write_to<P: AsRef<Path>>(&self, path: P, sync: bool) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        if sync {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        let metadata: SSTableMetadata = serde_json::from_slice(&content)?;

        if metadata.format_version != FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "Unsupported segment format version {} in {}",
                metadata.format_version,
                path.as_ref().display()
            )));
        }

        Ok(metadata)
    }
}
