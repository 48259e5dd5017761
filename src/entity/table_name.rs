//! Table identity: `<dimension>_<group>_<table>`.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A parsed table name such as `2_mygroup_mytable`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    full_name: String,
    dimension: u16,
    group: String,
    table: String,
}

impl TableName {
    /// Parses a full table name.
    pub fn parse(full_name: &str) -> Result<Self> {
        let parts: Vec<&str> = full_name.split('_').collect();
        if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(Error::invalid_argument(format!("Invalid table name: {}", full_name)));
        }

        let dimension = parts[0]
            .parse::<u16>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                Error::invalid_argument(format!("Invalid dimension in table name: {}", full_name))
            })?;

        Ok(Self {
            full_name: full_name.to_string(),
            dimension,
            group: parts[1].to_string(),
            table: parts[2].to_string(),
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn dimension(&self) -> u16 {
        self.dimension
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The directory holding this table's segments below `data_directory`.
    pub fn directory(&self, data_directory: &Path) -> PathBuf {
        data_directory.join(&self.full_name)
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}
