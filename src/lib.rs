//! # boxstore - Region-Local Storage for Bounding-Box Tuples
//!
//! boxstore stores versioned tuples, each a string key with an N-dimensional
//! bounding box and a byte payload, and answers point, time and spatial
//! overlap queries. It implements a Log-Structured Merge-Tree per table.
//!
//! ## Architecture
//!
//! The storage engine consists of several key components:
//!
//! - **Memtable**: In-memory write buffer of recent tuple versions
//! - **SSTable**: Immutable, memory-mapped segment files sorted by key
//! - **Table Manager**: Read/write API, flush queue and background threads
//! - **Compaction**: Background merging of segments, dropping tombstones
//! - **Bloom Filter**: Lets point lookups skip segments
//!
//! Every read source implements [`TupleStore`]; readers acquire sources
//! before use, and a retired segment is only deleted once its last reader
//! releases it.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use boxstore::{BoundingBox, Options, TableManager, Tuple};
//!
//! # fn main() -> Result<(), boxstore::Error> {
//! // Open or create a two-dimensional table
//! let options = Options::default().data_directory("./data");
//! let table = TableManager::open("2_maps_roads", options)?;
//!
//! // Write operations
//! let area = BoundingBox::from_intervals(&[(0.0, 1.0), (0.0, 1.0)]);
//! table.put(Tuple::new("road-1", area, "A1", 1))?;
//!
//! // Read operations
//! if let Some(tuple) = table.get("road-1")? {
//!     println!("Found: {:?}", tuple.data());
//! }
//! let query = BoundingBox::from_intervals(&[(-1.0, 2.0), (-1.0, 2.0)]);
//! for tuple in table.tuples_inside(&query)? {
//!     println!("{} overlaps", tuple.key());
//! }
//!
//! // Delete operations
//! table.delete("road-1", 2)?;
//! table.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

// Module declarations
pub mod compaction;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod manager;
pub mod memtable;
pub mod sstable;
pub mod storage;

// Re-exports
pub use config::{MergeStrategyOptions, Options};
pub use entity::{BoundingBox, TableName, Tuple, TupleBody};
pub use error::{Error, Result};
pub use manager::{TableManager, TableStats};
pub use storage::TupleStore;
