//! Configuration options for the boxstore storage engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration options for a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Root directory; every table lives in its own subdirectory.
    /// Default: "data"
    pub data_directory: PathBuf,

    /// Maximum number of tuples in a memtable before it is flushed.
    /// Default: 10000
    pub memtable_entries_max: usize,

    /// Maximum accumulated tuple bytes in a memtable before it is flushed.
    /// Default: 128MB
    pub memtable_size_max: usize,

    /// Capacity of the flush queue. Writers block once this many memtables
    /// are waiting for the flush thread.
    /// Default: 4
    pub max_unflushed_memtables: usize,

    /// Maximum age (seconds) of in-memory data before a checkpoint flush.
    /// Set to 0 to disable the checkpoint thread.
    /// Default: 60
    pub checkpoint_interval_secs: u64,

    /// Delay between two checkpoint checks (milliseconds).
    /// Default: 1000
    pub checkpoint_check_delay_ms: u64,

    /// Delay between two compaction cycles (milliseconds).
    /// Default: 30000
    pub compaction_delay_ms: u64,

    /// Run the background memtable flush thread.
    /// When disabled, memtables are flushed inline by the writer.
    /// Default: true
    pub run_flush_thread: bool,

    /// Run the background compaction thread.
    /// Default: true
    pub run_compact_thread: bool,

    /// Thresholds of the merge strategy.
    pub merge_strategy: MergeStrategyOptions,

    /// Maximum number of tuples per compaction output segment.
    /// Default: 1000000
    pub max_tuples_per_segment: usize,

    /// Write a key bloom filter for every segment.
    /// Default: true
    pub use_bloom_filter: bool,

    /// Bloom filter false positive rate.
    /// Default: 0.01 (1%)
    pub bloom_filter_fp_rate: f64,

    /// fsync segment files when they are finished.
    /// Default: true
    pub sync_segments: bool,

    /// Verify the data checksum of every segment when it is opened.
    /// Default: false
    pub verify_checksums: bool,

    /// How long shutdown waits for a background thread (milliseconds).
    /// Default: 10000
    pub thread_join_timeout_ms: u64,
}

/// Thresholds used by [`crate::compaction::MergeStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeStrategyOptions {
    /// More segments than this trigger a major compaction of all segments.
    /// Default: 20
    pub big_table_threshold: usize,

    /// Segments with fewer tuples than this take part in minor compactions.
    /// Default: 10000
    pub small_table_threshold: u64,

    /// Maximum number of segments merged by one minor compaction.
    /// Default: 100
    pub max_tables_per_job: usize,
}

impl Default for MergeStrategyOptions {
    fn default() -> Self {
        Self { big_table_threshold: 20, small_table_threshold: 10_000, max_tables_per_job: 100 }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data"),
            memtable_entries_max: 10_000,
            memtable_size_max: 128 * 1024 * 1024, // 128MB
            max_unflushed_memtables: 4,
            checkpoint_interval_secs: 60,
            checkpoint_check_delay_ms: 1_000,
            compaction_delay_ms: 30_000,
            run_flush_thread: true,
            run_compact_thread: true,
            merge_strategy: MergeStrategyOptions::default(),
            max_tuples_per_segment: 1_000_000,
            use_bloom_filter: true,
            bloom_filter_fp_rate: 0.01,
            sync_segments: true,
            verify_checksums: false,
            thread_join_timeout_ms: 10_000,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Sets the root data directory.
    pub fn data_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_directory = path.into();
        self
    }

    /// Sets the maximum number of memtable entries.
    pub fn memtable_entries_max(mut self, entries: usize) -> Self {
        self.memtable_entries_max = entries;
        self
    }

    /// Sets the maximum memtable size in bytes.
    pub fn memtable_size_max(mut self, size: usize) -> Self {
        self.memtable_size_max = size;
        self
    }

    /// Sets the flush queue capacity.
    pub fn max_unflushed_memtables(mut self, value: usize) -> Self {
        self.max_unflushed_memtables = value;
        self
    }

    /// Sets the checkpoint interval in seconds (0 disables checkpointing).
    pub fn checkpoint_interval_secs(mut self, secs: u64) -> Self {
        self.checkpoint_interval_secs = secs;
        self
    }

    /// Sets the delay between two checkpoint checks.
    pub fn checkpoint_check_delay_ms(mut self, ms: u64) -> Self {
        self.checkpoint_check_delay_ms = ms;
        self
    }

    /// Sets the delay between two compaction cycles.
    pub fn compaction_delay_ms(mut self, ms: u64) -> Self {
        self.compaction_delay_ms = ms;
        self
    }

    /// Enables or disables the background flush thread.
    pub fn run_flush_thread(mut self, value: bool) -> Self {
        self.run_flush_thread = value;
        self
    }

    /// Enables or disables the background compaction thread.
    pub fn run_compact_thread(mut self, value: bool) -> Self {
        self.run_compact_thread = value;
        self
    }

    /// Sets the merge strategy thresholds.
    pub fn merge_strategy(mut self, strategy: MergeStrategyOptions) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Sets the compaction output rollover size.
    pub fn max_tuples_per_segment(mut self, tuples: usize) -> Self {
        self.max_tuples_per_segment = tuples;
        self
    }

    /// Enables or disables segment bloom filters.
    pub fn use_bloom_filter(mut self, value: bool) -> Self {
        self.use_bloom_filter = value;
        self
    }

    /// Enables or disables fsync of finished segments.
    pub fn sync_segments(mut self, value: bool) -> Self {
        self.sync_segments = value;
        self
    }

    /// Enables or disables checksum verification on segment open.
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// The maximum uncheckpointed age, `None` when checkpointing is disabled.
    pub fn checkpoint_interval(&self) -> Option<Duration> {
        if self.checkpoint_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.checkpoint_interval_secs))
        }
    }

    /// Delay between two checkpoint checks.
    pub fn checkpoint_check_delay(&self) -> Duration {
        Duration::from_millis(self.checkpoint_check_delay_ms)
    }

    /// Delay between two compaction cycles.
    pub fn compaction_delay(&self) -> Duration {
        Duration::from_millis(self.compaction_delay_ms)
    }

    /// Shutdown join timeout for background threads.
    pub fn thread_join_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_join_timeout_ms)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.memtable_entries_max == 0 {
            return Err(Error::invalid_argument("memtable_entries_max must be > 0"));
        }
        if self.memtable_size_max == 0 {
            return Err(Error::invalid_argument("memtable_size_max must be > 0"));
        }
        if self.max_unflushed_memtables == 0 {
            return Err(Error::invalid_argument("max_unflushed_memtables must be > 0"));
        }
        if self.max_tuples_per_segment == 0 {
            return Err(Error::invalid_argument("max_tuples_per_segment must be > 0"));
        }
        if self.merge_strategy.max_tables_per_job < 2 {
            return Err(Error::invalid_argument("max_tables_per_job must be >= 2"));
        }
        if self.bloom_filter_fp_rate <= 0.0 || self.bloom_filter_fp_rate >= 1.0 {
            return Err(Error::invalid_argument("bloom_filter_fp_rate must be between 0 and 1"));
        }
        Ok(())
    }
}
