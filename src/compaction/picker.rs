//! Merge strategy.
//!
//! Decides which segments one compaction cycle merges.

use crate::config::MergeStrategyOptions;
use crate::sstable::SSTableFacade;
use crate::storage::TupleStore;
use std::sync::Arc;

/// Kind of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionKind {
    /// Merges every segment of the table; tombstones are dropped.
    Major,
    /// Merges a subset of small segments; tombstones are kept.
    Minor,
}

/// Segments selected for one compaction.
#[derive(Clone)]
pub struct MergeTask {
    pub kind: CompactionKind,
    /// Inputs in ascending segment number order.
    pub inputs: Vec<Arc<SSTableFacade>>,
}

impl MergeTask {
    pub fn is_major(&self) -> bool {
        self.kind == CompactionKind::Major
    }

    pub fn input_numbers(&self) -> Vec<u64> {
        self.inputs.iter().map(|s| s.number()).collect()
    }
}

/// Threshold based merge strategy.
///
/// - More than `big_table_threshold` segments: merge all of them (major).
/// - Otherwise: merge up to `max_tables_per_job` segments holding fewer than
///   `small_table_threshold` tuples each (minor).
///
/// A task is only produced when at least two segments qualify.
#[derive(Debug, Clone, Copy)]
pub struct MergeStrategy {
    options: MergeStrategyOptions,
}

impl MergeStrategy {
    pub fn new(options: MergeStrategyOptions) -> Self {
        Self { options }
    }

    /// Picks the segments to merge. `segments` must be ordered by ascending number.
    ///
    /// Returns None if no compaction is needed.
    pub fn merge_task(&self, segments: &[Arc<SSTableFacade>]) -> Option<MergeTask> {
        if segments.len() > self.options.big_table_threshold {
            return self.major_task(segments);
        }

        self.minor_task(segments)
    }

    fn major_task(&self, segments: &[Arc<SSTableFacade>]) -> Option<MergeTask> {
        if segments.len() < 2 {
            return None;
        }

        log::info!("Picking major compaction of {} segments", segments.len());
        Some(MergeTask { kind: CompactionKind::Major, inputs: segments.to_vec() })
    }

    fn minor_task(&self, segments: &[Arc<SSTableFacade>]) -> Option<MergeTask> {
        let inputs: Vec<Arc<SSTableFacade>> = segments
            .iter()
            .filter(|s| s.number_of_tuples() < self.options.small_table_threshold)
            .take(self.options.max_tables_per_job)
            .cloned()
            .collect();

        if inputs.len() < 2 {
            return None;
        }

        log::debug!("Picking minor compaction of {} small segments", inputs.len());
        Some(MergeTask { kind: CompactionKind::Minor, inputs })
    }
}
