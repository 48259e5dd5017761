//! Compaction module for merging segments.
//!
//! Every flush adds a segment, so without compaction a table would read from
//! an ever growing number of them. The compactor thread periodically merges
//! segments into fewer, larger ones.
//!
//! ## Compaction Strategy
//!
//! - **Minor**: merges a batch of small segments; tombstones are kept since
//!   older versions of their keys may live in segments outside the batch
//! - **Major**: merges every segment of the table; tombstones are dropped
//!
//! See [`MergeStrategy`] for the thresholds.
//!
//! ## Process
//!
//! 1. Pick the segments to merge (picker.rs)
//! 2. Acquire them, skipping the cycle if one is already retired
//! 3. Merge with a multi-way merge iterator into new segments (merge.rs)
//! 4. Swap inputs for outputs in one step
//! 5. Mark the inputs delete-on-close; their files go once the last reader
//!    releases them

pub mod merge;
pub mod picker;

pub use merge::{CompactionOutput, MergeIterator, SSTableCompactor};
pub use picker::{CompactionKind, MergeStrategy, MergeTask};

use crate::error::Result;
use crate::manager::worker::{StopReceiver, Worker};
use crate::manager::TableInner;
use crate::sstable::{SSTableBuilder, SSTableFacade};
use crate::storage::{AcquiredStores, TupleStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// What one compaction cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionSummary {
    pub kind: CompactionKind,
    /// Sequence numbers of the merged segments.
    pub inputs: Vec<u64>,
    /// Sequence numbers of the segments written; empty if nothing survived.
    pub outputs: Vec<u64>,
    pub tuples_read: u64,
    pub tuples_written: u64,
}

pub(crate) fn spawn_compactor_thread(table: Arc<TableInner>, stop: StopReceiver) -> Result<Worker> {
    let name = format!("compactor-{}", table.table_name);
    let delay = table.options.compaction_delay();

    Worker::spawn(name, move || {
        while !stop.wait(delay) {
            // A failed cycle leaves the old segments in place
            if let Err(e) = compact_once(&table) {
                log::error!("Compaction of table {} failed: {}", table.table_name, e);
            }
        }
        log::debug!("Compactor thread of table {} stopped", table.table_name);
    })
}

/// Runs one compaction cycle.
///
/// Returns `None` if there was nothing to merge or an input could not be
/// acquired.
pub(crate) fn compact_once(table: &TableInner) -> Result<Option<CompactionSummary>> {
    let _guard = table.compaction_lock.lock();

    let segments = table.instances.segments();
    let Some(task) = table.strategy.merge_task(&segments) else {
        return Ok(None);
    };

    let stores: Vec<Arc<dyn TupleStore>> =
        task.inputs.iter().map(|s| s.clone() as Arc<dyn TupleStore>).collect();
    let Some(acquired) = AcquiredStores::try_acquire(stores) else {
        log::debug!("Skipping compaction of table {}: an input is retired", table.table_name);
        return Ok(None);
    };

    let compactor =
        SSTableCompactor::new(&task.inputs, task.kind, table.options.max_tuples_per_segment);
    let output = compactor.execute(|expected_tuples| {
        SSTableBuilder::create(table.next_segment_files(), expected_tuples, &table.options)
    })?;

    let mut outputs = Vec::with_capacity(output.segments.len());
    for files in &output.segments {
        match SSTableFacade::open(files.clone(), &table.options) {
            Ok(segment) => outputs.push(Arc::new(segment)),
            Err(e) => {
                for files in &output.segments {
                    if let Err(cleanup) = files.remove_all() {
                        log::warn!("Unable to remove compaction output {}: {}", files.number(), cleanup);
                    }
                }
                return Err(e);
            }
        }
    }

    let summary = CompactionSummary {
        kind: task.kind,
        inputs: task.input_numbers(),
        outputs: outputs.iter().map(|s| s.number()).collect(),
        tuples_read: output.read_tuples,
        tuples_written: output.written_tuples,
    };

    table.instances.replace_segments(&task.inputs, outputs);
    for input in &task.inputs {
        input.delete_on_close();
    }
    drop(acquired);

    let stats = &table.stats;
    stats.compactions.fetch_add(1, Ordering::Relaxed);
    stats.compaction_tuples_read.fetch_add(summary.tuples_read, Ordering::Relaxed);
    stats.compaction_tuples_written.fetch_add(summary.tuples_written, Ordering::Relaxed);

    log::info!(
        "{:?} compaction of table {}: segments {:?} -> {:?}, {} tuples read, {} written",
        summary.kind,
        table.table_name,
        summary.inputs,
        summary.outputs,
        summary.tuples_read,
        summary.tuples_written
    );
    Ok(Some(summary))
}
