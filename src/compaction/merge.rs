//! Multi-way merge of segments.
//!
//! [`MergeIterator`] merges the iterators of several segments into one
//! stream ordered by key. [`SSTableCompactor`] resolves the versions of each
//! key and writes the survivors into new segments.

use super::picker::CompactionKind;
use crate::entity::Tuple;
use crate::error::Result;
use crate::sstable::{SSTableBuilder, SSTableFacade, SSTableIterator, SegmentFiles};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Entry in the merge heap
struct MergeEntry {
    tuple: Tuple,
    input_index: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest key first, then first input)
        other
            .tuple
            .key()
            .cmp(self.tuple.key())
            .then_with(|| other.input_index.cmp(&self.input_index))
    }
}

/// Merges segment iterators into one key-ordered stream.
///
/// Equal keys from different inputs are yielded in input order.
pub struct MergeIterator<'a> {
    heap: BinaryHeap<MergeEntry>,
    iterators: Vec<SSTableIterator<'a>>,
    read_tuples: u64,
}

impl<'a> MergeIterator<'a> {
    pub fn new(inputs: &'a [Arc<SSTableFacade>]) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(inputs.len()),
            iterators: inputs.iter().map(|input| input.iter()).collect(),
            read_tuples: 0,
        };

        for index in 0..merge.iterators.len() {
            merge.advance_iterator(index)?;
        }

        Ok(merge)
    }

    /// Pulls the next tuple of input `index` into the heap.
    fn advance_iterator(&mut self, index: usize) -> Result<()> {
        if let Some(next) = self.iterators[index].next() {
            self.heap.push(MergeEntry { tuple: next?, input_index: index });
            self.read_tuples += 1;
        }
        Ok(())
    }

    /// Number of tuples read from the inputs so far.
    pub fn read_tuples(&self) -> u64 {
        self.read_tuples
    }

    /// Key of the next tuple, without consuming it.
    pub fn peek_key(&self) -> Option<&str> {
        self.heap.peek().map(|entry| entry.tuple.key())
    }

    /// Next tuple and the index of the input it came from.
    pub fn next_entry(&mut self) -> Result<Option<(Tuple, usize)>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };

        self.advance_iterator(entry.input_index)?;
        Ok(Some((entry.tuple, entry.input_index)))
    }

    /// Consumes every version of the next key and returns the one with the
    /// highest version timestamp. On equal timestamps the earliest input wins.
    pub fn next_resolved(&mut self) -> Result<Option<Tuple>> {
        let Some((mut best, _)) = self.next_entry()? else {
            return Ok(None);
        };

        while self.peek_key() == Some(best.key()) {
            if let Some((candidate, _)) = self.next_entry()? {
                if candidate.version_timestamp() > best.version_timestamp() {
                    best = candidate;
                }
            }
        }

        Ok(Some(best))
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|entry| entry.map(|(tuple, _)| tuple)).transpose()
    }
}

/// Result of one compaction run.
#[derive(Debug, Default)]
pub struct CompactionOutput {
    /// Finished output segments in creation order.
    pub segments: Vec<SegmentFiles>,
    pub read_tuples: u64,
    pub written_tuples: u64,
}

/// Merges a set of segments into new segments.
///
/// Every key is written once, with its newest version. A major compaction
/// also drops keys whose newest version is a tombstone. Output rolls over to
/// a new segment every `max_tuples_per_segment` tuples.
pub struct SSTableCompactor<'a> {
    inputs: &'a [Arc<SSTableFacade>],
    kind: CompactionKind,
    max_tuples_per_segment: usize,
}

impl<'a> SSTableCompactor<'a> {
    pub fn new(
        inputs: &'a [Arc<SSTableFacade>],
        kind: CompactionKind,
        max_tuples_per_segment: usize,
    ) -> Self {
        Self { inputs, kind, max_tuples_per_segment: max_tuples_per_segment.max(1) }
    }

    /// Runs the merge. `create_output` opens the builder of the next output
    /// segment and is called lazily, so a merge that writes nothing creates no
    /// files.
    ///
    /// On error, every output written so far is removed.
    pub fn execute<F>(&self, mut create_output: F) -> Result<CompactionOutput>
    where
        F: FnMut(usize) -> Result<SSTableBuilder>,
    {
        let mut output = CompactionOutput::default();
        let mut current: Option<SSTableBuilder> = None;

        let result = self.merge_into(&mut create_output, &mut current, &mut output);

        if let Err(e) = result {
            if let Some(builder) = current.take() {
                if let Err(cleanup) = builder.abandon() {
                    log::warn!("Unable to remove partial compaction output: {}", cleanup);
                }
            }
            for files in &output.segments {
                if let Err(cleanup) = files.remove_all() {
                    log::warn!("Unable to remove compaction output {}: {}", files.number(), cleanup);
                }
            }
            return Err(e);
        }

        Ok(output)
    }

    fn merge_into<F>(
        &self,
        create_output: &mut F,
        current: &mut Option<SSTableBuilder>,
        output: &mut CompactionOutput,
    ) -> Result<()>
    where
        F: FnMut(usize) -> Result<SSTableBuilder>,
    {
        let mut merge = MergeIterator::new(self.inputs)?;
        let expected = self
            .inputs
            .iter()
            .map(|s| s.metadata().tuples as usize)
            .sum::<usize>()
            .min(self.max_tuples_per_segment);

        while let Some(tuple) = merge.next_resolved()? {
            if self.kind == CompactionKind::Major && tuple.is_tombstone() {
                continue;
            }

            if current.is_none() {
                *current = Some(create_output(expected)?);
            }

            if let Some(builder) = current.as_mut() {
                builder.add(&tuple)?;
                output.written_tuples += 1;

                if builder.len() >= self.max_tuples_per_segment {
                    Self::finish_output(current, output)?;
                }
            }
        }

        Self::finish_output(current, output)?;
        output.read_tuples = merge.read_tuples();
        Ok(())
    }

    fn finish_output(current: &mut Option<SSTableBuilder>, output: &mut CompactionOutput) -> Result<()> {
        if let Some(builder) = current.take() {
            output.segments.push(builder.files().clone());
            builder.finish()?;
        }
        Ok(())
    }
}
