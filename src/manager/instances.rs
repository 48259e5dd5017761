//! The set of read sources of one table.
//!
//! All mutations happen under one write lock, so a read snapshot never sees a
//! memtable and the segment it was flushed into both missing or both present
//! in inconsistent order.

use crate::memtable::Memtable;
use crate::sstable::SSTableFacade;
use crate::storage::TupleStore;
use parking_lot::RwLock;
use std::sync::Arc;

struct Instances {
    active: Arc<Memtable>,
    /// Memtables waiting for the flush thread, oldest first.
    unflushed: Vec<Arc<Memtable>>,
    /// Segments ordered by ascending number.
    segments: Vec<Arc<SSTableFacade>>,
}

/// Everything a table currently reads from.
pub(crate) struct TupleStoreInstances {
    inner: RwLock<Instances>,
}

impl TupleStoreInstances {
    pub fn new(active: Arc<Memtable>) -> Self {
        Self { inner: RwLock::new(Instances { active, unflushed: Vec::new(), segments: Vec::new() }) }
    }

    pub fn active(&self) -> Arc<Memtable> {
        self.inner.read().active.clone()
    }

    /// Replaces the active memtable and queues the old one as unflushed.
    pub fn swap_active(&self, replacement: Arc<Memtable>) -> Arc<Memtable> {
        let mut inner = self.inner.write();
        let old = std::mem::replace(&mut inner.active, replacement);
        inner.unflushed.push(old.clone());
        old
    }

    /// Swaps a flushed memtable for its segment in one step.
    pub fn replace_memtable_with_segment(
        &self,
        memtable: &Arc<Memtable>,
        segment: Option<Arc<SSTableFacade>>,
    ) {
        let mut inner = self.inner.write();
        inner.unflushed.retain(|m| !Arc::ptr_eq(m, memtable));
        if let Some(segment) = segment {
            inner.segments.push(segment);
            inner.segments.sort_by_key(|s| s.number());
        }
    }

    /// Swaps compaction inputs for their outputs in one step.
    pub fn replace_segments(&self, inputs: &[Arc<SSTableFacade>], outputs: Vec<Arc<SSTableFacade>>) {
        let mut inner = self.inner.write();
        inner.segments.retain(|s| !inputs.iter().any(|input| Arc::ptr_eq(s, input)));
        inner.segments.extend(outputs);
        inner.segments.sort_by_key(|s| s.number());
    }

    pub fn set_segments(&self, mut segments: Vec<Arc<SSTableFacade>>) {
        segments.sort_by_key(|s| s.number());
        self.inner.write().segments = segments;
    }

    /// Segments ordered by ascending number.
    pub fn segments(&self) -> Vec<Arc<SSTableFacade>> {
        self.inner.read().segments.clone()
    }

    pub fn unflushed(&self) -> Vec<Arc<Memtable>> {
        self.inner.read().unflushed.clone()
    }

    pub fn unflushed_count(&self) -> usize {
        self.inner.read().unflushed.len()
    }

    /// The active memtable and all unflushed memtables.
    pub fn in_memory_stores(&self) -> Vec<Arc<Memtable>> {
        let inner = self.inner.read();
        std::iter::once(inner.active.clone()).chain(inner.unflushed.iter().cloned()).collect()
    }

    /// All read sources, newest data first: the active memtable, unflushed
    /// memtables newest first, then segments by descending number.
    pub fn snapshot(&self) -> Vec<Arc<dyn TupleStore>> {
        let inner = self.inner.read();
        let mut stores: Vec<Arc<dyn TupleStore>> =
            Vec::with_capacity(1 + inner.unflushed.len() + inner.segments.len());

        stores.push(inner.active.clone());
        for memtable in inner.unflushed.iter().rev() {
            stores.push(memtable.clone());
        }
        for segment in inner.segments.iter().rev() {
            stores.push(segment.clone());
        }
        stores
    }

    /// Empties the set, returning everything it held.
    pub fn reset(
        &self,
        active: Arc<Memtable>,
    ) -> (Vec<Arc<Memtable>>, Vec<Arc<SSTableFacade>>) {
        let mut inner = self.inner.write();
        let old_active = std::mem::replace(&mut inner.active, active);
        let mut memtables = std::mem::take(&mut inner.unflushed);
        memtables.push(old_active);
        let segments = std::mem::take(&mut inner.segments);
        (memtables, segments)
    }
}
