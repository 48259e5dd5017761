//! # Table Manager
//!
//! [`TableManager`] owns one table: the active memtable, the memtables
//! waiting to be flushed, and the segments on disk. It exposes the read and
//! write API and runs three background threads per table:
//!
//! - **flush** ([`flush`]): turns queued memtables into segments
//! - **checkpoint** ([`checkpoint`]): flushes data that stayed in memory too long
//! - **compactor** ([`crate::compaction`]): merges segments
//!
//! ## Reads
//!
//! A read acquires every source of the table (see [`AcquiredStores`]), newest
//! data first, and resolves each key to its most recent version. If a source
//! is retired between listing and acquisition the whole pass is retried.
//!
//! ## Writes
//!
//! Writers are serialized by one lock. When the active memtable is full it is
//! swapped for an empty one and handed to the bounded flush queue; a full
//! queue blocks the writer until the flush thread catches up.

pub(crate) mod checkpoint;
pub(crate) mod flush;
pub(crate) mod instances;
pub mod worker;

use crate::compaction::{self, CompactionSummary, MergeStrategy};
use crate::config::Options;
use crate::entity::{can_store_contain_newer, most_recent, visible, BoundingBox, TableName, Tuple};
use crate::error::{Error, Result};
use crate::memtable::Memtable;
use crate::sstable::{parse_data_file_name, parse_segment_file_name, SSTableFacade, SegmentFiles};
use crate::storage::{AcquiredStores, TupleStore};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use instances::TupleStoreInstances;
use parking_lot::{Condvar, Mutex};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use worker::{StopSignal, Worker};

/// Attempts of a read pass to acquire a consistent set of sources.
const MAX_ACQUIRE_RETRIES: usize = 10;

/// How often a writer blocked on a full flush queue checks the table state.
const FLUSH_QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableState {
    /// Not initialized, or shut down.
    Closed,
    Ready,
    /// Destroyed; the table cannot be initialized again.
    Deleted,
}

/// Counters of background activity.
#[derive(Default)]
pub(crate) struct StatsCounters {
    pub flushed_segments: AtomicU64,
    pub compactions: AtomicU64,
    pub compaction_tuples_read: AtomicU64,
    pub compaction_tuples_written: AtomicU64,
}

/// Point-in-time statistics of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Segments currently readable.
    pub segments: usize,
    /// Tuples stored in all segments.
    pub segment_tuples: u64,
    /// Memtables waiting for the flush thread.
    pub unflushed_memtables: usize,
    pub active_memtable_entries: usize,
    pub active_memtable_bytes: usize,
    /// Segments written by flushes since the table was created.
    pub flushed_segments: u64,
    /// Compaction cycles that wrote their result.
    pub compactions: u64,
    pub compaction_tuples_read: u64,
    pub compaction_tuples_written: u64,
}

/// State shared between the manager and its background threads.
pub(crate) struct TableInner {
    pub table_name: TableName,
    pub directory: PathBuf,
    pub options: Options,
    pub strategy: MergeStrategy,
    pub instances: TupleStoreInstances,
    pub stats: StatsCounters,
    state: Mutex<TableState>,
    /// Serializes writers and memtable swaps.
    writer_lock: Mutex<()>,
    /// Serializes compaction cycles.
    pub compaction_lock: Mutex<()>,
    next_segment: AtomicU64,
    next_memtable: AtomicU64,
    flush_sender: Sender<Arc<Memtable>>,
    flush_receiver: Receiver<Arc<Memtable>>,
    flush_lock: Mutex<()>,
    flush_done: Condvar,
}

impl TableInner {
    fn new(table_name: TableName, options: Options) -> Self {
        let directory = table_name.directory(&options.data_directory);
        let (flush_sender, flush_receiver) = channel::bounded(options.max_unflushed_memtables);
        let active = Arc::new(Memtable::new(
            0,
            options.memtable_entries_max,
            options.memtable_size_max,
        ));

        Self {
            table_name,
            directory,
            strategy: MergeStrategy::new(options.merge_strategy),
            options,
            instances: TupleStoreInstances::new(active),
            stats: StatsCounters::default(),
            state: Mutex::new(TableState::Closed),
            writer_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            next_segment: AtomicU64::new(0),
            next_memtable: AtomicU64::new(1),
            flush_sender,
            flush_receiver,
            flush_lock: Mutex::new(()),
            flush_done: Condvar::new(),
        }
    }

    fn state(&self) -> TableState {
        *self.state.lock()
    }

    fn set_state(&self, state: TableState) {
        *self.state.lock() = state;
    }

    pub fn check_ready(&self) -> Result<()> {
        match self.state() {
            TableState::Ready => Ok(()),
            TableState::Closed => {
                Err(Error::not_ready(format!("Table {} is not initialized", self.table_name)))
            }
            TableState::Deleted => {
                Err(Error::not_ready(format!("Table {} was deleted", self.table_name)))
            }
        }
    }

    /// Reserves the sequence number of a new segment.
    pub fn next_segment_files(&self) -> SegmentFiles {
        SegmentFiles::new(&self.directory, self.next_segment.fetch_add(1, Ordering::SeqCst))
    }

    fn new_memtable(&self) -> Arc<Memtable> {
        let number = self.next_memtable.fetch_add(1, Ordering::SeqCst);
        Arc::new(Memtable::new(
            number,
            self.options.memtable_entries_max,
            self.options.memtable_size_max,
        ))
    }

    fn validate_tuple(&self, tuple: &Tuple) -> Result<()> {
        if tuple.key().len() > u16::MAX as usize {
            return Err(Error::invalid_argument(format!(
                "Key too long: {} bytes",
                tuple.key().len()
            )));
        }

        if let Some(bounding_box) = tuple.bounding_box() {
            match bounding_box.dimension() {
                None => {
                    return Err(Error::invalid_argument(format!(
                        "Invalid bounding box for key {}",
                        tuple.key()
                    )))
                }
                Some(0) => {}
                Some(dimension) if dimension != self.table_name.dimension() as usize => {
                    return Err(Error::invalid_argument(format!(
                        "Bounding box of key {} has {} dimensions, table {} has {}",
                        tuple.key(),
                        dimension,
                        self.table_name,
                        self.table_name.dimension()
                    )))
                }
                Some(_) => {}
            }
        }

        if let Some(data) = tuple.data() {
            if data.len() > u32::MAX as usize {
                return Err(Error::invalid_argument(format!(
                    "Value too large: {} bytes",
                    data.len()
                )));
            }
        }
        Ok(())
    }

    /// Inserts a tuple into the active memtable, swapping it first if full.
    fn write(&self, tuple: Tuple) -> Result<()> {
        self.validate_tuple(&tuple)?;

        let _writer = self.writer_lock.lock();
        self.check_ready()?;

        if self.instances.active().is_full() {
            self.rotate_locked()?;
        }
        self.instances.active().put(tuple);
        Ok(())
    }

    /// Swaps out the active memtable if it holds anything.
    pub fn flush_active(&self) -> Result<()> {
        let _writer = self.writer_lock.lock();
        self.check_ready()?;

        if self.instances.active().is_empty() {
            return Ok(());
        }
        self.rotate_locked()
    }

    /// Swaps the active memtable for an empty one and hands the old one to
    /// the flush queue. Must be called with the writer lock held.
    fn rotate_locked(&self) -> Result<()> {
        let old = self.instances.swap_active(self.new_memtable());
        log::debug!(
            "Queued memtable {} of table {} for flush ({} entries)",
            old.number(),
            self.table_name,
            old.len()
        );

        if self.options.run_flush_thread {
            self.enqueue_for_flush(old)
        } else {
            self.flush_unflushed()
        }
    }

    /// Blocks while the flush queue is full. Gives up once the table leaves
    /// the ready state; the memtable stays unflushed and shutdown writes it.
    fn enqueue_for_flush(&self, mut memtable: Arc<Memtable>) -> Result<()> {
        loop {
            match self.flush_sender.send_timeout(memtable, FLUSH_QUEUE_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    self.check_ready()?;
                    memtable = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(Error::internal("Flush queue is disconnected"))
                }
            }
        }
    }

    /// Flushes every unflushed memtable in the calling thread, oldest first.
    pub fn flush_unflushed(&self) -> Result<()> {
        for memtable in self.instances.unflushed() {
            self.flush_memtable(&memtable)?;
        }
        Ok(())
    }

    /// Wakes threads blocked in `wait_until_flushed`.
    pub fn notify_flushed(&self) {
        let _guard = self.flush_lock.lock();
        self.flush_done.notify_all();
    }

    fn drain_flush_queue(&self) -> usize {
        let mut drained = 0;
        while self.flush_receiver.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Opens the segments found in the table directory.
    fn recover(&self) -> Result<()> {
        if self.directory.exists() && !self.directory.is_dir() {
            return Err(Error::storage(format!(
                "{} is not a directory",
                self.directory.display()
            )));
        }
        fs::create_dir_all(&self.directory)?;

        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };

            match parse_data_file_name(file_name) {
                Some(number) => numbers.push(number),
                None if file_name.ends_with(".sst") => {
                    log::warn!("Skipping unrecognized data file {}", file_name);
                }
                None => {}
            }
        }
        numbers.sort_unstable();

        let mut segments = Vec::with_capacity(numbers.len());
        for &number in &numbers {
            match SSTableFacade::open(SegmentFiles::new(&self.directory, number), &self.options) {
                Ok(segment) => {
                    log::debug!(
                        "Found segment {} of table {} ({} tuples)",
                        number,
                        self.table_name,
                        segment.number_of_tuples()
                    );
                    segments.push(Arc::new(segment));
                }
                Err(e) => log::warn!(
                    "Skipping segment {} of table {}: {}",
                    number,
                    self.table_name,
                    e
                ),
            }
        }

        // Never reuse a number, not even one of a skipped segment
        if let Some(max) = numbers.last() {
            self.next_segment.fetch_max(max + 1, Ordering::SeqCst);
        }

        log::info!(
            "Recovered {} segments of table {} from {}",
            segments.len(),
            self.table_name,
            self.directory.display()
        );

        self.instances.reset(self.new_memtable());
        self.instances.set_segments(segments);
        Ok(())
    }

    /// Removes every segment file in the table directory, except those of
    /// the segments in `held`.
    fn remove_segment_files(&self, held: &HashSet<u64>) -> Result<()> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let number = entry.file_name().to_str().and_then(parse_segment_file_name);
            match number {
                Some(number) if !held.contains(&number) => {}
                _ => continue,
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Retires `segments` for good. Segments a reader still holds keep their
    /// data until the last release, but lose their metadata so recovery no
    /// longer sees them. Returns the numbers of those segments.
    fn retire_segments(&self, segments: &[Arc<SSTableFacade>]) -> Result<HashSet<u64>> {
        let mut held = HashSet::new();
        for segment in segments {
            segment.delete_on_close();
            if !segment.is_removed() {
                segment.hide_from_recovery()?;
                held.insert(segment.number());
            }
        }
        Ok(held)
    }

    /// Resolves the newest version of `key` across `stores`.
    fn newest_version(stores: &AcquiredStores, key: &str) -> Result<Option<Tuple>> {
        let mut best: Option<Tuple> = None;
        for store in stores.iter() {
            if !can_store_contain_newer(best.as_ref(), store.newest_tuple_timestamp()) {
                continue;
            }
            best = most_recent(best, store.get(key)?);
        }
        Ok(best)
    }
}

/// Background threads of a running table.
struct Background {
    stop: StopSignal,
    workers: Vec<Worker>,
}

/// The storage manager of one table.
///
/// # Example
///
/// ```rust,no_run
/// use boxstore::{BoundingBox, Options, TableManager, Tuple};
///
/// # fn main() -> Result<(), boxstore::Error> {
/// let options = Options::default().data_directory("./data");
/// let table = TableManager::open("2_maps_roads", options)?;
///
/// let area = BoundingBox::from_intervals(&[(0.0, 1.0), (0.0, 1.0)]);
/// table.put(Tuple::new("road-1", area.clone(), "A1", 1))?;
///
/// assert!(table.get("road-1")?.is_some());
/// assert_eq!(table.tuples_inside(&area)?.len(), 1);
///
/// table.delete("road-1", 2)?;
/// assert!(table.get("road-1")?.is_none());
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `TableManager` can be shared across threads with `Arc<TableManager>`.
pub struct TableManager {
    pub(crate) inner: Arc<TableInner>,
    /// Serializes init, shutdown, clear and destroy.
    control: Mutex<Option<Background>>,
}

impl TableManager {
    /// Creates the manager of a table without touching the disk.
    ///
    /// `table_name` must have the form `<dimension>_<group>_<table>`.
    pub fn new(table_name: &str, options: Options) -> Result<Self> {
        options.validate()?;
        let table_name = TableName::parse(table_name)?;

        Ok(Self {
            inner: Arc::new(TableInner::new(table_name, options)),
            control: Mutex::new(None),
        })
    }

    /// Creates the manager of a table and initializes it.
    pub fn open(table_name: &str, options: Options) -> Result<Self> {
        let table = Self::new(table_name, options)?;
        table.init()?;
        Ok(table)
    }

    pub fn table_name(&self) -> &TableName {
        &self.inner.table_name
    }

    /// Directory holding the table's segment files.
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state() == TableState::Ready
    }

    /// Recovers the table from its directory and starts the background
    /// threads. Does nothing if the table is already ready.
    pub fn init(&self) -> Result<()> {
        let mut control = self.control.lock();
        self.init_locked(&mut control)
    }

    fn init_locked(&self, control: &mut Option<Background>) -> Result<()> {
        match self.inner.state() {
            TableState::Ready => return Ok(()),
            TableState::Deleted => {
                return Err(Error::not_ready(format!(
                    "Table {} was deleted",
                    self.inner.table_name
                )))
            }
            TableState::Closed => {}
        }

        self.inner.recover()?;
        self.inner.set_state(TableState::Ready);

        match self.start_background() {
            Ok(background) => *control = Some(background),
            Err(e) => {
                self.inner.set_state(TableState::Closed);
                return Err(e);
            }
        }

        log::info!("Table {} is ready", self.inner.table_name);
        Ok(())
    }

    fn start_background(&self) -> Result<Background> {
        let stop = StopSignal::new();
        let mut background = Background { stop, workers: Vec::new() };
        let name = self.inner.table_name.full_name();

        let started = (|| {
            if self.inner.options.run_flush_thread {
                background.workers.push(flush::spawn_flush_thread(
                    self.inner.clone(),
                    self.inner.flush_receiver.clone(),
                    background.stop.receiver(),
                )?);
            }
            if let Some(max_age) = self.inner.options.checkpoint_interval() {
                background.workers.push(checkpoint::spawn_checkpoint_thread(
                    self.inner.clone(),
                    max_age,
                    background.stop.receiver(),
                )?);
            }
            if self.inner.options.run_compact_thread {
                background.workers.push(compaction::spawn_compactor_thread(
                    self.inner.clone(),
                    background.stop.receiver(),
                )?);
            }
            Ok::<(), Error>(())
        })();

        if let Err(e) = started {
            log::error!("Unable to start background threads of table {}: {}", name, e);
            self.stop_background(Some(background));
            return Err(e);
        }
        Ok(background)
    }

    fn stop_background(&self, background: Option<Background>) {
        let Some(background) = background else {
            return;
        };

        background.stop.stop();
        let timeout = self.inner.options.thread_join_timeout();
        for worker in background.workers {
            let name = worker.name().to_string();
            if !worker.join_timeout(timeout) {
                log::warn!(
                    "Thread {} of table {} is still running after shutdown",
                    name,
                    self.inner.table_name
                );
            }
        }
    }

    /// Stops the background threads, flushes everything held in memory and
    /// releases the segments. Does nothing unless the table is ready.
    pub fn shutdown(&self) -> Result<()> {
        let mut control = self.control.lock();
        if self.inner.state() != TableState::Ready {
            return Ok(());
        }

        log::info!("Shutting down table {}", self.inner.table_name);
        self.inner.set_state(TableState::Closed);

        {
            // Waits for in-flight writers; later ones see the closed state
            let _writer = self.inner.writer_lock.lock();
            if !self.inner.instances.active().is_empty() {
                self.inner.instances.swap_active(self.inner.new_memtable());
            }
        }

        self.stop_background(control.take());
        self.inner.drain_flush_queue();

        let mut result = Ok(());
        for memtable in self.inner.instances.unflushed() {
            if let Err(e) = self.inner.flush_memtable(&memtable) {
                log::error!(
                    "Unable to flush memtable {} of table {} at shutdown: {}",
                    memtable.number(),
                    self.inner.table_name,
                    e
                );
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        // Readers still holding a segment keep it alive
        let (_, segments) = self.inner.instances.reset(self.inner.new_memtable());
        log::info!(
            "Table {} is shut down, released {} segments",
            self.inner.table_name,
            segments.len()
        );
        result
    }

    /// Drops all data of the table, in memory and on disk, and initializes it
    /// again, empty.
    pub fn clear(&self) -> Result<()> {
        let mut control = self.control.lock();
        self.discard_all(&mut control)?;
        log::info!("Cleared table {}", self.inner.table_name);
        self.init_locked(&mut control)
    }

    /// Drops all data of the table and removes its directory. The table
    /// cannot be used afterwards.
    pub fn destroy(&self) -> Result<()> {
        let mut control = self.control.lock();
        let held = self.discard_all(&mut control)?;

        if held.is_empty() {
            match fs::remove_dir_all(&self.inner.directory) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            log::info!(
                "Directory of table {} is kept until segments {:?} are released",
                self.inner.table_name,
                held
            );
        }
        self.inner.set_state(TableState::Deleted);

        log::info!("Destroyed table {}", self.inner.table_name);
        Ok(())
    }

    /// Drops everything the table holds. Returns the numbers of segments
    /// whose files stay until their readers release them.
    fn discard_all(&self, control: &mut Option<Background>) -> Result<HashSet<u64>> {
        if self.inner.state() == TableState::Deleted {
            return Err(Error::not_ready(format!("Table {} was deleted", self.inner.table_name)));
        }
        self.inner.set_state(TableState::Closed);

        // Threads waiting for the writer lock see the closed state and exit
        self.stop_background(control.take());
        let _writer = self.inner.writer_lock.lock();
        self.inner.drain_flush_queue();

        let _compaction = self.inner.compaction_lock.lock();
        let (memtables, segments) = self.inner.instances.reset(self.inner.new_memtable());
        for memtable in &memtables {
            memtable.delete_on_close();
        }
        let held = self.inner.retire_segments(&segments)?;
        self.inner.remove_segment_files(&held)?;
        self.inner.notify_flushed();
        Ok(held)
    }

    /// Stores a tuple.
    pub fn put(&self, tuple: Tuple) -> Result<()> {
        self.inner.write(tuple)
    }

    /// Deletes `key` as of `timestamp` by storing a tombstone.
    pub fn delete(&self, key: &str, timestamp: i64) -> Result<()> {
        self.inner.write(Tuple::tombstone(key, timestamp))
    }

    /// Hands the active memtable to the flush queue, full or not.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush_active()
    }

    /// Blocks until every queued memtable has been written to a segment.
    ///
    /// Returns `false` if memtables were still queued when `timeout` passed.
    pub fn wait_until_flushed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.flush_lock.lock();

        while self.inner.instances.unflushed_count() > 0 {
            if self.inner.flush_done.wait_until(&mut guard, deadline).timed_out() {
                return self.inner.instances.unflushed_count() == 0;
            }
        }
        true
    }

    /// Runs one compaction cycle in the calling thread.
    ///
    /// Returns `None` if the merge strategy found nothing to merge.
    pub fn compact_now(&self) -> Result<Option<CompactionSummary>> {
        self.inner.check_ready()?;
        compaction::compact_once(&self.inner)
    }

    /// Acquires every read source, retrying if one is retired meanwhile.
    fn acquire_stores(&self) -> Result<AcquiredStores> {
        for attempt in 1..=MAX_ACQUIRE_RETRIES {
            self.inner.check_ready()?;
            if let Some(stores) = AcquiredStores::try_acquire(self.inner.instances.snapshot()) {
                return Ok(stores);
            }
            log::debug!(
                "Acquisition pass {} on table {} failed, retrying",
                attempt,
                self.inner.table_name
            );
            thread::yield_now();
        }

        log::warn!(
            "Unable to acquire the stores of table {} in {} attempts",
            self.inner.table_name,
            MAX_ACQUIRE_RETRIES
        );
        Err(Error::AcquisitionExhausted { retries: MAX_ACQUIRE_RETRIES })
    }

    /// Returns the newest version of `key`, or `None` if it does not exist or
    /// was deleted.
    pub fn get(&self, key: &str) -> Result<Option<Tuple>> {
        let stores = self.acquire_stores()?;
        let best = TableInner::newest_version(&stores, key)?;
        Ok(visible(best))
    }

    /// Returns the newest version of every key whose bounding box overlaps
    /// `bounding_box`, ordered by key.
    ///
    /// A candidate is dropped if any source holds a newer version of its key
    /// that is a tombstone or lies outside the box.
    pub fn tuples_inside(&self, bounding_box: &BoundingBox) -> Result<Vec<Tuple>> {
        let stores = self.acquire_stores()?;

        let mut candidates = BTreeMap::new();
        for store in stores.iter() {
            for tuple in store.tuples_inside(bounding_box)? {
                keep_newest(&mut candidates, tuple);
            }
        }

        let mut result = Vec::with_capacity(candidates.len());
        for (key, candidate) in candidates {
            let newest = TableInner::newest_version(&stores, &key)?;
            let is_newest = newest
                .as_ref()
                .is_some_and(|t| t.version_timestamp() == candidate.version_timestamp());

            if is_newest && !candidate.is_tombstone() {
                result.push(candidate);
            }
        }
        Ok(result)
    }

    /// Returns the newest version of every key written after `timestamp`,
    /// ordered by key. Deleted keys are left out.
    pub fn tuples_after_time(&self, timestamp: i64) -> Result<Vec<Tuple>> {
        let stores = self.acquire_stores()?;

        let mut newest = BTreeMap::new();
        for store in stores.iter() {
            if store.newest_tuple_timestamp() <= timestamp {
                continue;
            }
            for tuple in store.tuples_after_time(timestamp)? {
                keep_newest(&mut newest, tuple);
            }
        }

        Ok(newest.into_values().filter(|t| !t.is_tombstone()).collect())
    }

    /// Sequence numbers of the readable segments, ascending.
    pub fn segment_numbers(&self) -> Vec<u64> {
        self.inner.instances.segments().iter().map(|s| s.number()).collect()
    }

    pub fn stats(&self) -> TableStats {
        let instances = &self.inner.instances;
        let segments = instances.segments();
        let active = instances.active();
        let counters = &self.inner.stats;

        TableStats {
            segments: segments.len(),
            segment_tuples: segments.iter().map(|s| s.number_of_tuples()).sum(),
            unflushed_memtables: instances.unflushed_count(),
            active_memtable_entries: active.len(),
            active_memtable_bytes: active.approximate_size(),
            flushed_segments: counters.flushed_segments.load(Ordering::Relaxed),
            compactions: counters.compactions.load(Ordering::Relaxed),
            compaction_tuples_read: counters.compaction_tuples_read.load(Ordering::Relaxed),
            compaction_tuples_written: counters.compaction_tuples_written.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TableManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Error shutting down table {} on drop: {}", self.inner.table_name, e);
        }
    }
}

/// Keeps the newest version per key; on equal timestamps the first one seen.
fn keep_newest(tuples: &mut BTreeMap<String, Tuple>, tuple: Tuple) {
    match tuples.entry(tuple.key().to_string()) {
        Entry::Vacant(entry) => {
            entry.insert(tuple);
        }
        Entry::Occupied(mut entry) => {
            if tuple.version_timestamp() > entry.get().version_timestamp() {
                entry.insert(tuple);
            }
        }
    }
}
