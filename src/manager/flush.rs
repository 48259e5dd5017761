//! Memtable flushing.
//!
//! The flush thread pops memtables from the bounded flush queue and writes
//! each one into a new segment. A failed flush is retried after a delay; the
//! memtable stays readable until its segment is registered.

use super::worker::{StopReceiver, Worker};
use super::TableInner;
use crate::error::Result;
use crate::memtable::Memtable;
use crate::sstable::{SSTableBuilder, SSTableFacade};
use crate::storage::TupleStore;
use crossbeam::channel::{self, Receiver};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const FLUSH_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(crate) fn spawn_flush_thread(
    table: Arc<TableInner>,
    queue: Receiver<Arc<Memtable>>,
    stop: StopReceiver,
) -> Result<Worker> {
    let name = format!("flush-{}", table.table_name);
    Worker::spawn(name, move || {
        loop {
            let running = channel::select! {
                recv(queue) -> memtable => match memtable {
                    Ok(memtable) => {
                        flush_with_retry(&table, &memtable, &stop);
                        true
                    }
                    Err(_) => false,
                },
                recv(stop.channel()) -> _ => false,
            };
            if !running {
                break;
            }
        }
        log::debug!("Flush thread of table {} stopped", table.table_name);
    })
}

fn flush_with_retry(table: &TableInner, memtable: &Arc<Memtable>, stop: &StopReceiver) {
    loop {
        match table.flush_memtable(memtable) {
            Ok(()) => return,
            Err(e) => {
                log::error!(
                    "Flush of memtable {} of table {} failed, retrying: {}",
                    memtable.number(),
                    table.table_name,
                    e
                );
                // Shutdown flushes whatever is still unflushed
                if stop.wait(FLUSH_RETRY_DELAY) {
                    return;
                }
            }
        }
    }
}

impl TableInner {
    /// Writes a memtable into a new segment and swaps one for the other.
    ///
    /// An empty memtable is simply dropped. On error the memtable stays in
    /// the unflushed list and no segment files are left behind. A memtable
    /// another thread is already flushing is skipped.
    pub(crate) fn flush_memtable(&self, memtable: &Arc<Memtable>) -> Result<()> {
        let Some(_claim) = memtable.begin_flush() else {
            log::warn!(
                "Memtable {} of table {} is already being flushed, skipping it",
                memtable.number(),
                self.table_name
            );
            return Ok(());
        };

        if memtable.is_empty() {
            self.instances.replace_memtable_with_segment(memtable, None);
            memtable.delete_on_close();
            self.notify_flushed();
            return Ok(());
        }

        let files = self.next_segment_files();
        let mut builder = SSTableBuilder::create(files.clone(), memtable.len(), &self.options)?;

        for tuple in memtable.newest_versions() {
            if let Err(e) = builder.add(&tuple) {
                if let Err(cleanup) = builder.abandon() {
                    log::warn!("Unable to remove partial segment {}: {}", files.number(), cleanup);
                }
                return Err(e);
            }
        }

        let written = builder.len();
        let bytes = builder.data_size();
        if let Err(e) = builder.finish() {
            if let Err(cleanup) = files.remove_all() {
                log::warn!("Unable to remove partial segment {}: {}", files.number(), cleanup);
            }
            return Err(e);
        }

        let segment = match SSTableFacade::open(files.clone(), &self.options) {
            Ok(segment) => Arc::new(segment),
            Err(e) => {
                if let Err(cleanup) = files.remove_all() {
                    log::warn!("Unable to remove segment {}: {}", files.number(), cleanup);
                }
                return Err(e);
            }
        };

        self.instances.replace_memtable_with_segment(memtable, Some(segment));
        memtable.delete_on_close();
        self.stats.flushed_segments.fetch_add(1, Ordering::Relaxed);
        self.notify_flushed();

        log::info!(
            "Flushed memtable {} of table {} into segment {} ({} tuples, {} bytes)",
            memtable.number(),
            self.table_name,
            files.number(),
            written,
            bytes
        );
        Ok(())
    }
}
