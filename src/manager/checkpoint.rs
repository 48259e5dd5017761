//! Age based flushing.
//!
//! Data only reaches a segment when its memtable fills up. The checkpoint
//! thread bounds how long a tuple can stay in memory: once the oldest
//! in-memory version is older than the configured age, the active memtable
//! is flushed.

use super::worker::{StopReceiver, Worker};
use super::TableInner;
use crate::entity::microtime;
use crate::error::Result;
use crate::storage::TupleStore;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn spawn_checkpoint_thread(
    table: Arc<TableInner>,
    max_age: Duration,
    stop: StopReceiver,
) -> Result<Worker> {
    let name = format!("checkpoint-{}", table.table_name);
    let delay = table.options.checkpoint_check_delay();

    Worker::spawn(name, move || {
        while !stop.wait(delay) {
            if let Err(e) = table.checkpoint(max_age, microtime()) {
                log::error!("Checkpoint of table {} failed: {}", table.table_name, e);
            }
        }
        log::debug!("Checkpoint thread of table {} stopped", table.table_name);
    })
}

impl TableInner {
    /// Flushes the active memtable if in-memory data is older than `max_age`
    /// at time `now` (microseconds). Returns `true` if a flush was started.
    pub(crate) fn checkpoint(&self, max_age: Duration, now: i64) -> Result<bool> {
        let oldest = self
            .instances
            .in_memory_stores()
            .iter()
            .filter(|memtable| !memtable.is_empty())
            .map(|memtable| memtable.oldest_tuple_timestamp())
            .min();

        let Some(oldest) = oldest else {
            log::debug!("Checkpoint of table {}: nothing in memory", self.table_name);
            return Ok(false);
        };

        let max_age_us = i64::try_from(max_age.as_micros()).unwrap_or(i64::MAX);
        if oldest.saturating_add(max_age_us) >= now {
            log::debug!("Checkpoint of table {}: in-memory data is recent", self.table_name);
            return Ok(false);
        }

        if self.instances.active().is_empty() {
            log::debug!(
                "Checkpoint of table {}: old data is already queued for flush",
                self.table_name
            );
            return Ok(false);
        }

        log::info!("Checkpoint of table {}: flushing the active memtable", self.table_name);
        self.flush_active()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Options;
    use crate::entity::{microtime, BoundingBox, Tuple};
    use crate::manager::TableManager;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> Options {
        Options::default()
            .data_directory(dir.path())
            .run_flush_thread(false)
            .run_compact_thread(false)
            .checkpoint_interval_secs(0)
            .sync_segments(false)
    }

    #[test]
    fn test_checkpoint_flushes_old_data() {
        let dir = TempDir::new().unwrap();
        let table = TableManager::open("2_checkpoint_test", options(&dir)).unwrap();
        let max_age = Duration::from_secs(60);
        let now = microtime();

        assert!(!table.inner.checkpoint(max_age, now).unwrap());

        table.put(Tuple::new("fresh", BoundingBox::EMPTY, "v", now)).unwrap();
        assert!(!table.inner.checkpoint(max_age, now).unwrap());
        assert_eq!(table.stats().segments, 0);

        let later = now + 61 * 1_000_000;
        assert!(table.inner.checkpoint(max_age, later).unwrap());
        assert_eq!(table.stats().segments, 1);
        assert!(!table.inner.checkpoint(max_age, later).unwrap());
    }

    #[test]
    fn test_checkpoint_thread() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir).checkpoint_interval_secs(1).checkpoint_check_delay_ms(20);
        let table = TableManager::open("2_checkpoint_test", options).unwrap();

        let stale = microtime() - 5 * 1_000_000;
        table.put(Tuple::new("stale", BoundingBox::EMPTY, "v", stale)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while table.stats().segments == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(table.stats().segments, 1);
        assert!(table.get("stale").unwrap().is_some());
    }
}
