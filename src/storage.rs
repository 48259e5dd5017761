//! Read sources and their reference-counted lifetime.
//!
//! Every source a read pass consults (the active memtable, memtables waiting
//! for the flush thread, and on-disk segments) implements [`TupleStore`].
//! A source must be acquired before use and released afterwards. Once a
//! source is marked delete-on-close it refuses new acquisitions, and its
//! resources are freed when the last holder releases it.

use crate::entity::{BoundingBox, Tuple};
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// A readable, reference-counted collection of tuples.
pub trait TupleStore: Send + Sync {
    /// A short name for logging, e.g. `memtable_3` or `sstable_12`.
    fn internal_name(&self) -> String;

    /// Returns the newest version of `key` stored here, tombstones included.
    fn get(&self, key: &str) -> Result<Option<Tuple>>;

    /// All stored live tuples whose bounding box overlaps `bounding_box`.
    fn tuples_inside(&self, bounding_box: &BoundingBox) -> Result<Vec<Tuple>>;

    /// All stored tuples, tombstones included, newer than `timestamp`.
    fn tuples_after_time(&self, timestamp: i64) -> Result<Vec<Tuple>>;

    fn number_of_tuples(&self) -> u64;

    /// Version timestamp of the oldest tuple, `i64::MAX` when empty.
    fn oldest_tuple_timestamp(&self) -> i64;

    /// Version timestamp of the newest tuple, `i64::MIN` when empty.
    fn newest_tuple_timestamp(&self) -> i64;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Increments the usage counter. Returns `false` once deletion is pending.
    fn acquire(&self) -> bool;

    /// Decrements the usage counter, freeing the store if it was the last user
    /// and deletion is pending.
    fn release(&self);

    /// Requests deletion as soon as the store is unused.
    fn delete_on_close(&self);

    fn is_delete_pending(&self) -> bool;
}

/// Lifetime state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Live,
    DeletePending,
    Deleted,
}

#[derive(Debug)]
struct LifecycleInner {
    usage: usize,
    state: LifecycleState,
}

/// Usage counter plus tri-state deletion flag.
///
/// The methods that can finish a store's life return `true` exactly once, to
/// the caller that must then free the store's resources.
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<LifecycleInner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { inner: Mutex::new(LifecycleInner { usage: 0, state: LifecycleState::Live }) }
    }

    /// Increments the usage counter unless the store has left the live state.
    pub fn acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != LifecycleState::Live {
            return false;
        }
        inner.usage += 1;
        true
    }

    /// Decrements the usage counter. Returns `true` if the store must be freed now.
    pub fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.usage == 0 {
            log::warn!("Release called on a store that is not acquired");
            return false;
        }
        inner.usage -= 1;
        Self::finish_if_unused(&mut inner)
    }

    /// Marks the store for deletion. Returns `true` if the store must be freed now.
    pub fn delete_on_close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Live {
            inner.state = LifecycleState::DeletePending;
        }
        Self::finish_if_unused(&mut inner)
    }

    fn finish_if_unused(inner: &mut LifecycleInner) -> bool {
        if inner.usage == 0 && inner.state == LifecycleState::DeletePending {
            inner.state = LifecycleState::Deleted;
            return true;
        }
        false
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    pub fn is_delete_pending(&self) -> bool {
        self.state() != LifecycleState::Live
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of acquired stores, released on drop.
///
/// Stores are kept in read order: newest data first.
pub struct AcquiredStores {
    stores: Vec<Arc<dyn TupleStore>>,
}

impl AcquiredStores {
    /// Acquires every store or none of them.
    ///
    /// Returns `None` if any store refuses; stores acquired so far are
    /// released again.
    pub fn try_acquire(stores: Vec<Arc<dyn TupleStore>>) -> Option<Self> {
        let mut acquired: Vec<Arc<dyn TupleStore>> = Vec::with_capacity(stores.len());

        for store in stores {
            if !store.acquire() {
                log::debug!("Unable to acquire {}, retrying", store.internal_name());
                for held in &acquired {
                    held.release();
                }
                return None;
            }
            acquired.push(store);
        }

        Some(Self { stores: acquired })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TupleStore>> {
        self.stores.iter()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl Drop for AcquiredStores {
    fn drop(&mut self) {
        for store in &self.stores {
            store.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_deferred_delete() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.acquire());
        assert!(lifecycle.acquire());

        assert!(!lifecycle.delete_on_close());
        assert_eq!(lifecycle.state(), LifecycleState::DeletePending);
        assert!(!lifecycle.acquire());

        assert!(!lifecycle.release());
        assert!(lifecycle.release());
        assert_eq!(lifecycle.state(), LifecycleState::Deleted);

        // Deleted exactly once
        assert!(!lifecycle.delete_on_close());
    }

    #[test]
    fn test_lifecycle_immediate_delete() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.delete_on_close());
        assert_eq!(lifecycle.state(), LifecycleState::Deleted);
        assert!(!lifecycle.acquire());
    }

    #[test]
    fn test_unbalanced_release_is_ignored() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.release());
        assert_eq!(lifecycle.usage(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Live);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(lifecycle.acquire());
                        assert!(!lifecycle.release());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lifecycle.usage(), 0);
        assert!(lifecycle.delete_on_close());
    }
}
