//! Keyed storage for limiter state.
//!
//! A store maps client keys to entries and hands out shared handles. Callers
//! lock a handle for the duration of one admission step, which makes updates
//! to a single key linearizable regardless of how the map itself is guarded.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::strategy::LimiterState;

/// State for one key plus the bookkeeping needed to evict it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub state: LimiterState,
    /// Latest time the key was checked
    pub last_seen: Instant,
}

impl Entry {
    pub fn new(state: LimiterState, now: Instant) -> Self {
        Self {
            state,
            last_seen: now,
        }
    }

    /// Advance `last_seen`, never moving it backwards.
    pub fn touch(&mut self, now: Instant) {
        self.last_seen = self.last_seen.max(now);
    }
}

/// Shared, individually locked entry.
pub type StateHandle = Arc<Mutex<Entry>>;

/// Concurrency-safe map from client key to limiter state.
pub trait LimiterStore: Send + Sync {
    /// Return the handle for `key`, creating the entry with `init` if absent.
    fn get_or_init<F>(&self, key: &str, init: F) -> StateHandle
    where
        F: FnOnce() -> Entry;

    /// Return the handle for `key` if it has been observed.
    fn get(&self, key: &str) -> Option<StateHandle>;

    /// Remove entries last seen before `cutoff` that no caller is holding.
    ///
    /// Returns the number of entries removed.
    fn retain_active(&self, cutoff: Instant) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    fn clear(&self);
}

/// An entry may be evicted only when idle and unreferenced.
///
/// Must be called with the map (or shard) write-locked so no new handle can
/// be cloned concurrently.
fn is_evictable(handle: &StateHandle, cutoff: Instant) -> bool {
    if Arc::strong_count(handle) > 1 {
        return false;
    }
    match handle.try_lock() {
        Some(entry) => entry.last_seen < cutoff,
        None => false,
    }
}

/// Sharded store: keys in different shards never contend, and each entry
/// carries its own lock.
#[derive(Debug, Default)]
pub struct ShardedStore {
    entries: DashMap<String, StateHandle>,
}

impl ShardedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LimiterStore for ShardedStore {
    fn get_or_init<F>(&self, key: &str, init: F) -> StateHandle
    where
        F: FnOnce() -> Entry,
    {
        if let Some(handle) = self.entries.get(key) {
            return Arc::clone(handle.value());
        }

        let handle = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())));
        Arc::clone(handle.value())
    }

    fn get(&self, key: &str) -> Option<StateHandle> {
        self.entries.get(key).map(|handle| Arc::clone(handle.value()))
    }

    fn retain_active(&self, cutoff: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, handle| {
            let evict = is_evictable(handle, cutoff);
            if evict {
                removed += 1;
            }
            !evict
        });
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Store guarded by a single map-wide lock.
///
/// Every lookup, for any key, serializes on the same lock. Useful as a
/// correctness baseline for [`ShardedStore`].
#[derive(Debug, Default)]
pub struct GlobalLockStore {
    entries: RwLock<HashMap<String, StateHandle>>,
}

impl GlobalLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LimiterStore for GlobalLockStore {
    fn get_or_init<F>(&self, key: &str, init: F) -> StateHandle
    where
        F: FnOnce() -> Entry,
    {
        let mut entries = self.entries.write();
        let handle = entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())));
        Arc::clone(handle)
    }

    fn get(&self, key: &str) -> Option<StateHandle> {
        self.entries.read().get(key).map(Arc::clone)
    }

    fn retain_active(&self, cutoff: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, handle| !is_evictable(handle, cutoff));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
