//! Per-key report cache with staleness and an exclusive build lock.
//!
//! One entry per key. `mark_in_progress` is an atomic test-and-set under
//! the cache mutex, which keeps it race-free in a single process; the
//! flag is in-memory only, so horizontal scaling would need a shared
//! lock (open question, recorded in DESIGN.md). Builders hold a
//! `BuildGuard` so the flag is released on every exit path, including
//! panics and early returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::debug;

use crate::report::model::ReportKey;

/// A cached value plus its staleness verdict.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub is_stale: bool,
}

/// Cache occupancy snapshot for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub builds_in_progress: usize,
}

#[derive(Debug)]
struct Stored<T> {
    value: T,
    generated_at: Instant,
    ttl: Duration,
}

#[derive(Debug)]
struct Slot<T> {
    stored: Option<Stored<T>>,
    in_progress: bool,
}

// Manual impl: the derive would require `T: Default`, which the slot
// never needs.
impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            stored: None,
            in_progress: false,
        }
    }
}

struct CacheInner<T> {
    slots: Mutex<HashMap<ReportKey, Slot<T>>>,
    /// Signalled whenever a build lock is released, so waiters can
    /// re-read the cache.
    build_done: Notify,
    default_ttl: Duration,
}

/// Shared-handle report cache.
pub struct ReportCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for ReportCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> ReportCache<T> {
    /// Create a cache whose entries stay fresh for `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: Mutex::new(HashMap::new()),
                build_done: Notify::new(),
                default_ttl,
            }),
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<ReportKey, Slot<T>>> {
        self.inner.slots.lock().expect("report cache lock poisoned")
    }

    /// Read an entry. A value past its TTL is still returned — never
    /// dropped — with `is_stale = true`.
    pub fn get(&self, key: &ReportKey) -> Option<Fetched<T>> {
        let slots = self.slots();
        let stored = slots.get(key)?.stored.as_ref()?;
        Some(Fetched {
            data: stored.value.clone(),
            is_stale: stored.generated_at.elapsed() > stored.ttl,
        })
    }

    /// Store a value with a fresh timestamp and the default TTL.
    pub fn set(&self, key: ReportKey, value: T) {
        self.set_with_ttl(key, value, self.inner.default_ttl);
    }

    /// Store a value with an explicit TTL.
    pub fn set_with_ttl(&self, key: ReportKey, value: T, ttl: Duration) {
        let mut slots = self.slots();
        let slot = slots.entry(key).or_default();
        slot.stored = Some(Stored {
            value,
            generated_at: Instant::now(),
            ttl,
        });
    }

    /// Atomic test-and-set of the build lock. Returns `false` when a
    /// build is already running for this key.
    pub fn mark_in_progress(&self, key: &ReportKey) -> bool {
        let mut slots = self.slots();
        let slot = slots.entry(key.clone()).or_default();
        if slot.in_progress {
            return false;
        }
        slot.in_progress = true;
        true
    }

    /// Release the build lock and wake any waiters. No-op for unknown
    /// keys (the slot may have been invalidated mid-build).
    pub fn unmark_in_progress(&self, key: &ReportKey) {
        {
            let mut slots = self.slots();
            if let Some(slot) = slots.get_mut(key) {
                slot.in_progress = false;
                // Drop empty slots so invalidated keys don't linger.
                if slot.stored.is_none() {
                    slots.remove(key);
                }
            }
        }
        self.inner.build_done.notify_waiters();
    }

    /// Acquire the build lock as a guard that releases on drop.
    pub fn begin_build(&self, key: &ReportKey) -> Option<BuildGuard<T>> {
        if self.mark_in_progress(key) {
            Some(BuildGuard {
                cache: self.clone(),
                key: key.clone(),
            })
        } else {
            None
        }
    }

    /// Future that resolves the next time any build lock is released.
    /// Callers must pin and `enable()` it before re-checking the cache,
    /// or a release landing in between is lost.
    pub fn build_completed(&self) -> Notified<'_> {
        self.inner.build_done.notified()
    }

    /// Remove one entry. Returns whether a value was removed. A running
    /// build keeps its lock; its eventual `set` repopulates the slot.
    pub fn invalidate(&self, key: &ReportKey) -> bool {
        let mut slots = self.slots();
        match slots.get_mut(key) {
            Some(slot) if slot.in_progress => {
                debug!(key = %key, "Invalidated entry with build in flight");
                slot.stored.take().is_some()
            }
            Some(_) => slots.remove(key).is_some_and(|s| s.stored.is_some()),
            None => false,
        }
    }

    /// Remove every entry for one agent. Returns the number of values
    /// removed.
    pub fn invalidate_agent(&self, agent: &str) -> usize {
        let mut slots = self.slots();
        let keys: Vec<ReportKey> = slots
            .keys()
            .filter(|k| k.agent == agent)
            .cloned()
            .collect();
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = slots.get_mut(&key) {
                if slot.stored.take().is_some() {
                    removed += 1;
                }
                if !slot.in_progress {
                    slots.remove(&key);
                }
            }
        }
        removed
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> CacheStats {
        let slots = self.slots();
        CacheStats {
            entries: slots.values().filter(|s| s.stored.is_some()).count(),
            builds_in_progress: slots.values().filter(|s| s.in_progress).count(),
        }
    }
}

/// RAII build lock: `unmark_in_progress` runs on drop, so the lock is
/// released on success, failure, and panic alike.
pub struct BuildGuard<T> {
    cache: ReportCache<T>,
    key: ReportKey,
}

impl<T: Clone> BuildGuard<T> {
    pub fn key(&self) -> &ReportKey {
        &self.key
    }
}

impl<T> Drop for BuildGuard<T> {
    fn drop(&mut self) {
        let mut slots = self
            .cache
            .inner
            .slots
            .lock()
            .expect("report cache lock poisoned");
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.in_progress = false;
            if slot.stored.is_none() {
                slots.remove(&self.key);
            }
        }
        drop(slots);
        self.cache.inner.build_done.notify_waiters();
    }
}
