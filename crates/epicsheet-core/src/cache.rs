//! Time-bounded memo of the merged read view.
//!
//! One global snapshot, not per query. Writes anywhere in the store call
//! [`SnapshotCache::invalidate`] before returning so the next read refetches.
//!
//! Readers take a [`SnapshotCache::generation`] before touching the backend
//! and hand it back to [`SnapshotCache::put`]. An invalidation in between
//! bumps the generation, and the late snapshot is returned to its reader
//! without being stored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::model::SheetData;

#[derive(Debug)]
struct Slot {
    generation: u64,
    entry: Option<(Instant, Arc<SheetData>)>,
}

#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    slot: Mutex<Slot>,
}

impl SnapshotCache {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot {
                generation: 0,
                entry: None,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached snapshot, if one was stored less than `ttl` ago.
    #[must_use]
    pub fn get(&self) -> Option<Arc<SheetData>> {
        self.get_at(Instant::now())
    }

    fn get_at(&self, now: Instant) -> Option<Arc<SheetData>> {
        let slot = self.slot();
        let (fetched_at, data) = slot.entry.as_ref()?;
        if now.saturating_duration_since(*fetched_at) < self.ttl {
            trace!("snapshot cache hit");
            Some(Arc::clone(data))
        } else {
            None
        }
    }

    /// Token for a read that is about to start.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot().generation
    }

    /// Store `data` if nothing invalidated the cache since `generation` was
    /// taken. The snapshot is returned either way.
    pub fn put(&self, generation: u64, data: SheetData) -> Arc<SheetData> {
        let data = Arc::new(data);
        let mut slot = self.slot();
        if slot.generation == generation {
            slot.entry = Some((Instant::now(), Arc::clone(&data)));
        } else {
            debug!(
                read = generation,
                current = slot.generation,
                "snapshot outdated by a write, not caching"
            );
        }
        data
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot();
        slot.generation = slot.generation.wrapping_add(1);
        if slot.entry.take().is_some() {
            trace!("snapshot cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_misses() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
    }

    #[test]
    fn hit_within_ttl_returns_same_snapshot() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let stored = cache.put(cache.generation(), SheetData::default());
        let hit = cache.get().expect("hit");
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = SnapshotCache::new(Duration::from_millis(50));
        cache.put(cache.generation(), SheetData::default());
        let later = Instant::now() + Duration::from_millis(51);
        assert!(cache.get_at(later).is_none());
    }

    #[test]
    fn zero_ttl_never_hits() {
        let cache = SnapshotCache::new(Duration::ZERO);
        cache.put(cache.generation(), SheetData::default());
        assert!(cache.get().is_none());
    }

    #[test]
    fn invalidate_clears_immediately() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        cache.put(cache.generation(), SheetData::default());
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn invalidate_advances_generation() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let before = cache.generation();
        cache.invalidate();
        assert_ne!(cache.generation(), before);
    }

    #[test]
    fn put_after_invalidate_is_not_stored() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let started = cache.generation();
        cache.invalidate();
        let returned = cache.put(started, SheetData::default());
        assert!(returned.epics.is_empty());
        assert!(cache.get().is_none());

        cache.put(cache.generation(), SheetData::default());
        assert!(cache.get().is_some());
    }
}
