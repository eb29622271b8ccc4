use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::data::PriceFrame;
use crate::market::{FetchError, FetchRequest, MarketDataSource};

#[derive(Debug)]
struct CacheEntry {
    frame: PriceFrame,
    fetched_at: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Read-through cache in front of another source.
///
/// Entries are keyed by ticker and date window and expire after `ttl`. Each
/// key has its own slot lock, so concurrent misses on one key trigger a single
/// upstream fetch while other keys stay independent. Failures are not stored.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    slots: DashMap<FetchRequest, Slot>,
}

impl<S: MarketDataSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of keys currently holding a fresh frame.
    pub fn fresh_entries(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.value()
                    .lock()
                    .as_ref()
                    .is_some_and(|entry| entry.fetched_at.elapsed() < self.ttl)
            })
            .count()
    }

    fn slot(&self, request: &FetchRequest) -> Slot {
        // Clone the handle so the shard lock is released before fetching.
        self.slots.entry(request.clone()).or_default().value().clone()
    }

    /// Drop expired entries. Slots locked by an in-flight fetch are left alone.
    fn evict_expired(&self) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot.try_lock() {
            Some(entry) => entry
                .as_ref()
                .map_or(true, |entry| entry.fetched_at.elapsed() < self.ttl),
            None => true,
        });
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, "expired cache entries dropped");
        }
    }
}

impl<S: MarketDataSource> MarketDataSource for CachedSource<S> {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame, FetchError> {
        let slot = self.slot(request);
        let mut entry = slot.lock();

        if let Some(cached) = entry.as_ref() {
            let age = cached.fetched_at.elapsed();
            if age < self.ttl {
                debug!(%request, age_secs = age.as_secs(), "cache hit");
                return Ok(cached.frame.clone());
            }
            debug!(%request, "cache entry expired");
        }

        let frame = match self.inner.fetch(request) {
            Ok(frame) => frame,
            Err(err) => {
                *entry = None;
                self.slots
                    .remove_if(request, |_, current| Arc::ptr_eq(current, &slot));
                return Err(err);
            }
        };
        *entry = Some(CacheEntry {
            frame: frame.clone(),
            fetched_at: Instant::now(),
        });
        self.evict_expired();
        Ok(frame)
    }
}
