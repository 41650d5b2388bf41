//! Cache Store Module
//!
//! Concurrent map from normalized query keys to entries, with atomic
//! find-or-create and time-based garbage collection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::stats::StatsCounters;
use crate::cache::{CacheStats, NormalizedKey, Query, QueryKey};
use crate::models::QueryOptions;

/// Capacity of the cache event channel; slow subscribers observe `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

// == Cache Event ==
/// Notification emitted when the set of entries or an entry's state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Added(NormalizedKey),
    Updated(NormalizedKey),
    Removed(NormalizedKey),
}

// == Query Cache ==
/// Mapping from normalized keys to entries.
///
/// A cheap handle: clones address the same store. Independently constructed
/// caches never share entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    id: u64,
    queries: DashMap<NormalizedKey, Arc<Query>>,
    stats: StatsCounters,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    // == Constructor ==
    /// Creates a new, empty cache with its own identity.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(CacheInner {
                id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
                queries: DashMap::new(),
                stats: StatsCounters::default(),
                events,
            }),
        }
    }

    /// Process-unique identifier of this cache, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true if both handles address the same cache.
    pub fn ptr_eq(&self, other: &QueryCache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // == Find ==
    /// Returns the entry for `query_key`, if present.
    ///
    /// Inspection only: does not count as an access for garbage collection.
    pub fn find(&self, query_key: &QueryKey) -> Option<Arc<Query>> {
        self.find_by_hash(&query_key.hash())
    }

    /// Returns the entry for an already-normalized key, if present.
    pub fn find_by_hash(&self, query_hash: &NormalizedKey) -> Option<Arc<Query>> {
        self.inner
            .queries
            .get(query_hash)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns every entry whose key partially matches `filter`, or all
    /// entries when no filter is given.
    pub fn find_all(&self, filter: Option<&QueryKey>) -> Vec<Arc<Query>> {
        self.inner
            .queries
            .iter()
            .filter(|entry| filter.map_or(true, |prefix| entry.query_key().partially_matches(prefix)))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    // == Find Or Create ==
    /// Returns the entry for `query_key`, creating a pending one if absent.
    ///
    /// An existing entry is returned unchanged; `options` only apply to a
    /// newly created entry. Concurrent calls for the same key observe a single
    /// entry.
    ///
    /// # Arguments
    /// * `query_key` - The key to look up
    /// * `options` - Effective options for a newly created entry
    pub fn find_or_create(&self, query_key: QueryKey, options: QueryOptions) -> Arc<Query> {
        self.find_or_create_with(query_key, options, Query::touch)
    }

    /// Like [`find_or_create`](Self::find_or_create), but registers an
    /// observer before the entry becomes visible to a garbage collection sweep.
    pub(crate) fn observe(&self, query_key: QueryKey, options: QueryOptions) -> Arc<Query> {
        self.find_or_create_with(query_key, options, Query::add_observer)
    }

    /// Runs `on_access` while the entry's shard is still locked, so a
    /// concurrent `collect_garbage` sees the access or runs before it.
    fn find_or_create_with(
        &self,
        query_key: QueryKey,
        options: QueryOptions,
        on_access: impl FnOnce(&Query),
    ) -> Arc<Query> {
        let query_hash = query_key.hash();

        let (query, created) = match self.inner.queries.entry(query_hash.clone()) {
            Entry::Occupied(occupied) => {
                let query = Arc::clone(occupied.get());
                on_access(&query);
                (query, false)
            }
            Entry::Vacant(vacant) => {
                let query = Arc::new(Query::new(
                    query_key,
                    query_hash.clone(),
                    options,
                    self.inner.events.clone(),
                ));
                on_access(&query);
                vacant.insert(Arc::clone(&query));
                (query, true)
            }
        };

        if created {
            self.inner.stats.record_miss();
            debug!("Cache {}: created entry {}", self.inner.id, query_hash);
            let _ = self.inner.events.send(CacheEvent::Added(query_hash));
        } else {
            self.inner.stats.record_hit();
        }

        query
    }

    // == Remove ==
    /// Removes the entry for `query_hash`. Returns false if it was absent.
    pub fn remove(&self, query_hash: &NormalizedKey) -> bool {
        if self.inner.queries.remove(query_hash).is_some() {
            self.record_removed(query_hash.clone());
            true
        } else {
            false
        }
    }

    /// Removes every entry whose key partially matches `filter`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_matching(&self, filter: &QueryKey) -> usize {
        self.find_all(Some(filter))
            .iter()
            .filter(|query| self.remove(query.query_hash()))
            .count()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let keys: Vec<NormalizedKey> = self
            .inner
            .queries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            self.remove(&key);
        }
    }

    // == Collect Garbage ==
    /// Removes all entries whose retention window has elapsed.
    ///
    /// Returns the number of entries removed.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut removed = Vec::new();

        self.inner.queries.retain(|key, query| {
            if query.is_eligible_for_gc(now) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });

        let count = removed.len();
        for key in removed {
            self.record_removed(key);
        }
        count
    }

    // == Subscribe ==
    /// Subscribes to entry lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.len())
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.inner.queries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.queries.is_empty()
    }

    fn record_removed(&self, query_hash: NormalizedKey) {
        self.inner.stats.record_removals(1);
        debug!("Cache {}: removed entry {}", self.inner.id, query_hash);
        let _ = self.inner.events.send(CacheEvent::Removed(query_hash));
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("id", &self.inner.id)
            .field("entries", &self.len())
            .finish()
    }
}
