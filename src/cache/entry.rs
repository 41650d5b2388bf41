//! Query Entry Module
//!
//! A single cached unit: key, effective options, and observable state, plus
//! the driver that runs the producer and applies state transitions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheEvent, NormalizedKey, QueryFn, QueryFnContext, QueryKey};
use crate::error::{ProducerError, QueryError, Result};
use crate::models::{FetchStatus, QueryOptions, QueryState};

// == Query ==
/// A cache entry.
///
/// Options are fixed when the entry is created. State lives in a watch
/// channel so every transition is applied in one step and observers are
/// woken on change.
#[derive(Debug)]
pub struct Query {
    query_key: QueryKey,
    query_hash: NormalizedKey,
    options: QueryOptions,
    state: watch::Sender<QueryState>,
    /// Number of live observers
    observers: AtomicUsize,
    created_at: Instant,
    /// Last access, in nanoseconds since `created_at`
    last_access_nanos: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
}

impl Query {
    // == Constructor ==
    /// Creates a pending entry.
    ///
    /// # Arguments
    /// * `query_key` - The original key
    /// * `query_hash` - The normalized form of `query_key`
    /// * `options` - Effective options for the entry's lifetime
    /// * `events` - Channel of the owning cache, notified on state changes
    pub(crate) fn new(
        query_key: QueryKey,
        query_hash: NormalizedKey,
        options: QueryOptions,
        events: broadcast::Sender<CacheEvent>,
    ) -> Self {
        let (state, _) = watch::channel(QueryState::pending());

        Self {
            query_key,
            query_hash,
            options,
            state,
            observers: AtomicUsize::new(0),
            created_at: Instant::now(),
            last_access_nanos: AtomicU64::new(0),
            events,
        }
    }

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    pub fn query_hash(&self) -> &NormalizedKey {
        &self.query_hash
    }

    /// Effective options merged at creation time.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Returns the cached value, if the entry is in the success state.
    pub fn data(&self) -> Option<Value> {
        self.state.borrow().data.clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    // == Staleness ==
    /// Returns true if the entry has no data or its data is older than `stale_time`.
    pub fn is_stale(&self) -> bool {
        match self.state.borrow().data_updated_at {
            Some(updated) => (Utc::now() - updated)
                .to_std()
                .map(|age| age >= self.options.stale_time)
                .unwrap_or(false),
            None => true,
        }
    }

    // == Fetch ==
    /// Starts the producer unless a fetch is already in flight.
    ///
    /// Returns `true` if this call started the fetch and `false` if it joined
    /// an existing one. The producer runs on the current tokio runtime and is
    /// not cancelled when callers lose interest.
    ///
    /// # Errors
    /// Returns [`QueryError::NoRuntime`] without touching the entry when called
    /// outside a tokio runtime.
    pub fn fetch(self: &Arc<Self>, query_fn: QueryFn) -> Result<bool> {
        let runtime = Handle::try_current().map_err(|_| QueryError::NoRuntime)?;

        let claimed = self.state.send_if_modified(|state| {
            if state.is_fetching() {
                return false;
            }
            state.fetch_status = FetchStatus::Fetching;
            state.fetch_count += 1;
            true
        });

        if !claimed {
            debug!("Joining in-flight fetch for {}", self.query_hash);
            return Ok(false);
        }

        debug!("Starting fetch for {}", self.query_hash);
        self.notify();

        let query = Arc::clone(self);
        let context = QueryFnContext {
            query_key: self.query_key.clone(),
        };

        // The producer is invoked inside the inner task so a panic while
        // building its future surfaces as a JoinError too.
        let producer = runtime.spawn(async move { query_fn(context).await });
        runtime.spawn(async move {
            let outcome = match producer.await {
                Ok(result) => result,
                Err(join_err) => Err(ProducerError::new(format!(
                    "query function did not complete: {}",
                    join_err
                ))),
            };
            query.settle(outcome);
        });

        Ok(true)
    }

    /// Applies the producer's outcome and releases the fetch slot.
    fn settle(&self, outcome: std::result::Result<Value, ProducerError>) {
        match &outcome {
            Ok(_) => debug!("Fetch succeeded for {}", self.query_hash),
            Err(err) => warn!("Fetch failed for {}: {}", self.query_hash, err),
        }

        self.state.send_modify(|state| {
            match outcome {
                Ok(data) => state.resolve(data),
                Err(err) => state.reject(err),
            }
            state.fetch_status = FetchStatus::Idle;
        });
        self.notify();
    }

    // == Set Data ==
    /// Writes a value directly, moving the entry to the success state.
    pub fn set_data(&self, data: Value) {
        self.state.send_modify(|state| state.resolve(data));
        self.notify();
    }

    // == Settled ==
    /// Waits until the entry holds a terminal result with no fetch running.
    ///
    /// Never resolves for a pending entry nobody fetches.
    pub async fn settled(&self) -> Result<QueryState> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(QueryState::is_settled)
            .await
            .map_err(|_| QueryError::Detached(self.query_hash.to_string()))?;
        Ok(state.clone())
    }

    // == Observers ==
    pub fn observer_count(&self) -> usize {
        self.observers.load(Ordering::Acquire)
    }

    pub(crate) fn add_observer(&self) {
        self.observers.fetch_add(1, Ordering::AcqRel);
        self.touch();
    }

    pub(crate) fn remove_observer(&self) {
        let _ = self
            .observers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        self.touch();
    }

    // == Garbage Collection ==
    /// Resets the retention deadline.
    pub(crate) fn touch(&self) {
        let elapsed = u64::try_from(self.created_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_access_nanos.fetch_max(elapsed, Ordering::AcqRel);
    }

    /// Returns true if the entry may be removed at `now`.
    ///
    /// Requires no observers, no fetch in flight, a finite `gc_time`, and a
    /// full `gc_time` elapsed since the last access.
    pub fn is_eligible_for_gc(&self, now: Instant) -> bool {
        let Some(gc_time) = self.options.gc_time.as_duration() else {
            return false;
        };
        if self.observer_count() > 0 || self.state.borrow().is_fetching() {
            return false;
        }

        let last_access = self.created_at
            + Duration::from_nanos(self.last_access_nanos.load(Ordering::Acquire));
        now >= last_access + gc_time
    }

    fn notify(&self) {
        let _ = self.events.send(CacheEvent::Updated(self.query_hash.clone()));
    }
}
