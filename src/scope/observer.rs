//! Query Observer Module
//!
//! Consumer-side subscription to a single entry, created through [`use_query`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::cache::{Query, QueryFn, QueryKey};
use crate::client::QueryClient;
use crate::error::{QueryError, Result};
use crate::models::{GcTime, PartialQueryOptions, QueryState, QueryStatus};
use crate::scope::Scope;

// == Use Query Options ==
/// What a consumer asks for: a key, its producer, and option overrides.
#[derive(Clone)]
pub struct UseQueryOptions {
    pub query_key: QueryKey,
    pub query_fn: QueryFn,
    pub options: PartialQueryOptions,
}

impl UseQueryOptions {
    pub fn new(query_key: QueryKey, query_fn: QueryFn) -> Self {
        Self {
            query_key,
            query_fn,
            options: PartialQueryOptions::default(),
        }
    }

    pub fn with_gc_time(mut self, gc_time: GcTime) -> Self {
        self.options.gc_time = Some(gc_time);
        self
    }

    pub fn with_stale_time(mut self, stale_time: std::time::Duration) -> Self {
        self.options.stale_time = Some(stale_time);
        self
    }
}

// == Query Observer ==
/// A live consumer of one entry.
///
/// Keeps the entry from being garbage collected while alive.
#[derive(Debug)]
pub struct QueryObserver {
    client: QueryClient,
    query: Arc<Query>,
    state: watch::Receiver<QueryState>,
}

impl QueryObserver {
    /// Wraps an entry that already counts this observer.
    fn new(client: QueryClient, query: Arc<Query>) -> Self {
        let state = query.subscribe();

        Self {
            client,
            query,
            state,
        }
    }

    /// The client this observer was resolved against.
    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// Returns the latest observed state.
    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> QueryStatus {
        self.state.borrow().status
    }

    pub fn data(&self) -> Option<Value> {
        self.state.borrow().data.clone()
    }

    /// Returns the latest data decoded as `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.data()
            .map(serde_json::from_value)
            .transpose()
            .map_err(QueryError::from)
    }

    /// Waits for the next state change and returns the new state.
    pub async fn changed(&mut self) -> Result<QueryState> {
        self.state
            .changed()
            .await
            .map_err(|_| QueryError::Detached(self.query.query_hash().to_string()))?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Waits until the entry holds a terminal result with no fetch running.
    pub async fn settled(&self) -> Result<QueryState> {
        self.query.settled().await
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.query.remove_observer();
    }
}

// == Use Query ==
/// Subscribes a consumer to the entry for `options.query_key`.
///
/// The client is resolved from `scope` before anything else happens, so a
/// missing provider fails without touching any cache or running the producer.
/// The producer is started if the entry has never produced a result and no
/// fetch is in flight; concurrent consumers of one key share that fetch.
///
/// # Errors
/// * [`QueryError::MissingClient`] - no provider encloses `scope`
/// * [`QueryError::NoRuntime`] - a fetch is needed but no tokio runtime is running
pub fn use_query(scope: &Scope, options: UseQueryOptions) -> Result<QueryObserver> {
    let client = scope.client()?;
    let query = client.observe_query(options.query_key, &options.options);
    let observer = QueryObserver::new(client, query);

    if observer.query.state().is_pending() {
        observer.query.fetch(options.query_fn)?;
    }

    Ok(observer)
}
