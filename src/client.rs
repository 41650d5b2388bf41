//! Query Client Module
//!
//! Wraps exactly one [`QueryCache`] together with default options that are
//! merged into every entry created through the client.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cache::{Query, QueryCache, QueryFn, QueryKey};
use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::models::{DefaultOptions, PartialQueryOptions, QueryOptions, QueryState};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

// == Client Config ==
/// Construction options for a [`QueryClient`].
#[derive(Debug, Clone, Default)]
pub struct QueryClientConfig {
    /// Cache to use; a fresh private cache is created when omitted
    pub query_cache: Option<QueryCache>,
    pub default_options: DefaultOptions,
}

impl QueryClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given cache instead of a private one.
    pub fn with_query_cache(mut self, query_cache: QueryCache) -> Self {
        self.query_cache = Some(query_cache);
        self
    }

    /// Sets the default options.
    pub fn with_default_options(mut self, default_options: DefaultOptions) -> Self {
        self.default_options = default_options;
        self
    }
}

// == Query Client ==
/// Entry point for building and fetching queries against one cache.
///
/// A cheap handle: clones refer to the same client.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    id: u64,
    query_cache: QueryCache,
    default_options: RwLock<DefaultOptions>,
}

impl QueryClient {
    // == Constructor ==
    /// Creates a client from `config`.
    pub fn new(config: QueryClientConfig) -> Self {
        let query_cache = config.query_cache.unwrap_or_default();
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Client {} created with cache {}", id, query_cache.id());

        Self {
            inner: Arc::new(ClientInner {
                id,
                query_cache,
                default_options: RwLock::new(config.default_options),
            }),
        }
    }

    /// Creates a client with a private cache and defaults taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(QueryClientConfig::new().with_default_options(config.default_options()))
    }

    /// Process-unique identifier of this client, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true if both handles refer to the same client.
    pub fn ptr_eq(&self, other: &QueryClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the cache this client addresses.
    pub fn get_query_cache(&self) -> &QueryCache {
        &self.inner.query_cache
    }

    // == Default Options ==
    pub fn default_options(&self) -> DefaultOptions {
        self.inner
            .default_options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the default options. Existing entries keep their options.
    pub fn set_default_options(&self, default_options: DefaultOptions) {
        *self
            .inner
            .default_options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = default_options;
    }

    /// Merges the client defaults under `options` and fills the rest from the
    /// built-in baseline.
    pub fn default_query_options(&self, options: &PartialQueryOptions) -> QueryOptions {
        self.default_options().queries.merge(options).resolve()
    }

    // == Build ==
    /// Returns the entry for `query_key`, creating it with merged options if absent.
    pub fn build_query(&self, query_key: QueryKey, options: &PartialQueryOptions) -> Arc<Query> {
        let options = self.default_query_options(options);
        self.inner.query_cache.find_or_create(query_key, options)
    }

    /// Like [`build_query`](Self::build_query), with an observer registered
    /// on the entry before it is returned.
    pub(crate) fn observe_query(&self, query_key: QueryKey, options: &PartialQueryOptions) -> Arc<Query> {
        let options = self.default_query_options(options);
        self.inner.query_cache.observe(query_key, options)
    }

    // == Fetch ==
    /// Returns the entry's data, fetching it when missing or stale.
    ///
    /// Concurrent callers for the same key share one producer run. A producer
    /// failure is returned as [`QueryError::Fetch`] and also stored in the entry.
    /// Outside a tokio runtime the entry is left untouched and
    /// [`QueryError::NoRuntime`] is returned.
    pub async fn fetch_query(
        &self,
        query_key: QueryKey,
        options: &PartialQueryOptions,
        query_fn: QueryFn,
    ) -> Result<Value> {
        let query = self.build_query(query_key, options);

        let state = query.state();
        if state.is_success() && !state.is_fetching() && !query.is_stale() {
            if let Some(data) = state.data {
                return Ok(data);
            }
        }

        query.fetch(query_fn)?;
        let state = query.settled().await?;
        match (state.data, state.error) {
            (Some(data), _) => Ok(data),
            (None, Some(err)) => Err(QueryError::Fetch(err)),
            (None, None) => Err(QueryError::Detached(query.query_hash().to_string())),
        }
    }

    /// Like [`fetch_query`](Self::fetch_query) but only warms the cache.
    pub async fn prefetch_query(
        &self,
        query_key: QueryKey,
        options: &PartialQueryOptions,
        query_fn: QueryFn,
    ) {
        let _ = self.fetch_query(query_key, options, query_fn).await;
    }

    // == Data Access ==
    /// Returns the cached value for `query_key`, if any.
    pub fn get_query_data(&self, query_key: &QueryKey) -> Option<Value> {
        self.inner.query_cache.find(query_key)?.data()
    }

    /// Returns the cached value decoded as `T`.
    pub fn get_query_data_as<T: DeserializeOwned>(&self, query_key: &QueryKey) -> Result<Option<T>> {
        self.get_query_data(query_key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(QueryError::from)
    }

    /// Writes a value for `query_key`, creating the entry with default options if needed.
    pub fn set_query_data(&self, query_key: QueryKey, data: Value) -> Arc<Query> {
        let query = self.build_query(query_key, &PartialQueryOptions::default());
        query.set_data(data);
        query
    }

    pub fn get_query_state(&self, query_key: &QueryKey) -> Option<QueryState> {
        self.inner.query_cache.find(query_key).map(|query| query.state())
    }

    // == Removal ==
    /// Removes every entry whose key partially matches `filter`.
    pub fn remove_queries(&self, filter: &QueryKey) -> usize {
        self.inner.query_cache.remove_matching(filter)
    }

    /// Removes every entry from the cache.
    pub fn clear(&self) {
        self.inner.query_cache.clear();
    }

    /// Number of entries with a fetch in flight.
    pub fn is_fetching(&self) -> usize {
        self.inner
            .query_cache
            .find_all(None)
            .iter()
            .filter(|query| query.state().is_fetching())
            .count()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryClientConfig::default())
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("id", &self.inner.id)
            .field("query_cache", &self.inner.query_cache)
            .finish()
    }
}
