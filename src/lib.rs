//! Query Cache - A client-scoped cache for async query results
//!
//! Entries are addressed by structured keys compared by content, owned by a
//! per-client cache, and reached by consumers through scoped client bindings.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod scope;
pub mod tasks;

#[doc(hidden)]
pub use serde_json;

pub use cache::{query_fn, QueryCache, QueryKey};
pub use client::{QueryClient, QueryClientConfig};
pub use config::Config;
pub use error::{ProducerError, QueryError};
pub use scope::{use_query, use_query_client, QueryClientProvider, Scope, UseQueryOptions};
pub use tasks::spawn_gc_task;
