//! Cache Module
//!
//! Provides the key-addressed query cache: key normalization, entries with
//! single-flight fetching, and the concurrent store that owns them.

mod entry;
mod key;
mod producer;
mod stats;
mod store;


// Re-export public types
pub use entry::Query;
pub use key::{hash_query_key, NormalizedKey, QueryKey};
pub use producer::{query_fn, QueryFn, QueryFnContext};
pub use stats::CacheStats;
pub use store::{CacheEvent, QueryCache};
