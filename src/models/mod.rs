//! Models Module
//!
//! Option and state types shared by the cache, client, and consumers.

mod options;
mod state;

pub use options::{
    DefaultOptions, GcTime, PartialQueryOptions, QueryOptions, DEFAULT_GC_TIME,
    DEFAULT_STALE_TIME,
};
pub use state::{FetchStatus, QueryState, QueryStatus};
