//! Scope Module
//!
//! Provider/consumer binding of clients to consumer subtrees, and the
//! observers consumers use to follow an entry.

mod binding;
mod observer;

pub use binding::{use_query_client, QueryClientProvider, Scope};
pub use observer::{use_query, QueryObserver, UseQueryOptions};
