//! Producer Module
//!
//! The injected async producer that computes an entry's value.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::cache::QueryKey;
use crate::error::ProducerError;

/// Context handed to a query function on each invocation.
#[derive(Debug, Clone)]
pub struct QueryFnContext {
    pub query_key: QueryKey,
}

/// Type-erased async producer for an entry's value.
pub type QueryFn =
    Arc<dyn Fn(QueryFnContext) -> BoxFuture<'static, Result<Value, ProducerError>> + Send + Sync>;

/// Wraps an async closure returning any serializable value into a [`QueryFn`].
///
/// ```ignore
/// let fetch_user = query_fn(|ctx| async move {
///     Ok::<_, ProducerError>(format!("user for {}", ctx.query_key))
/// });
/// ```
pub fn query_fn<F, Fut, T>(f: F) -> QueryFn
where
    F: Fn(QueryFnContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProducerError>> + Send + 'static,
    T: Serialize,
{
    Arc::new(move |context| {
        f(context)
            .map(|result| result.and_then(|value| Ok(serde_json::to_value(value)?)))
            .boxed()
    })
}
