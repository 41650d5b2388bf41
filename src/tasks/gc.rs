//! Garbage Collection Task
//!
//! Background task that periodically removes entries whose retention window
//! has elapsed with no observers.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;

/// Shortest sweep interval; smaller values are raised to this.
pub const MIN_GC_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a background task that sweeps `cache` every `interval`.
///
/// Eviction precision is bounded by `interval`: an entry is removed on the
/// first sweep after its deadline.
///
/// # Arguments
/// * `cache` - Handle to the cache to sweep
/// * `interval` - Time between sweeps, at least [`MIN_GC_INTERVAL`]
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let client = QueryClient::default();
/// let gc_handle = spawn_gc_task(client.get_query_cache().clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// gc_handle.abort();
/// ```
pub fn spawn_gc_task(cache: QueryCache, interval: Duration) -> JoinHandle<()> {
    if interval < MIN_GC_INTERVAL {
        warn!(
            "GC interval of {:?} is too short, using {:?}",
            interval, MIN_GC_INTERVAL
        );
    }
    let interval = interval.max(MIN_GC_INTERVAL);

    tokio::spawn(async move {
        info!(
            "Starting GC task for cache {} with interval of {}ms",
            cache.id(),
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.collect_garbage();
            if removed > 0 {
                info!("GC: removed {} entries from cache {}", removed, cache.id());
            } else {
                debug!("GC: no entries eligible in cache {}", cache.id());
            }
        }
    })
}
