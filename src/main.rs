//! Query Cache demo
//!
//! Binds two clients to sibling scopes, renders one consumer under each, and
//! reports which cache ended up holding which entry.

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::{
    query_fn, query_key, spawn_gc_task, use_query, Config, ProducerError, QueryClient,
    QueryClientProvider, Scope, UseQueryOptions,
};

/// Entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create two clients, each with its own cache, and start their GC tasks
/// 4. Render a consumer under each provider and wait for both fetches
/// 5. Print where each entry landed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: gc_time={}, stale_time={}ms, gc_interval={}ms",
        config.default_gc_time,
        config.default_stale_time.as_millis(),
        config.gc_interval.as_millis()
    );

    let client1 = QueryClient::from_config(&config);
    let client2 = QueryClient::from_config(&config);
    let gc_handles = [
        spawn_gc_task(client1.get_query_cache().clone(), config.gc_interval),
        spawn_gc_task(client2.get_query_cache().clone(), config.gc_interval),
    ];

    let key1 = query_key!["demo", { "page": 1 }];
    let key2 = query_key!["demo", { "page": 2 }];

    let root = Scope::root();
    let page1 = QueryClientProvider::new(client1.clone()).render(&root, |scope| {
        use_query(scope, UseQueryOptions::new(key1.clone(), delayed("test1")))
    })?;
    let page2 = QueryClientProvider::new(client2.clone()).render(&root, |scope| {
        use_query(scope, UseQueryOptions::new(key2.clone(), delayed("test2")))
    })?;

    let state1 = page1.settled().await.context("waiting for page 1")?;
    let state2 = page2.settled().await.context("waiting for page 2")?;
    info!("Page 1 rendered: {}", serde_json::to_string(&state1)?);
    info!("Page 2 rendered: {}", serde_json::to_string(&state2)?);

    for (name, client) in [("cache1", &client1), ("cache2", &client2)] {
        let cache = client.get_query_cache();
        info!(
            "{}: key1 present={}, key2 present={}, stats={}",
            name,
            cache.find(&key1).is_some(),
            cache.find(&key2).is_some(),
            serde_json::to_string(&cache.stats())?
        );
    }

    if let Err(err) = use_query(&root, UseQueryOptions::new(key1, delayed("unbound"))) {
        info!("Consumer outside any provider: {}", err);
    }

    for handle in gc_handles {
        handle.abort();
    }
    info!("Demo complete");
    Ok(())
}

fn delayed(value: &'static str) -> query_cache::cache::QueryFn {
    query_fn(move |_| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, ProducerError>(value)
    })
}
