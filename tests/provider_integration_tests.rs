//! Integration Tests for Client Providers
//!
//! Drives consumers through provider scopes on a paused clock and inspects
//! the caches they populated.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use query_cache::cache::{QueryFn, QueryKey};
use query_cache::models::{DefaultOptions, GcTime, PartialQueryOptions, QueryStatus};
use query_cache::{
    query_fn, spawn_gc_task, use_query, use_query_client, ProducerError, QueryCache,
    QueryClient, QueryClientConfig, QueryClientProvider, QueryError, Scope, UseQueryOptions,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn sleep_then(value: &'static str) -> QueryFn {
    query_fn(move |_| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, ProducerError>(value)
    })
}

fn counting(calls: Arc<AtomicU32>, value: &'static str) -> QueryFn {
    query_fn(move |_| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ProducerError>(value)
        }
    })
}

fn client_with_cache(cache: &QueryCache) -> QueryClient {
    QueryClient::new(QueryClientConfig::new().with_query_cache(cache.clone()))
}

fn unique_key(name: &str) -> QueryKey {
    static NEXT: AtomicU32 = AtomicU32::new(0);
    QueryKey::new(vec![json!(name), json!(NEXT.fetch_add(1, Ordering::Relaxed))])
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// == Provider Scenarios ==

#[tokio::test(start_paused = true)]
async fn test_sets_a_specific_cache_for_all_queries() {
    let key = unique_key("specific");
    let query_cache = QueryCache::new();
    let client = client_with_cache(&query_cache);

    let page = QueryClientProvider::new(client).render(&Scope::root(), |scope| {
        use_query(scope, UseQueryOptions::new(key.clone(), sleep_then("test")))
    });
    let page = assert_ok!(page);

    advance(11).await;
    let state = assert_ok!(page.settled().await);
    assert_eq!(state.data, Some(json!("test")));

    assert!(query_cache.find(&key).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_allows_multiple_caches_to_be_partitioned() {
    let key1 = unique_key("partition");
    let key2 = unique_key("partition");

    let query_cache1 = QueryCache::new();
    let query_cache2 = QueryCache::new();
    let client1 = client_with_cache(&query_cache1);
    let client2 = client_with_cache(&query_cache2);

    let root = Scope::root();
    let page1 = QueryClientProvider::new(client1).render(&root, |scope| {
        use_query(scope, UseQueryOptions::new(key1.clone(), sleep_then("test1")))
    });
    let page2 = QueryClientProvider::new(client2).render(&root, |scope| {
        use_query(scope, UseQueryOptions::new(key2.clone(), sleep_then("test2")))
    });
    let (page1, page2) = (assert_ok!(page1), assert_ok!(page2));

    advance(11).await;
    assert_eq!(assert_ok!(page1.settled().await).data, Some(json!("test1")));
    assert_eq!(assert_ok!(page2.settled().await).data, Some(json!("test2")));

    assert!(query_cache1.find(&key1).is_some());
    assert!(query_cache1.find(&key2).is_none());
    assert!(query_cache2.find(&key1).is_none());
    assert!(query_cache2.find(&key2).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_uses_default_options_when_query_has_none() {
    let key = unique_key("defaults");
    let query_cache = QueryCache::new();
    let client = QueryClient::new(
        QueryClientConfig::new()
            .with_query_cache(query_cache.clone())
            .with_default_options(DefaultOptions::with_queries(
                PartialQueryOptions::new().with_gc_time(GcTime::Infinite),
            )),
    );

    let page = QueryClientProvider::new(client).render(&Scope::root(), |scope| {
        use_query(scope, UseQueryOptions::new(key.clone(), sleep_then("test")))
    });
    let page = assert_ok!(page);

    advance(11).await;
    assert_eq!(assert_ok!(page.settled().await).data, Some(json!("test")));

    let query = query_cache.find(&key).expect("entry should exist");
    assert_eq!(query.options().gc_time, GcTime::Infinite);
}

#[tokio::test(start_paused = true)]
async fn test_caller_options_override_defaults() {
    let key = unique_key("override");
    let query_cache = QueryCache::new();
    let client = QueryClient::new(
        QueryClientConfig::new()
            .with_query_cache(query_cache.clone())
            .with_default_options(DefaultOptions::with_queries(
                PartialQueryOptions::new().with_gc_time(GcTime::Infinite),
            )),
    );
    let scope = Scope::root().with_client(client);

    let _page = assert_ok!(use_query(
        &scope,
        UseQueryOptions::new(key.clone(), sleep_then("test")).with_gc_time(GcTime::from_millis(25)),
    ));

    let query = query_cache.find(&key).expect("entry should exist");
    assert_eq!(query.options().gc_time, GcTime::from_millis(25));
}

// == Client Resolution ==

#[test]
fn test_use_query_client_without_provider_fails() {
    let err = assert_err!(use_query_client(&Scope::root()));
    assert_eq!(
        err.to_string(),
        "No QueryClient set, use QueryClientProvider to set one"
    );
}

#[tokio::test]
async fn test_use_query_without_provider_aborts_before_side_effects() {
    let calls = Arc::new(AtomicU32::new(0));

    let result = use_query(
        &Scope::root(),
        UseQueryOptions::new(unique_key("unbound"), counting(calls.clone(), "never")),
    );

    assert!(matches!(result, Err(QueryError::MissingClient)));
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_nested_provider_shadows_outer_provider() {
    let key = unique_key("nested");
    let outer_cache = QueryCache::new();
    let inner_cache = QueryCache::new();
    let outer = client_with_cache(&outer_cache);
    let inner = client_with_cache(&inner_cache);

    let root = Scope::root();
    let page = QueryClientProvider::new(outer.clone()).render(&root, |outer_scope| {
        let resolved_outer = assert_ok!(use_query_client(outer_scope));
        assert!(resolved_outer.ptr_eq(&outer));

        let page = QueryClientProvider::new(inner.clone()).render(outer_scope, |inner_scope| {
            use_query(inner_scope, UseQueryOptions::new(key.clone(), sleep_then("inner")))
        });

        let after_inner = assert_ok!(use_query_client(outer_scope));
        assert!(after_inner.ptr_eq(&outer));
        page
    });
    let page = assert_ok!(page);

    assert_ok!(page.settled().await);
    assert!(page.client().ptr_eq(&inner));
    assert!(inner_cache.find(&key).is_some());
    assert!(outer_cache.find(&key).is_none());
}

// == Lifecycle ==

#[tokio::test(start_paused = true)]
async fn test_concurrent_consumers_share_one_producer_run() {
    let key = unique_key("shared");
    let calls = Arc::new(AtomicU32::new(0));
    let client = QueryClient::default();
    let scope = Scope::root().with_client(client.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scope = scope.clone();
            let key = key.clone();
            let query_fn = counting(calls.clone(), "once");
            tokio::spawn(async move {
                let page = use_query(&scope, UseQueryOptions::new(key, query_fn))?;
                page.settled().await
            })
        })
        .collect();

    for handle in handles {
        let state = assert_ok!(assert_ok!(handle.await));
        assert_eq!(state.data, Some(json!("once")));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_query_cache().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_across_threads_coalesce() {
    let key = unique_key("threads");
    let calls = Arc::new(AtomicU32::new(0));
    let client = QueryClient::default();
    let scope = Scope::root().with_client(client.clone());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let scope = scope.clone();
            let key = key.clone();
            let query_fn = counting(calls.clone(), "once");
            tokio::spawn(async move {
                let page = use_query(&scope, UseQueryOptions::new(key, query_fn))?;
                page.settled().await
            })
        })
        .collect();

    for handle in handles {
        assert_ok!(assert_ok!(handle.await));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_query_cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_producer_error_is_captured_in_state() {
    let key = unique_key("failing");
    let client = QueryClient::default();
    let scope = Scope::root().with_client(client.clone());
    let failing = query_fn(|_| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err::<String, _>(ProducerError::new("network down"))
    });

    let page = assert_ok!(use_query(&scope, UseQueryOptions::new(key.clone(), failing)));
    assert_eq!(page.status(), QueryStatus::Pending);

    let state = assert_ok!(page.settled().await);
    assert_eq!(state.status, QueryStatus::Error);
    assert!(state.data.is_none());
    assert_eq!(state.error.map(|e| e.message().to_string()).as_deref(), Some("network down"));
    assert!(client.get_query_data(&key).is_none());
}

#[tokio::test]
async fn test_producer_panicking_before_its_future_settles_as_error() {
    let key = unique_key("panicking");
    let client = QueryClient::default();
    let scope = Scope::root().with_client(client.clone());
    let exploding = query_fn(|_| -> std::future::Ready<Result<i32, ProducerError>> {
        panic!("producer closure failed")
    });

    let page = assert_ok!(use_query(&scope, UseQueryOptions::new(key.clone(), exploding)));
    let state = assert_ok!(assert_ok!(
        tokio::time::timeout(Duration::from_secs(2), page.settled()).await
    ));

    assert_eq!(state.status, QueryStatus::Error);
    assert!(!state.is_fetching());
    assert_eq!(client.is_fetching(), 0);
}

#[test]
fn test_use_query_outside_runtime_reports_error_and_leaves_entry_idle() {
    let key = unique_key("no_runtime");
    let calls = Arc::new(AtomicU32::new(0));
    let client = QueryClient::default();
    let scope = Scope::root().with_client(client.clone());

    let result = use_query(&scope, UseQueryOptions::new(key.clone(), counting(calls.clone(), "v")));

    assert!(matches!(result, Err(QueryError::NoRuntime)));
    let state = client.get_query_state(&key).expect("entry should exist");
    assert!(!state.is_fetching());
    assert_eq!(state.fetch_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_zero_gc_time_entry_survives_concurrent_sweeps_while_observed() {
    let query_cache = QueryCache::new();
    let client = client_with_cache(&query_cache);
    let scope = Scope::root().with_client(client);
    let stop = Arc::new(AtomicBool::new(false));

    let sweeper = {
        let query_cache = query_cache.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                query_cache.collect_garbage();
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..200 {
        let key = unique_key("zero_gc");
        let page = assert_ok!(use_query(
            &scope,
            UseQueryOptions::new(key.clone(), sleep_then("v")).with_gc_time(GcTime::from_millis(0)),
        ));

        let cached = query_cache.find(&key).expect("observed entry must stay cached");
        assert!(Arc::ptr_eq(&cached, page.query()));
    }

    stop.store(true, Ordering::Relaxed);
    assert_ok!(sweeper.await);
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_entry_is_collected_after_gc_time() {
    let key = unique_key("gc");
    let query_cache = QueryCache::new();
    let client = client_with_cache(&query_cache);
    let scope = Scope::root().with_client(client);
    let gc = spawn_gc_task(query_cache.clone(), Duration::from_millis(5));

    let page = assert_ok!(use_query(
        &scope,
        UseQueryOptions::new(key.clone(), sleep_then("test")).with_gc_time(GcTime::from_millis(50)),
    ));
    assert_ok!(page.settled().await);

    advance(100).await;
    assert!(query_cache.find(&key).is_some(), "observed entry must be retained");

    drop(page);
    advance(30).await;
    assert!(query_cache.find(&key).is_some());

    advance(40).await;
    assert!(query_cache.find(&key).is_none());

    gc.abort();
}

#[tokio::test(start_paused = true)]
async fn test_infinite_gc_time_retains_unobserved_entry() {
    let key = unique_key("forever");
    let query_cache = QueryCache::new();
    let client = client_with_cache(&query_cache);
    let scope = Scope::root().with_client(client);
    let gc = spawn_gc_task(query_cache.clone(), Duration::from_millis(5));

    let page = assert_ok!(use_query(
        &scope,
        UseQueryOptions::new(key.clone(), sleep_then("test")).with_gc_time(GcTime::Infinite),
    ));
    assert_ok!(page.settled().await);
    drop(page);

    advance(1_000).await;
    assert!(query_cache.find(&key).is_some());

    gc.abort();
}
