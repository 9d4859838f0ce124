//! Token cache behaviour against a mock script endpoint.

mod common;

use common::{test_template, CountingEvaluator, MockUpstream};
use cursor_relay::client::{FingerprintStore, TokenCache};
use cursor_relay::config::FingerprintSeed;
use cursor_relay::transport::HttpTransport;
use cursor_relay::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn cache(
    script_url: Option<String>,
    evaluator: Arc<CountingEvaluator>,
    freshness: Duration,
) -> TokenCache {
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
    let fingerprint = Arc::new(FingerprintStore::from_seed(&FingerprintSeed::default()));
    TokenCache::new(
        transport,
        fingerprint,
        evaluator,
        test_template(),
        script_url,
        "https://cursor.com",
    )
    .with_freshness(freshness)
}

#[tokio::test]
async fn fresh_token_is_reused_without_fetch_or_evaluation() {
    let mut upstream = MockUpstream::new().await;
    let script = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(200)
        .with_body("upstream-script")
        .expect(1)
        .create_async()
        .await;

    let eval = CountingEvaluator::new();
    let cache = cache(Some(upstream.script_url()), eval.clone(), Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let first = cache.acquire(&cancel).await.unwrap();
    let second = cache.acquire(&cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(eval.calls(), 1);
    assert!(eval.last_source().ends_with("body=upstream-script"));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.fetches), (1, 1, 1));
    script.assert_async().await;
}

#[tokio::test]
async fn invalidate_forces_a_new_computation() {
    let mut upstream = MockUpstream::new().await;
    let script = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(200)
        .with_body("s")
        .expect(2)
        .create_async()
        .await;

    let eval = CountingEvaluator::new();
    let cache = cache(Some(upstream.script_url()), eval.clone(), Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let before = cache.acquire(&cancel).await.unwrap();
    cache.invalidate().await;
    let after = cache.acquire(&cancel).await.unwrap();

    assert_ne!(before, after);
    assert_eq!(eval.calls(), 2);
    assert_eq!(cache.stats().invalidations, 1);
    script.assert_async().await;
}

#[tokio::test]
async fn missing_script_url_runs_in_degraded_mode() {
    let eval = CountingEvaluator::new();
    let cache = cache(None, eval.clone(), Duration::from_secs(60));

    let token = assert_ok!(cache.acquire(&CancellationToken::new()).await);

    assert_eq!(token, "token-1");
    assert!(eval.last_source().ends_with("body="));
    assert_eq!(cache.stats().fetches, 0);
}

#[tokio::test]
async fn failed_fetch_without_history_uses_empty_body() {
    let mut upstream = MockUpstream::new().await;
    let _script = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(500)
        .create_async()
        .await;

    let eval = CountingEvaluator::new();
    let cache = cache(Some(upstream.script_url()), eval.clone(), Duration::from_secs(60));

    cache.acquire(&CancellationToken::new()).await.unwrap();
    assert!(eval.last_source().ends_with("body="));
}

#[tokio::test]
async fn failed_fetch_falls_back_to_previous_body() {
    let mut upstream = MockUpstream::new().await;
    let ok = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(200)
        .with_body("body-v1")
        .expect(1)
        .create_async()
        .await;
    let failing = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let eval = CountingEvaluator::new();
    // Zero freshness: every acquire is a miss.
    let cache = cache(Some(upstream.script_url()), eval.clone(), Duration::ZERO);
    let cancel = CancellationToken::new();

    cache.acquire(&cancel).await.unwrap();
    cache.acquire(&cancel).await.unwrap();

    assert!(eval.last_source().ends_with("body=body-v1"));
    assert_eq!(eval.calls(), 2);
    ok.assert_async().await;
    failing.assert_async().await;
}

#[tokio::test]
async fn evaluator_failure_clears_the_cache() {
    let mut upstream = MockUpstream::new().await;
    let _ok = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(200)
        .with_body("body-v1")
        .expect(1)
        .create_async()
        .await;
    let _failing = upstream
        .server
        .mock("GET", "/script.js")
        .with_status(503)
        .expect_at_least(1)
        .create_async()
        .await;

    let eval = CountingEvaluator::new();
    let cache = cache(Some(upstream.script_url()), eval.clone(), Duration::ZERO);
    let cancel = CancellationToken::new();

    cache.acquire(&cancel).await.unwrap();

    eval.set_failing(true);
    let err = cache.acquire(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::TokenAcquisition { .. }));

    // The cached body went with the failed computation.
    eval.set_failing(false);
    cache.acquire(&cancel).await.unwrap();
    assert!(eval.last_source().ends_with("body="));
}

#[tokio::test]
async fn unusable_token_is_never_cached() {
    let eval = CountingEvaluator::new();
    eval.queue_output("bad\ntoken");
    let cache = cache(None, eval.clone(), Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let err = assert_err!(cache.acquire(&cancel).await);
    assert!(matches!(err, Error::TokenAcquisition { .. }));

    // Within the freshness window the next acquire still recomputes.
    let token = assert_ok!(cache.acquire(&cancel).await);
    assert_eq!(token, "token-2");
    assert_eq!(cache.stats().evaluations, 2);
    assert_eq!(cache.stats().hits, 0);

    assert_eq!(assert_ok!(cache.acquire(&cancel).await), "token-2");
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn cancelled_acquire_returns_cancelled() {
    let eval = CountingEvaluator::new();
    let cache = cache(None, eval.clone(), Duration::from_secs(60));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(cache.acquire(&cancel).await);
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(eval.calls(), 0);
}

#[tokio::test]
async fn concurrent_acquires_all_get_a_token() {
    let eval = CountingEvaluator::new();
    let cache = Arc::new(cache(None, eval.clone(), Duration::from_secs(60)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire(&CancellationToken::new()).await })
        })
        .collect();

    for h in handles {
        let token = h.await.unwrap().unwrap();
        assert!(token.starts_with("token-"));
    }
    // Concurrent misses may each compute; afterwards the entry is served from cache.
    let computed = eval.calls();
    assert!((1..=8).contains(&computed));
    cache.acquire(&CancellationToken::new()).await.unwrap();
    assert_eq!(eval.calls(), computed);
}
