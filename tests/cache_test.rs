//! Segment cache integration tests against an on-disk store.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use common::TestHarness;
use http_body_util::BodyExt;
use segcache::cache::SegmentCache;
use segcache::config::CacheConfig;
use segcache::server::create_router;
use tower::ServiceExt;

fn small_cache() -> CacheConfig {
    CacheConfig {
        capacity_bytes: 10_000,
        per_item_ceiling_bytes: 4_000,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let harness = TestHarness::new().await;
    harness
        .cache
        .admit("https://cdn/seq_1.ts", Bytes::from(vec![1u8; 300]), Utc::now())
        .await;
    harness
        .cache
        .admit("https://cdn/seq_2.ts", Bytes::from(vec![2u8; 200]), Utc::now())
        .await;

    let reopened = SegmentCache::initialize(&harness.config.cache).await;
    assert!(reopened.is_available());
    assert_eq!(reopened.total_bytes(), 500);
    assert_eq!(reopened.count().await, Some(2));
    assert_eq!(
        reopened.fetch("https://cdn/seq_1.ts").await,
        Some(Bytes::from(vec![1u8; 300]))
    );
}

#[tokio::test]
async fn test_occupancy_stays_bounded_over_a_long_session() {
    let harness = TestHarness::with_cache_config(small_cache()).await;
    let cache = &harness.cache;
    let limits = *cache.limits();
    let start = Utc::now();

    for i in 0..200i64 {
        let size = 500 + (i as usize * 37) % 3_000;
        let key = format!("https://cdn/live/seq_{}.ts", i);
        cache
            .admit(&key, Bytes::from(vec![0u8; size]), start + ChronoDuration::milliseconds(i))
            .await;
        assert!(
            cache.total_bytes() <= limits.high_water_mark_bytes + limits.per_item_ceiling_bytes,
            "occupancy {} exceeded bound after admitting #{}",
            cache.total_bytes(),
            i
        );
    }

    // The newest segment is always retained, and the running total matches
    // what is actually on disk.
    assert!(cache.fetch("https://cdn/live/seq_199.ts").await.is_some());
    assert!(cache.fetch("https://cdn/live/seq_0.ts").await.is_none());

    let reopened = SegmentCache::initialize(&harness.config.cache).await;
    assert_eq!(reopened.total_bytes(), cache.total_bytes());
}

#[tokio::test]
async fn test_manual_eviction_removes_oldest_first() {
    let harness = TestHarness::new().await;
    let start = Utc::now();
    for i in 0..5i64 {
        harness
            .cache
            .admit(
                &format!("https://cdn/seq_{}.ts", i),
                Bytes::from(vec![0u8; 100]),
                start + ChronoDuration::seconds(i),
            )
            .await;
    }

    let report = harness.cache.evict_until_under_target(250).await;
    let removed: Vec<_> = report.removed.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(
        removed,
        ["https://cdn/seq_0.ts", "https://cdn/seq_1.ts", "https://cdn/seq_2.ts"]
    );
    assert_eq!(report.reclaimed_bytes, 300);
    assert!(!report.exhausted);
    assert_eq!(harness.cache.total_bytes(), 200);
}

#[tokio::test]
async fn test_eviction_under_target_removes_nothing() {
    let harness = TestHarness::new().await;
    harness
        .cache
        .admit("https://cdn/seq_1.ts", Bytes::from(vec![0u8; 100]), Utc::now())
        .await;

    let report = harness.cache.evict_until_under_target(1_000).await;
    assert!(report.removed.is_empty());
    assert_eq!(report.reclaimed_bytes, 0);
    assert_eq!(harness.cache.stats().await.evicted, 0);
    assert_eq!(harness.cache.total_bytes(), 100);
}

#[tokio::test]
async fn test_concurrent_admissions_keep_total_consistent() {
    let harness = TestHarness::with_cache_config(small_cache()).await;
    let cache = Arc::clone(&harness.cache);

    for i in 0..50 {
        cache.admit_in_background(format!("https://cdn/seq_{}.ts", i), Bytes::from(vec![9u8; 700]));
    }
    cache.flush().await;

    assert_eq!(cache.stats().await.write_failures, 0);
    let reopened = SegmentCache::initialize(&harness.config.cache).await;
    assert_eq!(reopened.total_bytes(), cache.total_bytes());
    assert_eq!(reopened.count().await, cache.count().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_write_throughs_are_never_lost() {
    let harness = TestHarness::new().await;
    let cache = Arc::clone(&harness.cache);

    for round in 0..5 {
        for i in 0..200 {
            cache.admit_in_background(
                format!("https://cdn/live/r{}_seq_{}.ts", round, i),
                Bytes::from(vec![0x47u8; 4000]),
            );
        }
        cache.flush().await;
    }

    let stats = cache.stats().await;
    assert_eq!(stats.write_failures, 0);
    assert_eq!(stats.admitted, 1000);
    assert_eq!(stats.entries, Some(1000));
    assert_eq!(stats.total_bytes, 1000 * 4000);
    for round in 0..5 {
        for i in (0..200).step_by(37) {
            let key = format!("https://cdn/live/r{}_seq_{}.ts", round, i);
            assert!(cache.fetch(&key).await.is_some(), "{key} missing");
        }
    }
}

#[tokio::test]
async fn test_unopenable_store_disables_caching() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let config = CacheConfig {
        // A regular file cannot be a parent directory.
        db_path: Some(blocker.path().join("segments.db")),
        ..CacheConfig::default()
    };

    let cache = SegmentCache::initialize(&config).await;
    assert!(!cache.is_available());
    cache
        .admit("https://cdn/seq_1.ts", Bytes::from_static(b"x"), Utc::now())
        .await;
    assert_eq!(cache.fetch("https://cdn/seq_1.ts").await, None);
    assert_eq!(cache.count().await, None);
}

#[tokio::test]
async fn test_stats_route_via_router() {
    let harness = TestHarness::new().await;
    harness
        .cache
        .admit("https://cdn/seq_1.ts", Bytes::from(vec![0u8; 42]), Utc::now())
        .await;

    let app = create_router(harness.ctx.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/cache/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["total_bytes"], 42);
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["limits"]["capacity_bytes"], 25 * 1024 * 1024);
}

#[tokio::test]
async fn test_clear_route_via_router() {
    let harness = TestHarness::new().await;
    harness
        .cache
        .admit("https://cdn/seq_1.ts", Bytes::from(vec![0u8; 42]), Utc::now())
        .await;

    let app = create_router(harness.ctx.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(harness.cache.count().await, Some(0));
    assert!(harness.db_path().exists());
}
