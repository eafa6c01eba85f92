//! Response caching through the full gateway.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use gateway_resilience::testing::{FailingStore, MemoryStore};
use gateway_resilience::PersistentStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_identical_requests_hit_upstream_once() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_answer("openai", "Cached answer.", 1).await;

    let server = TestServer::start(test_config(&ddg.url(), &pollinations.url())).await;
    let body = chat_body("pollinations", "openai", "same question", false);

    for expected_cached in [false, true, true] {
        let response = server.post_json("/api/chat", &body).await;
        assert_status(&response, 200);
        let json = TestServer::json_body(response).await;
        assert_eq!(json["content"], "Cached answer.");
        assert_eq!(json["cached"], expected_cached);
    }

    let stats = server.state.stats.get_stats().await;
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.logs.iter().filter(|l| l.cached).count(), 2);
}

#[tokio::test]
async fn test_different_history_is_a_different_key() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_answer("openai", "Fresh.", 2).await;

    let server = TestServer::start(test_config(&ddg.url(), &pollinations.url())).await;

    let plain = server
        .post_json("/api/chat", &chat_body("pollinations", "openai", "question", false))
        .await;
    let with_system = server
        .post_json(
            "/api/chat",
            &chat_body_with_system("pollinations", "openai", "Be terse.", "question"),
        )
        .await;

    assert_eq!(TestServer::json_body(plain).await["cached"], false);
    assert_eq!(TestServer::json_body(with_system).await["cached"], false);
}

#[tokio::test]
async fn test_persistent_store_backs_cache_and_stats() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_answer("openai", "Stored.", 1).await;

    let store = Arc::new(MemoryStore::new());
    let config = test_config(&ddg.url(), &pollinations.url());
    let body = chat_body("pollinations", "openai", "persist me", false);

    let first = TestServer::start_with(config.clone(), Some(store.clone())).await;
    let response = first.post_json("/api/chat", &body).await;
    assert_eq!(TestServer::json_body(response).await["cached"], false);

    // A fresh process over the same store answers from cache
    let second = TestServer::start_with(config, Some(store.clone())).await;
    let response = second.post_json("/api/chat", &body).await;
    assert_eq!(TestServer::json_body(response).await["content"], "Stored.");

    let stats = TestServer::json_body(second.get("/api/stats").await).await;
    assert_eq!(stats["totalRequests"], 2);
    assert_eq!(stats["requestsByModel"]["openai"], 2);
    assert!(stats["dbUsage"]["keys"].as_u64().is_some_and(|k| k >= 6));
    assert!(store.get("stats:total").await.expect("readable").is_some());
}

#[tokio::test]
async fn test_store_outage_only_forces_recomputation() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_answer("openai", "Recomputed.", 2).await;

    let store = Arc::new(FailingStore::new());
    let server = TestServer::start_with(
        test_config(&ddg.url(), &pollinations.url()),
        Some(store),
    )
    .await;
    let body = chat_body("pollinations", "openai", "outage", false);

    for _ in 0..2 {
        let response = server.post_json("/api/chat", &body).await;
        assert_status(&response, 200);
        let json = TestServer::json_body(response).await;
        assert_eq!(json["content"], "Recomputed.");
        assert_eq!(json["cached"], false);
    }

    let stats = TestServer::json_body(server.get("/api/stats").await).await;
    assert_eq!(stats["totalRequests"], 2);
    assert_eq!(stats["dbUsage"]["keys"], 0);
}
