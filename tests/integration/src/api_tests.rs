//! API endpoint integration tests
//!
//! Tests for the health, keep-alive, stats and provider endpoints and for
//! request validation on the chat endpoint.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use pretty_assertions::assert_eq;
use serde_json::json;

async fn start() -> (MockDuckDuckGo, MockPollinations, TestServer) {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    let server = TestServer::start(test_config(&ddg.url(), &pollinations.url())).await;
    (ddg, pollinations, server)
}

/// Test the health check endpoint
#[tokio::test]
async fn test_health_endpoint() {
    let (_ddg, _pollinations, server) = start().await;

    let response = server.get("/health").await;
    assert_status(&response, 200);
    assert!(response.headers().contains_key("x-request-id"));

    let body = TestServer::json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

/// Fresh gateway reports empty stats
#[tokio::test]
async fn test_fresh_stats() {
    let (_ddg, _pollinations, server) = start().await;

    let response = server.get("/api/stats").await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["dailyRequests"], 0);
    assert_eq!(body["monthlyRequests"], 0);
    assert_eq!(body["totalRequests"], 0);
    assert_eq!(body["requestsByModel"], json!({}));
    assert_eq!(body["logs"], json!([]));
    assert_eq!(body["dbUsage"], json!({"keys": 0}));
    assert_eq!(body["connectionStats"]["maxFreeSockets"], 5);
}

/// Concurrent chats each get their own log entry
#[tokio::test]
async fn test_concurrent_chats_are_counted() {
    let (_ddg, pollinations, server) = start().await;
    pollinations.mock_answer("gpt", "hi", 2).await;

    let first = chat_body("pollinations", "gpt", "hello world", false);
    let second = chat_body("pollinations", "gpt", "hello world, again", false);
    let (a, b) = tokio::join!(
        server.post_json("/api/chat", &first),
        server.post_json("/api/chat", &second),
    );
    assert_status(&a, 200);
    assert_status(&b, 200);

    let body = TestServer::json_body(server.get("/api/stats").await).await;
    assert_eq!(body["totalRequests"], 2);
    assert_eq!(body["requestsByModel"]["gpt"], 2);
    let logs = body["logs"].as_array().cloned().unwrap_or_default();
    assert_eq!(logs.len(), 2);
    assert_ne!(logs[0]["id"], logs[1]["id"]);
}

/// Flushing clears the aggregate
#[tokio::test]
async fn test_flush_stats() {
    let (_ddg, pollinations, server) = start().await;
    pollinations.mock_answer("openai", "x", 1).await;
    server
        .post_json("/api/chat", &chat_body("pollinations", "openai", "q", false))
        .await;

    let response = server.delete("/api/stats").await;
    assert_status(&response, 200);
    assert_eq!(
        TestServer::json_body(response).await,
        json!({"success": true, "message": "Database flushed"})
    );

    let body = TestServer::json_body(server.get("/api/stats").await).await;
    assert_eq!(body["totalRequests"], 0);
}

/// Keep-alive warms the text provider origin
#[tokio::test]
async fn test_keep_alive() {
    let (_ddg, pollinations, server) = start().await;
    pollinations.mock_root(2).await;

    let response = server.get("/keep-alive").await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["status"], "alive");
    assert_eq!(body["mode"], "deep-warmup");
}

/// Provider listing reports per-model budgets
#[tokio::test]
async fn test_providers_for_model() {
    let (_ddg, _pollinations, server) = start().await;

    let response = server.get("/api/providers?model=claude-3-haiku-20240307").await;
    assert_status(&response, 200);
    assert_eq!(
        TestServer::json_body(response).await,
        json!({
            "model": "claude-3-haiku-20240307",
            "providers": [
                {"id": "ddg", "support": 150_000},
                {"id": "pollinations", "support": 100_000}
            ]
        })
    );

    let response = server.get("/api/providers?model=gpt-4").await;
    let body = TestServer::json_body(response).await;
    assert_eq!(body["providers"][0]["support"], 0);
}

/// Malformed chat requests are rejected before any upstream call
#[tokio::test]
async fn test_chat_validation() {
    let (ddg, _pollinations, server) = start().await;
    ddg.forbid_chat().await;

    let empty = json!({"model": "gpt-3.5-turbo", "messages": []});
    let response = server.post_json("/api/chat", &empty).await;
    assert_status(&response, 400);
    assert_eq!(TestServer::json_body(response).await["error"]["type"], "bad_request");

    let unknown = chat_body("openai", "gpt-4", "hi", false);
    let response = server.post_json("/api/chat", &unknown).await;
    assert_status(&response, 404);

    let response = server
        .client
        .post(server.url("/api/chat"))
        .header("content-type", "application/json")
        .body("{\"model\":")
        .send()
        .await
        .expect("Request failed");
    assert_status(&response, 400);

    assert_eq!(total_requests(&server).await, 0);
}
