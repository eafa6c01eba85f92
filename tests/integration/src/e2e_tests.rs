//! End-to-end request flows through the gateway to mock upstreams.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

async fn start(ddg: &MockDuckDuckGo, pollinations: &MockPollinations) -> TestServer {
    TestServer::start(test_config(&ddg.url(), &pollinations.url())).await
}

#[tokio::test]
async fn test_ddg_status_token_flow() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    ddg.mock_status_token("ABC123").await;
    ddg.mock_chat("ABC123", "gpt-4o-mini", &["The sky ", "is blue."], 1).await;

    let server = start(&ddg, &pollinations).await;
    let response = server
        .post_json("/api/chat", &chat_body("ddg", "gpt-3.5-turbo", "Why is the sky blue?", false))
        .await;

    assert_status(&response, 200);
    let json = TestServer::json_body(response).await;
    assert_eq!(
        json,
        json!({
            "provider": "ddg",
            "model": "gpt-3.5-turbo",
            "content": "The sky is blue.",
            "cached": false
        })
    );
}

#[tokio::test]
async fn test_ddg_html_fallback_flow() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    ddg.mock_status_blocked().await;
    ddg.mock_search_page("DEF456").await;
    ddg.mock_chat("DEF456", "claude-3-haiku-20240307", &["Fallback works."], 1).await;

    let server = start(&ddg, &pollinations).await;
    let response = server
        .post_json(
            "/api/chat",
            &chat_body("ddg", "claude-3-haiku-20240307", "hello", false),
        )
        .await;

    assert_status(&response, 200);
    assert_eq!(TestServer::json_body(response).await["content"], "Fallback works.");
}

#[tokio::test]
async fn test_ddg_blocked_never_reaches_chat() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    ddg.mock_status_blocked().await;
    ddg.mock_search_blocked().await;
    ddg.forbid_chat().await;

    let server = start(&ddg, &pollinations).await;
    let response = server
        .post_json("/api/chat", &chat_body("ddg", "gpt-3.5-turbo", "hello", true))
        .await;

    assert_status(&response, 500);
    let json = TestServer::json_body(response).await;
    assert_eq!(json["error"]["type"], "internal_server_error");
    assert!(json["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("VQD")));
}

#[tokio::test]
async fn test_ddg_streaming_frames() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    ddg.mock_status_token("ABC123").await;
    ddg.mock_chat("ABC123", "gpt-4o-mini", &["one ", "two ", "three"], 1).await;

    let server = start(&ddg, &pollinations).await;
    let (status, body) = server
        .post_streaming("/api/chat", &chat_body("ddg", "gpt-3.5-turbo", "count", true))
        .await;

    assert_eq!(status, 200);
    let frames = parse_frames(&body);
    let tags: Vec<&str> = frames.iter().map(|(tag, _)| tag.as_str()).collect();
    assert_eq!(tags, vec!["message", "message", "message", "done"]);
    let text: String = frames
        .iter()
        .filter_map(|(_, data)| data["content"].as_str())
        .collect();
    assert_eq!(text, "one two three");
}

#[tokio::test]
async fn test_pollinations_streaming_then_cached_replay() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_answer("mistral", "Raw text answer.", 1).await;

    let server = start(&ddg, &pollinations).await;
    let body = chat_body("pollinations", "mistral", "say something", true);

    let (status, first) = server.post_streaming("/api/chat", &body).await;
    assert_eq!(status, 200);
    let text: String = parse_frames(&first)
        .iter()
        .filter_map(|(_, data)| data["content"].as_str())
        .collect();
    assert_eq!(text, "Raw text answer.");

    // The tee caches once the upstream stream completes
    let recorded = &server;
    assert!(
        wait_for(
            move || async move { total_requests(recorded).await == 1 },
            Duration::from_secs(2)
        )
        .await
    );

    let (_, second) = server.post_streaming("/api/chat", &body).await;
    assert_eq!(
        parse_frames(&second),
        vec![
            ("message".to_string(), json!({"content": "Raw text answer."})),
            ("done".to_string(), json!({"content": ""})),
        ]
    );
}

#[tokio::test]
async fn test_pollinations_upstream_failure() {
    let ddg = MockDuckDuckGo::new().await;
    let pollinations = MockPollinations::new().await;
    pollinations.mock_failure(503).await;

    let server = start(&ddg, &pollinations).await;
    let response = server
        .post_json("/api/chat", &chat_body("pollinations", "openai", "hello", false))
        .await;

    assert_status(&response, 500);
    let stats = server.state.stats.get_stats().await;
    assert_eq!(stats.logs[0].status, 500);
    assert_eq!(stats.logs[0].model, "openai");
}
