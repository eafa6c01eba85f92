//! Mock upstream providers for integration testing
//!
//! Wiremock servers that imitate the DuckDuckGo chat handshake and the
//! Pollinations text endpoint.

use crate::fixtures::{ddg_stream_body, vqd_html};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upstream status path
pub const DDG_STATUS_PATH: &str = "/duckchat/v1/status";
/// Upstream chat path
pub const DDG_CHAT_PATH: &str = "/duckchat/v1/chat";

/// Mock DuckDuckGo chat origin
pub struct MockDuckDuckGo {
    pub server: MockServer,
}

impl MockDuckDuckGo {
    /// Start an origin with no routes
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of this origin
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Status endpoint hands out `token` in the response header
    pub async fn mock_status_token(&self, token: &str) {
        Mock::given(method("GET"))
            .and(path(DDG_STATUS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-vqd-4", token)
                    .insert_header("set-cookie", "dcm=3; Path=/; Secure"),
            )
            .mount(&self.server)
            .await;
    }

    /// Status endpoint rejects every call
    pub async fn mock_status_blocked(&self) {
        Mock::given(method("GET"))
            .and(path(DDG_STATUS_PATH))
            .respond_with(ResponseTemplate::new(418))
            .mount(&self.server)
            .await;
    }

    /// Search page embeds `token`
    pub async fn mock_search_page(&self, token: &str) {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("ia", "chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(vqd_html(token)))
            .mount(&self.server)
            .await;
    }

    /// Search page rejects every call
    pub async fn mock_search_blocked(&self) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&self.server)
            .await;
    }

    /// Chat endpoint streams `parts` when called with `token` and the
    /// upstream model name
    pub async fn mock_chat(&self, token: &str, upstream_model: &str, parts: &[&str], expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(DDG_CHAT_PATH))
            .and(header("x-vqd-4", token))
            .and(body_partial_json(serde_json::json!({"model": upstream_model})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(ddg_stream_body(parts)),
            )
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Chat endpoint that must never be reached
    pub async fn forbid_chat(&self) {
        Mock::given(method("POST"))
            .and(path(DDG_CHAT_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&self.server)
            .await;
    }
}

/// Mock Pollinations text origin
pub struct MockPollinations {
    pub server: MockServer,
}

impl MockPollinations {
    /// Start an origin with no routes
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of this origin
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Text endpoint answers `text` for `model`
    pub async fn mock_answer(&self, model: &str, text: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"model": model, "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_string(text))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Text endpoint fails with `status`
    pub async fn mock_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Root answers GETs, as used by the warm-up
    pub async fn mock_root(&self, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }
}
