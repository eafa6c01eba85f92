//! Test fixtures and sample data for integration tests

use serde_json::{json, Value};

/// Chat body for `POST /api/chat`
pub fn chat_body(provider: &str, model: &str, prompt: &str, stream: bool) -> Value {
    json!({
        "provider": provider,
        "model": model,
        "stream": stream,
        "messages": [{"role": "user", "content": prompt}]
    })
}

/// Chat body with a system turn before the prompt
pub fn chat_body_with_system(provider: &str, model: &str, system: &str, prompt: &str) -> Value {
    json!({
        "provider": provider,
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": prompt}
        ]
    })
}

/// DuckDuckGo chat body: one `data:` chunk per part, then the sentinel
pub fn ddg_stream_body(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("data: {}\n\n", json!({"role": "assistant", "message": part})));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Search page embedding a session token
pub fn vqd_html(token: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><script>DDG.deep.initialize('/d.js', vqd=\"{token}\");</script></head><body></body></html>"
    )
}

/// Parse an event-stream body into `(tag, data)` pairs
pub fn parse_frames(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| {
            let mut lines = frame.lines();
            let tag = lines.next()?.strip_prefix("event: ")?.to_string();
            let data = lines
                .next()
                .and_then(|l| l.strip_prefix("data: "))
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_else(|| json!({}));
            Some((tag, data))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddg_stream_body() {
        let body = ddg_stream_body(&["a", "b"]);
        assert_eq!(body.matches("data: ").count(), 3);
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn test_parse_frames() {
        let frames = parse_frames(
            "event: message\ndata: {\"content\":\"hi\"}\n\nevent: done\ndata: {\"content\":\"\"}\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, "message");
        assert_eq!(frames[0].1["content"], "hi");
        assert_eq!(frames[1].0, "done");
    }
}
