//! Request types for the gateway.
//!
//! This module defines the normalized chat request every provider adapter
//! receives, independent of the upstream wire format.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Normalized chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Requested model; resolved by each adapter
    pub model: String,

    /// Ordered conversation turns
    pub messages: Vec<ChatMessage>,

    /// Whether the caller wants incremental delivery
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Create a new request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
        }
    }

    /// Set the stream flag
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Validate the request
    ///
    /// # Errors
    /// Returns a bad-request error if the message list is empty. The model
    /// identifier is opaque here, adapters resolve blank or unknown names.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::bad_request("messages cannot be empty"));
        }

        Ok(())
    }

    /// Text of the prompt that triggered this request: the latest user turn,
    /// or the latest turn of any role when there is none
    #[must_use]
    pub fn prompt_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .or_else(|| self.messages.last())
            .map_or("", |m| m.content.as_str())
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// End user
    User,
    /// Model output
    Assistant,
}
