//! Framed event stream shared by every provider adapter.
//!
//! Frames are two text lines terminated by a blank line:
//!
//! ```text
//! event: message
//! data: {"content":"Hello"}
//!
//! ```
//!
//! The writer half ([`EventStream`]) is owned by the producing adapter. Once
//! it has been ended (or dropped) further writes are silently discarded. The
//! reader half ([`EventReceiver`]) can be consumed event by event, through
//! callbacks, or as a raw byte body for an HTTP response.

use crate::framing::FrameSplitter;
use bytes::Bytes;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::trace;

/// Tag of an event frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Content fragment
    Message,
    /// Unrecoverable failure; terminal
    Error,
    /// Normal completion; terminal
    Done,
    /// Search metadata
    Search,
}

impl EventKind {
    /// Wire tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Error => "error",
            Self::Done => "done",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "message" => Ok(Self::Message),
            "error" => Ok(Self::Error),
            "done" => Ok(Self::Done),
            "search" => Ok(Self::Search),
            _ => Err(()),
        }
    }
}

/// Function call carried by a message event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Payload of a `message` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Content fragment
    #[serde(default)]
    pub content: String,
    /// Author role, when the upstream reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Function call payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

/// Payload of an `error` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Error description
    #[serde(default)]
    pub error: String,
    /// Optional human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// A single event frame
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Content fragment
    Message(MessageData),
    /// Failure report
    Error(ErrorData),
    /// Completion marker
    Done,
    /// Search results, passed through untyped
    Search(serde_json::Value),
}

impl Event {
    /// Plain content message
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message(MessageData {
            content: content.into(),
            ..MessageData::default()
        })
    }

    /// Error with only a description
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error(ErrorData {
            error: error.into(),
            ..ErrorData::default()
        })
    }

    /// Tag of this event
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Done => EventKind::Done,
            Self::Search(_) => EventKind::Search,
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    fn payload(&self) -> String {
        let encoded = match self {
            Self::Message(data) => serde_json::to_string(data),
            Self::Error(data) => serde_json::to_string(data),
            Self::Done => serde_json::to_string(&MessageData::default()),
            Self::Search(value) => serde_json::to_string(value),
        };
        encoded.unwrap_or_else(|_| "{}".to_string())
    }

    /// Encode as a complete frame including the trailing blank line
    #[must_use]
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind(), self.payload())
    }

    /// Decode one frame (without its delimiter).
    ///
    /// A payload that is not valid JSON decodes as an empty object. Frames
    /// with an unknown tag yield `None`.
    #[must_use]
    pub fn decode(frame: &str) -> Option<Self> {
        let mut lines = frame.splitn(2, '\n');
        let tag_line = lines.next().unwrap_or_default();
        let data_line = lines.next().unwrap_or_default();

        let tag = tag_line.strip_prefix("event:").unwrap_or(tag_line);
        let kind = EventKind::from_str(tag).ok()?;

        let raw = data_line.trim_end_matches('\r');
        let raw = raw.strip_prefix("data:").unwrap_or(raw).trim_start();

        Some(match kind {
            EventKind::Message => Self::Message(serde_json::from_str(raw).unwrap_or_default()),
            EventKind::Error => Self::Error(serde_json::from_str(raw).unwrap_or_default()),
            EventKind::Done => Self::Done,
            EventKind::Search => Self::Search(
                serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
            ),
        })
    }
}

/// Writer half of an event stream
pub struct EventStream {
    sender: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl EventStream {
    /// Create a connected writer/reader pair
    #[must_use]
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            EventReceiver::new(rx),
        )
    }

    /// Append one frame. Inert once the stream has been ended or the reader
    /// has gone away.
    pub fn write(&self, event: &Event) {
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            trace!(event = %event.kind(), "Dropping write to ended stream");
            return;
        };
        if tx.send(Bytes::from(event.encode())).is_err() {
            trace!(event = %event.kind(), "Event reader gone, frame discarded");
        }
    }

    /// Close the stream for writing. Buffered frames still drain to the
    /// reader. Calling it again has no effect.
    pub fn end(&self) {
        self.sender.lock().take();
    }

    /// Whether `end` has been called
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Reader half of an event stream
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
    splitter: FrameSplitter,
    pending: VecDeque<Event>,
    closed: bool,
}

impl EventReceiver {
    fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self {
            rx,
            splitter: FrameSplitter::new(),
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Next decoded event, or `None` once the writer has ended and every
    /// buffered frame has been delivered
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.closed {
                return None;
            }
            match self.rx.recv().await {
                Some(chunk) => {
                    let frames = self.splitter.push(&chunk);
                    self.pending.extend(frames.iter().filter_map(|f| Event::decode(f)));
                }
                None => {
                    self.closed = true;
                    if let Some(rest) = self.splitter.finish() {
                        self.pending.extend(Event::decode(&rest));
                    }
                }
            }
        }
    }

    /// Drive the stream to completion, invoking `on_event` per frame and
    /// `on_close` exactly once afterwards. Nothing fires after `on_close`.
    pub async fn read<F, C>(mut self, mut on_event: F, on_close: C)
    where
        F: FnMut(Event) + Send,
        C: FnOnce() + Send,
    {
        while let Some(event) = self.next_event().await {
            on_event(event);
        }
        on_close();
    }

    /// Raw frame bytes, for use as an HTTP response body
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        })
    }
}
