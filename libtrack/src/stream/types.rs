// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Core types for the chat event stream: frames, typed events, the
// classification outcome, and the errors that escape the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::http::HttpError;

/// Payload value that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Line marker carrying payload text inside a frame.
pub const DATA_MARKER: &str = "data:";

/// Maximum text held while waiting for a frame delimiter.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576; // 1 MB

/// Longest wait for the next chunk before the stream counts as stalled.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One complete protocol message extracted from the buffered stream.
///
/// Created when a blank-line delimiter is found; consumed immediately by a
/// classifier and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// All text between delimiters, trimmed.
    pub raw: String,
    /// Lines that carried the data marker, marker and one space stripped.
    pub data_lines: Vec<String>,
}

impl StreamFrame {
    /// Build a frame from trimmed raw text, extracting its data lines.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let data_lines = raw
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter_map(|line| line.strip_prefix(DATA_MARKER))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest).to_string())
            .collect();
        Self { raw, data_lines }
    }

    /// Reconstruct the payload text. `None` for comment/keep-alive frames.
    pub fn payload(&self) -> Option<String> {
        if self.data_lines.is_empty() {
            None
        } else {
            Some(self.data_lines.join("\n"))
        }
    }
}

// ---------------------------------------------------------------------------
// Chat events
// ---------------------------------------------------------------------------

/// Discriminator of a chat event (`type` field of the payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Session,
    Info,
    Content,
    Error,
    /// Any type the client does not recognize.
    Other(String),
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "session" => EventKind::Session,
            "info" => EventKind::Info,
            "content" => EventKind::Content,
            "error" => EventKind::Error,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Session => "session",
            EventKind::Info => "info",
            EventKind::Content => "content",
            EventKind::Error => "error",
            EventKind::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed, typed unit handed to the caller.
///
/// Only ever built from a payload that decoded to a JSON object. Fields other
/// than `type` and `content` are preserved in `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Absent when the payload carries no `type`; such events are not
    /// actionable.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl ChatEvent {
    /// A content event carrying `text`.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: Some(EventKind::Content),
            content: Some(text.into()),
            meta: serde_json::Map::new(),
        }
    }

    /// An error event carrying `text`.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: Some(EventKind::Error),
            content: Some(text.into()),
            meta: serde_json::Map::new(),
        }
    }

    /// An event of the given kind with no content.
    pub fn of_kind(kind: EventKind) -> Self {
        Self {
            kind: Some(kind),
            content: None,
            meta: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified<E> {
    /// A typed event for the consumer.
    Event(E),
    /// The sentinel: stop reading, close the session cleanly.
    Done,
    /// Nothing to deliver (keep-alive, comment, or a dropped payload).
    Skip,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that escape the streaming pipeline into turn-level policy.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The transport produced no readable streaming body.
    #[error("streaming is not supported by the transport")]
    Unsupported,

    /// The streaming request returned a non-success status.
    #[error("stream request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// The streaming request never produced a response.
    #[error("stream request could not be sent: {0}")]
    Transport(#[from] HttpError),

    /// A read failed after the stream was established.
    #[error("stream aborted: {0}")]
    Aborted(String),

    /// A frame grew past the buffer limit without a delimiter.
    #[error("frame exceeded {limit} bytes without a delimiter")]
    FrameTooLarge { limit: usize },

    /// No chunk arrived within the idle timeout.
    #[error("no data received for {after_ms} ms")]
    IdleTimeout { after_ms: u64 },
}

impl StreamError {
    /// Whether the failure happened before any frame could be read.
    pub fn is_setup_failure(&self) -> bool {
        !matches!(
            self,
            StreamError::Aborted(_)
                | StreamError::FrameTooLarge { .. }
                | StreamError::IdleTimeout { .. }
        )
    }
}
