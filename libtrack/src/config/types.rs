// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Serialize;

use crate::http::join_url;

use super::pattern::CompiledPattern;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated client config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config format version. Always "v1".
    pub version: String,
    pub api: ApiConfig,
    pub stream: StreamConfig,
    /// Identity forwarded with every chat request.
    pub user: UserContext,
    pub notices: Notices,
    pub guide: GuideConfig,
}

// ---------------------------------------------------------------------------
// Backend endpoints
// ---------------------------------------------------------------------------

/// Where the chat backend lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Scheme and host, e.g. "https://library.example.edu".
    pub base_url: String,
    /// Streaming chat endpoint (SSE response).
    pub stream_path: String,
    /// Non-streaming chat endpoint, used for fallback.
    pub chat_path: String,
    /// Session bootstrap endpoint.
    pub session_path: String,
    /// Timeout for non-streaming calls. The stream is bounded by
    /// `stream.idle_timeout_ms` instead.
    pub timeout_ms: u64,
}

impl ApiConfig {
    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }
}

/// Tuning for the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Capacity of the channel between the reader task and the turn.
    pub channel_capacity: usize,
    /// Text allowed to wait for a frame delimiter before the stream fails.
    pub max_frame_bytes: usize,
    /// Longest gap between chunks. 0 disables the check.
    pub idle_timeout_ms: u64,
    /// JSON keys that mark a content payload as a leaked tool invocation.
    pub tool_call_keys: Vec<String>,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

/// Opaque identity fields the backend receives with each message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
}

// ---------------------------------------------------------------------------
// User-visible notices
// ---------------------------------------------------------------------------

/// Fixed texts the turn state machine puts into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notices {
    /// Placeholder shown until the first content arrives.
    pub typing: String,
    /// Shown once per turn when a tool invocation leaks into content.
    pub invoking_tools: String,
    /// Shown when the backend reports an error or no reply can be obtained.
    pub error: String,
    /// Shown when a stream breaks after partial content.
    pub interrupted: String,
}

// ---------------------------------------------------------------------------
// Local guidance
// ---------------------------------------------------------------------------

/// Rules for turns answered locally without contacting the chat backend.
#[derive(Debug, Clone)]
pub struct GuideConfig {
    /// Minimum NLP intent confidence considered.
    pub intent_threshold: f64,
    pub greeting: GuideRule,
    pub menu: GuideRule,
    /// Checked in order after greeting and menu.
    pub faq: Vec<GuideRule>,
}

/// One locally answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideRule {
    pub patterns: Vec<CompiledPattern>,
    /// NLP intent names that select this rule.
    pub intents: Vec<String>,
    pub reply: String,
    pub widget: Option<String>,
}
