// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config because patterns are compiled and
// variables resolved between the two.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub libtrack: String,
    pub api: RawApiConfig,
    pub stream: Option<RawStreamConfig>,
    pub user: RawUser,
    pub notices: Option<RawNotices>,
    pub guide: Option<RawGuide>,
}

#[derive(Debug, Deserialize)]
pub struct RawApiConfig {
    pub base_url: String,
    pub stream_path: Option<String>,
    pub chat_path: Option<String>,
    pub session_path: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStreamConfig {
    pub channel_capacity: Option<usize>,
    pub max_frame_bytes: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub tool_call_keys: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RawUser {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawNotices {
    pub typing: Option<String>,
    pub invoking_tools: Option<String>,
    pub error: Option<String>,
    pub interrupted: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawGuide {
    pub intent_threshold: Option<f64>,
    pub greeting: Option<RawGuideRule>,
    pub menu: Option<RawGuideRule>,
    #[serde(default)]
    pub faq: Vec<RawGuideRule>,
    /// If false, skip the built-in FAQ entries. Default: true.
    pub use_default_faq: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGuideRule {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(alias = "answer")]
    pub text: String,
    pub widget: Option<String>,
}
