// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Client config loader and validator
//
// Loads libtrack.yaml, validates structure, resolves variable interpolation,
// merges built-in guidance, and compiles guidance patterns.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod pattern;
mod raw;
mod source;
mod types;

pub use defaults::{
    default_tool_call_keys, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHAT_PATH,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_INTENT_THRESHOLD, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_SESSION_PATH, DEFAULT_STREAM_PATH, DEFAULT_TIMEOUT_MS, DEFAULT_TOOL_CALL_KEYS,
    DEFAULT_USER_ROLE,
};
pub use error::ConfigError;
pub use interpolation::{resolve_variables, resolve_with};
pub use loader::load_config;
pub use pattern::CompiledPattern;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{
    ApiConfig, Config, GuideConfig, GuideRule, Notices, StreamConfig, UserContext,
};
