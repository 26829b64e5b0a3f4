// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;
use super::raw::RawGuide;
use super::types::Notices;

pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream";
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";
pub const DEFAULT_SESSION_PATH: &str = "/api/chat/session";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = crate::stream::DEFAULT_CHANNEL_CAPACITY;
pub const DEFAULT_MAX_FRAME_BYTES: usize = crate::stream::DEFAULT_MAX_FRAME_BYTES;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = crate::stream::DEFAULT_IDLE_TIMEOUT_MS;
pub const DEFAULT_INTENT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_USER_ROLE: &str = "student";

/// Keys whose presence marks a JSON content payload as a tool invocation.
pub const DEFAULT_TOOL_CALL_KEYS: &[&str] = &["function", "name", "tool", "tool_calls", "type"];

/// Built-in greeting, menu, and FAQ entries, embedded at compile time.
const DEFAULT_GUIDE_YAML: &str = include_str!("../../config/default_guide.yaml");

/// Parse the embedded guidance defaults.
pub fn default_guide() -> Result<RawGuide, ConfigError> {
    Ok(serde_yaml::from_str(DEFAULT_GUIDE_YAML)?)
}

pub fn default_tool_call_keys() -> Vec<String> {
    DEFAULT_TOOL_CALL_KEYS.iter().map(|k| k.to_string()).collect()
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            typing: "Typing…".to_string(),
            invoking_tools: "Invoking tools…".to_string(),
            error: "Sorry, I couldn't get an answer right now. Please try again in a moment."
                .to_string(),
            interrupted: "The response was interrupted. Please retry your question.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pattern::CompiledPattern;

    #[test]
    fn embedded_guide_parses() {
        let guide = default_guide().unwrap();
        assert!(guide.greeting.is_some());
        assert!(guide.menu.is_some());
        assert!(!guide.faq.is_empty());
    }

    #[test]
    fn embedded_patterns_compile() {
        let guide = default_guide().unwrap();
        let rules = guide
            .greeting
            .iter()
            .chain(guide.menu.iter())
            .chain(guide.faq.iter());
        for rule in rules {
            CompiledPattern::compile_all(&rule.patterns).unwrap();
        }
    }
}
