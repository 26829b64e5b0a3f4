// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

use super::defaults::{
    default_guide, default_tool_call_keys, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHAT_PATH,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_INTENT_THRESHOLD, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_SESSION_PATH, DEFAULT_STREAM_PATH, DEFAULT_TIMEOUT_MS, DEFAULT_USER_ROLE,
};
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::pattern::CompiledPattern;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a client config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Parse into raw deserialization types
/// 3. Validate version, endpoints, and limits
/// 4. Resolve `${VAR}` references in the base URL and user fields
/// 5. Merge built-in guidance with user guidance, compiling patterns
/// 6. Build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.libtrack != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.libtrack
        )));
    }

    let api = build_api_config(raw.api)?;
    let stream = build_stream_config(raw.stream)?;
    let user = build_user_context(raw.user)?;
    let notices = build_notices(raw.notices.unwrap_or_default());
    let guide = build_guide_config(raw.guide.unwrap_or_default())?;

    tracing::debug!(
        source = %source.describe(),
        base_url = %api.base_url,
        faq_entries = guide.faq.len(),
        "config loaded"
    );

    Ok(Config {
        version: raw.libtrack,
        api,
        stream,
        user,
        notices,
        guide,
    })
}

fn build_api_config(raw: raw::RawApiConfig) -> Result<ApiConfig, ConfigError> {
    let base_url = resolve_variables(&raw.base_url)?;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "api.base_url must start with http:// or https://, got \"{base_url}\""
        )));
    }

    let stream_path = validate_path("stream_path", raw.stream_path, DEFAULT_STREAM_PATH)?;
    let chat_path = validate_path("chat_path", raw.chat_path, DEFAULT_CHAT_PATH)?;
    let session_path = validate_path("session_path", raw.session_path, DEFAULT_SESSION_PATH)?;

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "api.timeout_ms must be greater than 0".to_string(),
        ));
    }

    Ok(ApiConfig {
        base_url,
        stream_path,
        chat_path,
        session_path,
        timeout_ms,
    })
}

fn validate_path(name: &str, value: Option<String>, default: &str) -> Result<String, ConfigError> {
    let path = value.unwrap_or_else(|| default.to_string());
    if !path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "api.{name} must start with '/', got \"{path}\""
        )));
    }
    Ok(path)
}

fn build_stream_config(raw: Option<raw::RawStreamConfig>) -> Result<StreamConfig, ConfigError> {
    let raw = raw.unwrap_or_default();

    let channel_capacity = raw.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
    if channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "stream.channel_capacity must be greater than 0".to_string(),
        ));
    }

    let max_frame_bytes = raw.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES);
    if max_frame_bytes == 0 {
        return Err(ConfigError::Validation(
            "stream.max_frame_bytes must be greater than 0".to_string(),
        ));
    }

    let idle_timeout_ms = raw.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);

    let tool_call_keys = raw.tool_call_keys.unwrap_or_else(default_tool_call_keys);
    if tool_call_keys.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "stream.tool_call_keys must not contain empty keys".to_string(),
        ));
    }

    Ok(StreamConfig {
        channel_capacity,
        max_frame_bytes,
        idle_timeout_ms,
        tool_call_keys,
    })
}

fn build_user_context(raw: raw::RawUser) -> Result<UserContext, ConfigError> {
    let user_id = resolve_variables(&raw.id)?;
    if user_id.trim().is_empty() {
        return Err(ConfigError::Validation("user.id must not be empty".to_string()));
    }
    let user_name = match raw.name {
        Some(name) => resolve_variables(&name)?,
        None => String::new(),
    };
    let user_role = match raw.role {
        Some(role) => resolve_variables(&role)?,
        None => DEFAULT_USER_ROLE.to_string(),
    };
    Ok(UserContext {
        user_id,
        user_name,
        user_role,
    })
}

fn build_notices(raw: raw::RawNotices) -> Notices {
    let defaults = Notices::default();
    Notices {
        typing: raw.typing.unwrap_or(defaults.typing),
        invoking_tools: raw.invoking_tools.unwrap_or(defaults.invoking_tools),
        error: raw.error.unwrap_or(defaults.error),
        interrupted: raw.interrupted.unwrap_or(defaults.interrupted),
    }
}

fn build_guide_config(raw: raw::RawGuide) -> Result<GuideConfig, ConfigError> {
    let defaults = default_guide()?;

    let intent_threshold = raw.intent_threshold.unwrap_or(DEFAULT_INTENT_THRESHOLD);
    if !(0.0..=1.0).contains(&intent_threshold) {
        return Err(ConfigError::Validation(format!(
            "guide.intent_threshold must be in [0, 1], got {intent_threshold}"
        )));
    }

    let greeting = raw
        .greeting
        .or(defaults.greeting)
        .ok_or_else(|| ConfigError::Validation("guide.greeting is required".to_string()))?;
    let menu = raw
        .menu
        .or(defaults.menu)
        .ok_or_else(|| ConfigError::Validation("guide.menu is required".to_string()))?;

    // Built-in FAQ first, then user entries.
    let mut faq_raw = if raw.use_default_faq != Some(false) {
        defaults.faq
    } else {
        Vec::new()
    };
    faq_raw.extend(raw.faq);

    let faq = faq_raw
        .iter()
        .enumerate()
        .map(|(i, rule)| build_rule(&format!("guide.faq[{i}]"), rule))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GuideConfig {
        intent_threshold,
        greeting: build_rule("guide.greeting", &greeting)?,
        menu: build_rule("guide.menu", &menu)?,
        faq,
    })
}

fn build_rule(name: &str, raw: &raw::RawGuideRule) -> Result<GuideRule, ConfigError> {
    if raw.patterns.is_empty() && raw.intents.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{name} needs at least one pattern or intent"
        )));
    }
    if raw.text.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{name} has an empty answer")));
    }
    Ok(GuideRule {
        patterns: CompiledPattern::compile_all(&raw.patterns)?,
        intents: raw.intents.clone(),
        reply: raw.text.clone(),
        widget: raw.widget.clone(),
    })
}
