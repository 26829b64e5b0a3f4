// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::{Regex, RegexBuilder};

use super::error::ConfigError;

/// A pre-compiled guidance pattern with its source text kept for display.
///
/// Patterns match case-insensitively; chat users do not capitalize
/// consistently.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    /// Compile a pattern, returning `ConfigError::InvalidRegex` on failure.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source: e,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Compile every pattern in order, stopping at the first invalid one.
    pub fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Self>, ConfigError> {
        patterns.iter().map(|p| Self::compile(p.as_ref())).collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPattern").field(&self.pattern).finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        let p = CompiledPattern::compile(r"\bopening hours\b").unwrap();
        assert!(p.is_match("What are the Opening Hours?"));
        assert!(!p.is_match("closing time"));
    }

    #[test]
    fn invalid_pattern_reports_source() {
        match CompiledPattern::compile("(unclosed") {
            Err(ConfigError::InvalidRegex { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected invalid regex, got {other:?}"),
        }
    }

    #[test]
    fn compile_all_preserves_order() {
        let compiled = CompiledPattern::compile_all(&["a", "b"]).unwrap();
        let sources: Vec<_> = compiled.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(sources, vec!["a", "b"]);
    }
}
