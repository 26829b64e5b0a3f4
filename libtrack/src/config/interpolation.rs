// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::error::ConfigError;

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // ${NAME} or ${NAME:-fallback}
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .unwrap_or_else(|e| unreachable!("variable pattern is a literal: {e}"))
    })
}

/// Resolves `${VAR}` and `${VAR:-default}` references from the environment.
///
/// A reference without a default to an unset variable is an error.
/// Anything that is not a well-formed reference is kept literally.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

/// Same as [`resolve_variables`] with an injectable lookup.
pub fn resolve_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;
    let resolved = variable_pattern().replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(ConfigError::UndefinedVariable { name }),
        None => Ok(resolved.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "API_HOST" => Some("library.example.edu".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_defined_variable() {
        let out = resolve_with("https://${API_HOST}/api", env).unwrap();
        assert_eq!(out, "https://library.example.edu/api");
    }

    #[test]
    fn uses_default_when_unset() {
        let out = resolve_with("${LIBTRACK_PORT:-8080}", env).unwrap();
        assert_eq!(out, "8080");
    }

    #[test]
    fn defined_empty_value_wins_over_default() {
        let out = resolve_with("[${EMPTY:-x}]", env).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn undefined_without_default_is_error() {
        match resolve_with("${NOPE}", env) {
            Err(ConfigError::UndefinedVariable { name }) => assert_eq!(name, "NOPE"),
            other => panic!("expected undefined variable, got {other:?}"),
        }
    }

    #[test]
    fn malformed_reference_kept_literally() {
        let out = resolve_with("cost: ${ and $API_HOST", env).unwrap();
        assert_eq!(out, "cost: ${ and $API_HOST");
    }
}
