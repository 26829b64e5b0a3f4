// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Local guidance
//
// Greeting, menu, and FAQ turns are answered from config without touching
// the chat backend. Matching uses the message text and, when the caller has
// one, the already-parsed output of the external NLP service.

use serde::{Deserialize, Serialize};

use crate::config::{GuideConfig, GuideRule};

// ---------------------------------------------------------------------------
// NLP parse
// ---------------------------------------------------------------------------

/// Output of the external intent classifier for one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NlpParse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub entities: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub traits: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub confidence: f64,
}

impl NlpParse {
    /// Highest-confidence intent at or above `threshold`.
    pub fn top_intent(&self, threshold: f64) -> Option<&Intent> {
        self.intents
            .iter()
            .filter(|i| i.confidence >= threshold)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Greeting,
    Menu,
    Faq,
}

/// An answer produced without the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReply {
    pub kind: ReplyKind,
    pub text: String,
    pub widget: Option<String>,
}

pub struct GuideRouter {
    config: GuideConfig,
}

impl GuideRouter {
    pub fn new(config: GuideConfig) -> Self {
        Self { config }
    }

    /// Answer locally if greeting, menu, or an FAQ entry matches, checked
    /// in that order. `None` sends the turn to the chat backend.
    pub fn route(&self, message: &str, nlp: Option<&NlpParse>) -> Option<LocalReply> {
        let text = message.trim();
        let intent = nlp
            .and_then(|p| p.top_intent(self.config.intent_threshold))
            .map(|i| i.name.as_str());

        let candidates = [
            (ReplyKind::Greeting, &self.config.greeting),
            (ReplyKind::Menu, &self.config.menu),
        ]
        .into_iter()
        .chain(self.config.faq.iter().map(|rule| (ReplyKind::Faq, rule)));

        for (kind, rule) in candidates {
            if rule_matches(rule, text, intent) {
                tracing::debug!(kind = ?kind, intent, "answered locally");
                return Some(LocalReply {
                    kind,
                    text: rule.reply.clone(),
                    widget: rule.widget.clone(),
                });
            }
        }
        None
    }
}

fn rule_matches(rule: &GuideRule, text: &str, intent: Option<&str>) -> bool {
    if let Some(name) = intent {
        if rule.intents.iter().any(|i| i.eq_ignore_ascii_case(name)) {
            return true;
        }
    }
    rule.patterns.iter().any(|p| p.is_match(text))
}
