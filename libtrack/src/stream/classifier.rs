// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Frame classifiers
//
// Decide what each complete frame means for its channel: a typed event,
// the end-of-stream sentinel, or nothing at all. The frame decoder is
// shared; only this step differs between the chat stream and the
// notification feed.

use super::types::{ChatEvent, Classified, StreamFrame, DONE_SENTINEL};

/// Longest payload excerpt written to logs for a dropped frame.
const LOG_PREVIEW_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Trait: FrameClassifier
// ---------------------------------------------------------------------------

/// Interprets frames for one channel.
pub trait FrameClassifier: Send + Sync + 'static {
    type Event: Send + 'static;

    fn classify(&self, frame: &StreamFrame) -> Classified<Self::Event>;
}

// ---------------------------------------------------------------------------
// Chat classifier
// ---------------------------------------------------------------------------

/// Classifies frames of the chat response stream.
///
/// - `data: [DONE]` -> Done
/// - `data: {"type":"content","content":"Hi"}` -> Event(ChatEvent)
/// - `: keep-alive` (no data lines) -> Skip
/// - `data: {not json` -> Skip, logged
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatEventClassifier;

impl FrameClassifier for ChatEventClassifier {
    type Event = ChatEvent;

    fn classify(&self, frame: &StreamFrame) -> Classified<ChatEvent> {
        let Some(payload) = frame.payload() else {
            return Classified::Skip;
        };

        if payload == DONE_SENTINEL {
            return Classified::Done;
        }

        match serde_json::from_str::<ChatEvent>(&payload) {
            Ok(event) => Classified::Event(event),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %preview(&payload),
                    "dropping frame with unparsable payload"
                );
                Classified::Skip
            }
        }
    }
}

/// Shorten a payload for log output.
pub(crate) fn preview(payload: &str) -> String {
    if payload.chars().count() <= LOG_PREVIEW_CHARS {
        return payload.to_string();
    }
    let mut out: String = payload.chars().take(LOG_PREVIEW_CHARS).collect();
    out.push('…');
    out
}
