// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Transcript reconciliation
//
// One TurnMachine per user turn. It is the only writer of the transcript
// while the turn runs and decides, for every streamed event, whether to
// create, append, replace, or suppress a message. It also owns the failure
// policy: fallback before content, interrupted notice after content.

use crate::config::{Notices, DEFAULT_TOOL_CALL_KEYS};
use crate::message::{MessageId, Transcript};
use crate::stream::{ChatEvent, EventKind, StreamError};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Streamed content arrived and the stream ended cleanly.
    Success,
    /// The answer came from the non-streaming endpoint.
    Fallback,
    /// The stream broke after partial content was shown.
    Interrupted,
    /// The stream carried only tool invocations; the notice stays.
    Suppressed,
    /// The backend reported an error, or no answer could be obtained.
    Failed,
    /// The turn was cancelled by the caller.
    Cancelled,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Success => "success",
            Resolution::Fallback => "fallback",
            Resolution::Interrupted => "interrupted",
            Resolution::Suppressed => "suppressed",
            Resolution::Failed => "failed",
            Resolution::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingFirstContent,
    Streaming,
    Resolved(Resolution),
}

/// What the caller must do after the stream stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// The turn is resolved; nothing left to do.
    Done(Resolution),
    /// Issue the non-streaming request and pass its result to
    /// [`TurnMachine::resolve_fallback`].
    Fallback,
}

// ---------------------------------------------------------------------------
// Trait: ToolCallDetector
// ---------------------------------------------------------------------------

/// Recognizes content chunks that are leaked tool invocations rather than
/// prose meant for the user.
pub trait ToolCallDetector: Send + Sync {
    fn is_tool_call(&self, content: &str) -> bool;
}

/// Treats JSON objects (or arrays holding objects) carrying any of a set of
/// keys as tool invocations.
#[derive(Debug, Clone)]
pub struct JsonShapeDetector {
    keys: Vec<String>,
}

impl JsonShapeDetector {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    fn has_marker_key(&self, value: &serde_json::Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| self.keys.iter().any(|k| obj.contains_key(k)))
    }
}

impl Default for JsonShapeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_CALL_KEYS.iter().copied())
    }
}

impl ToolCallDetector for JsonShapeDetector {
    fn is_tool_call(&self, content: &str) -> bool {
        let trimmed = content.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return false;
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Array(items)) => items.iter().any(|v| self.has_marker_key(v)),
            Ok(value) => self.has_marker_key(&value),
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TurnMachine
// ---------------------------------------------------------------------------

/// Per-turn reconciliation state.
pub struct TurnMachine<'a> {
    transcript: &'a Transcript,
    notices: &'a Notices,
    detector: &'a dyn ToolCallDetector,
    state: TurnState,
    user_message: String,
    streamed: bool,
    saw_content: bool,
    partial: String,
    /// Assistant message currently receiving appended chunks.
    open_message: Option<MessageId>,
    /// Transient entry (typing indicator or tool notice) to be replaced.
    pending_slot: Option<MessageId>,
    tool_notice_shown: bool,
}

impl<'a> TurnMachine<'a> {
    pub fn new(
        transcript: &'a Transcript,
        notices: &'a Notices,
        detector: &'a dyn ToolCallDetector,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            transcript,
            notices,
            detector,
            state: TurnState::Idle,
            user_message: user_message.into(),
            streamed: false,
            saw_content: false,
            partial: String::new(),
            open_message: None,
            pending_slot: None,
            tool_notice_shown: false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, TurnState::Resolved(_))
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self.state {
            TurnState::Resolved(r) => Some(r),
            _ => None,
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Whether the streaming endpoint was used for this turn.
    pub fn streamed(&self) -> bool {
        self.streamed
    }

    pub fn saw_content(&self) -> bool {
        self.saw_content
    }

    /// All genuine content received so far, concatenated.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Show the typing placeholder and wait for streamed events.
    pub fn begin_streaming(&mut self) {
        self.streamed = true;
        self.begin();
    }

    /// Show the typing placeholder for a non-streaming turn. The answer is
    /// passed to [`resolve_fallback`](Self::resolve_fallback).
    pub fn begin_direct(&mut self) {
        self.streamed = false;
        self.begin();
    }

    fn begin(&mut self) {
        if self.state != TurnState::Idle {
            return;
        }
        self.pending_slot = Some(self.transcript.push_pending(&self.notices.typing));
        self.state = TurnState::AwaitingFirstContent;
    }

    /// Apply one streamed event. Returns the resolution if the event ended
    /// the turn.
    pub fn on_event(&mut self, event: &ChatEvent) -> Option<Resolution> {
        if self.is_resolved() {
            tracing::debug!(kind = ?event.kind, "ignoring event after turn resolved");
            return None;
        }

        match &event.kind {
            Some(EventKind::Content) => {
                let text = event.content.as_deref().unwrap_or_default();
                if text.is_empty() {
                    return None;
                }
                if self.detector.is_tool_call(text) {
                    self.on_tool_call();
                } else {
                    self.on_content(text);
                }
                None
            }
            Some(EventKind::Error) => Some(self.on_error(event.content.as_deref())),
            other => {
                tracing::debug!(kind = ?other, "non-content event");
                None
            }
        }
    }

    fn on_content(&mut self, text: &str) {
        self.saw_content = true;
        self.partial.push_str(text);

        if let Some(slot) = self.pending_slot.take() {
            let id = self
                .transcript
                .replace(slot, text, None)
                .unwrap_or_else(|| self.transcript.push_assistant(text, None));
            self.open_message = Some(id);
        } else {
            let appended = self
                .open_message
                .is_some_and(|id| self.transcript.append_if_last(id, text));
            if !appended {
                self.open_message = Some(self.transcript.push_assistant(text, None));
            }
        }
        self.state = TurnState::Streaming;
    }

    fn on_tool_call(&mut self) {
        self.open_message = None;
        if self.tool_notice_shown {
            tracing::debug!("dropping repeated tool invocation");
            return;
        }
        self.tool_notice_shown = true;

        let notice = &self.notices.invoking_tools;
        let id = match self.pending_slot {
            Some(slot) => self
                .transcript
                .replace_pending(slot, notice)
                .unwrap_or_else(|| self.transcript.push_pending(notice)),
            None => self.transcript.push_pending(notice),
        };
        self.pending_slot = Some(id);
    }

    fn on_error(&mut self, detail: Option<&str>) -> Resolution {
        tracing::warn!(detail = detail.unwrap_or_default(), "backend reported an error");
        self.drop_pending_slot();
        self.open_message = None;
        self.transcript.push_assistant(&self.notices.error, None);
        self.resolve(Resolution::Failed)
    }

    /// The stream ended without error.
    pub fn on_stream_end(&mut self) -> NextStep {
        if let Some(r) = self.resolution() {
            return NextStep::Done(r);
        }
        if self.saw_content {
            self.drop_pending_slot();
            return NextStep::Done(self.resolve(Resolution::Success));
        }
        if self.tool_notice_shown {
            if let Some(slot) = self.pending_slot.take() {
                self.transcript.settle(slot);
            }
            return NextStep::Done(self.resolve(Resolution::Suppressed));
        }
        NextStep::Fallback
    }

    /// The stream could not be opened or broke while reading.
    pub fn on_stream_failed(&mut self, error: &StreamError) -> NextStep {
        if let Some(r) = self.resolution() {
            return NextStep::Done(r);
        }
        if self.saw_content {
            tracing::warn!(error = %error, "stream interrupted after partial content");
            self.drop_pending_slot();
            self.open_message = None;
            self.transcript.push_assistant(&self.notices.interrupted, None);
            return NextStep::Done(self.resolve(Resolution::Interrupted));
        }
        tracing::warn!(error = %error, "stream failed before content, falling back");
        NextStep::Fallback
    }

    /// Settle the turn with the non-streaming answer, or the failure notice
    /// if that call failed too.
    pub fn resolve_fallback<E: std::fmt::Display>(&mut self, reply: Result<String, E>) -> Resolution {
        if let Some(r) = self.resolution() {
            return r;
        }
        let (text, resolution) = match reply {
            Ok(text) if !text.trim().is_empty() => (text, Resolution::Fallback),
            Ok(_) => {
                tracing::warn!("fallback returned an empty reply");
                (self.notices.error.clone(), Resolution::Failed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "fallback request failed");
                (self.notices.error.clone(), Resolution::Failed)
            }
        };

        match self.pending_slot.take() {
            Some(slot) => {
                if self.transcript.replace(slot, &text, None).is_none() {
                    self.transcript.push_assistant(text, None);
                }
            }
            None => {
                self.transcript.push_assistant(text, None);
            }
        }
        self.open_message = None;
        self.resolve(resolution)
    }

    /// Abandon the turn. Partial content already shown stays.
    pub fn cancel(&mut self) -> Resolution {
        if let Some(r) = self.resolution() {
            return r;
        }
        self.drop_pending_slot();
        self.open_message = None;
        self.resolve(Resolution::Cancelled)
    }

    fn drop_pending_slot(&mut self) {
        if let Some(slot) = self.pending_slot.take() {
            self.transcript.remove(slot);
        }
    }

    fn resolve(&mut self, resolution: Resolution) -> Resolution {
        self.state = TurnState::Resolved(resolution);
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    struct Fixture {
        transcript: Transcript,
        notices: Notices,
        detector: JsonShapeDetector,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                transcript: Transcript::new(),
                notices: Notices::default(),
                detector: JsonShapeDetector::default(),
            }
        }

        fn machine(&self) -> TurnMachine<'_> {
            TurnMachine::new(&self.transcript, &self.notices, &self.detector, "question")
        }

        fn texts(&self) -> Vec<String> {
            self.transcript.snapshot().into_iter().map(|m| m.text).collect()
        }
    }

    const TOOL_PAYLOAD: &str = r#"{"name":"lookup_loans","arguments":{"user":"42"}}"#;

    // -- detector ---------------------------------------------------------

    #[test]
    fn detects_tool_shaped_json() {
        let d = JsonShapeDetector::default();
        assert!(d.is_tool_call(TOOL_PAYLOAD));
        assert!(d.is_tool_call(r#"  {"function": {"name": "x"}}  "#));
        assert!(d.is_tool_call(r#"[{"type":"function","id":"1"}]"#));
    }

    #[test]
    fn prose_and_plain_json_are_not_tool_calls() {
        let d = JsonShapeDetector::default();
        assert!(!d.is_tool_call("Hello there"));
        assert!(!d.is_tool_call("[1] see the catalog"));
        assert!(!d.is_tool_call(r#"{"title":"Dune"}"#));
        assert!(!d.is_tool_call("[1, 2, 3]"));
        assert!(!d.is_tool_call("{not json"));
    }

    #[test]
    fn custom_keys_replace_defaults() {
        let d = JsonShapeDetector::new(["action"]);
        assert!(d.is_tool_call(r#"{"action":"renew"}"#));
        assert!(!d.is_tool_call(r#"{"name":"renew"}"#));
    }

    // -- streaming --------------------------------------------------------

    #[test]
    fn begin_shows_typing_placeholder() {
        let f = Fixture::new();
        let mut m = f.machine();
        assert_eq!(m.state(), TurnState::Idle);
        m.begin_streaming();
        assert_eq!(m.state(), TurnState::AwaitingFirstContent);
        let last = f.transcript.last().unwrap();
        assert!(last.pending);
        assert_eq!(last.text, f.notices.typing);
    }

    #[test]
    fn first_content_replaces_placeholder_then_appends() {
        let f = Fixture::new();
        f.transcript.push_user("question");
        let mut m = f.machine();
        m.begin_streaming();

        m.on_event(&ChatEvent::content("Hel"));
        assert_eq!(m.state(), TurnState::Streaming);
        m.on_event(&ChatEvent::content("lo"));

        let messages = f.transcript.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text, "Hello");
        assert!(!messages[1].pending);
        assert_eq!(m.on_stream_end(), NextStep::Done(Resolution::Success));
        assert_eq!(m.partial(), "Hello");
    }

    #[test]
    fn content_after_widget_opens_new_message() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content("Hello"));
        f.transcript
            .push_assistant("Main menu", Some("main_menu".to_string()));
        m.on_event(&ChatEvent::content("More"));

        assert_eq!(f.texts(), vec!["Hello", "Main menu", "More"]);
    }

    #[test]
    fn session_and_info_events_are_no_ops() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::of_kind(EventKind::Session));
        m.on_event(&ChatEvent::of_kind(EventKind::Info));
        m.on_event(&ChatEvent::of_kind(EventKind::Other("usage".into())));
        assert_eq!(m.state(), TurnState::AwaitingFirstContent);
        assert_eq!(f.transcript.len(), 1);
    }

    #[test]
    fn empty_content_is_ignored() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content(""));
        assert!(!m.saw_content());
        assert_eq!(m.on_stream_end(), NextStep::Fallback);
    }

    // -- tool calls -------------------------------------------------------

    #[test]
    fn repeated_tool_calls_show_one_notice() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));

        assert_eq!(f.texts(), vec![f.notices.invoking_tools.clone()]);
        assert_eq!(m.state(), TurnState::AwaitingFirstContent);
        assert!(!m.saw_content());
    }

    #[test]
    fn tool_notice_replaced_by_following_content() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));
        m.on_event(&ChatEvent::content("You have 3 loans."));

        assert_eq!(f.texts(), vec!["You have 3 loans."]);
        assert_eq!(m.on_stream_end(), NextStep::Done(Resolution::Success));
    }

    #[test]
    fn tool_call_mid_stream_closes_open_span() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content("Checking"));
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));
        m.on_event(&ChatEvent::content("Done."));

        assert_eq!(f.texts(), vec!["Checking", "Done."]);
        assert_eq!(m.on_stream_end(), NextStep::Done(Resolution::Success));
        assert!(f.transcript.snapshot().iter().all(|msg| !msg.pending));
    }

    #[test]
    fn tool_only_stream_is_suppressed() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));

        assert_eq!(m.on_stream_end(), NextStep::Done(Resolution::Suppressed));
        let last = f.transcript.last().unwrap();
        assert_eq!(last.text, f.notices.invoking_tools);
        assert!(!last.pending);
    }

    // -- failures ---------------------------------------------------------

    #[test]
    fn error_event_is_terminal() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();

        assert_eq!(
            m.on_event(&ChatEvent::error("model overloaded")),
            Some(Resolution::Failed)
        );
        m.on_event(&ChatEvent::content("late"));

        assert_eq!(f.texts(), vec![f.notices.error.clone()]);
        assert_eq!(m.on_stream_end(), NextStep::Done(Resolution::Failed));
    }

    #[test]
    fn failure_after_content_is_interrupted_without_fallback() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content("Partial answ"));

        let step = m.on_stream_failed(&StreamError::Aborted("connection reset".into()));
        assert_eq!(step, NextStep::Done(Resolution::Interrupted));
        assert_eq!(
            f.texts(),
            vec!["Partial answ".to_string(), f.notices.interrupted.clone()]
        );
    }

    #[test]
    fn failure_before_content_requests_fallback() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();

        let step = m.on_stream_failed(&StreamError::RequestFailed {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(step, NextStep::Fallback);

        let resolution = m.resolve_fallback::<String>(Ok("Open 9 to 5.".into()));
        assert_eq!(resolution, Resolution::Fallback);
        assert_eq!(f.texts(), vec!["Open 9 to 5."]);
        assert!(!f.transcript.last().unwrap().pending);
    }

    #[test]
    fn fallback_replaces_tool_notice() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content(TOOL_PAYLOAD));

        assert_eq!(
            m.on_stream_failed(&StreamError::Aborted("eof".into())),
            NextStep::Fallback
        );
        m.resolve_fallback::<String>(Ok("Answer".into()));
        assert_eq!(f.texts(), vec!["Answer"]);
    }

    #[test]
    fn failed_fallback_shows_error_notice() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        assert_eq!(m.on_stream_end(), NextStep::Fallback);

        let resolution = m.resolve_fallback::<String>(Err("timeout".into()));
        assert_eq!(resolution, Resolution::Failed);
        assert_eq!(f.texts(), vec![f.notices.error.clone()]);
    }

    #[test]
    fn direct_turn_resolves_through_fallback() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_direct();
        assert!(!m.streamed());
        assert_eq!(
            m.resolve_fallback::<String>(Ok("Hi".into())),
            Resolution::Fallback
        );
        assert_eq!(f.texts(), vec!["Hi"]);
    }

    #[test]
    fn cancel_drops_placeholder_keeps_partial() {
        let f = Fixture::new();
        let mut m = f.machine();
        m.begin_streaming();
        m.on_event(&ChatEvent::content("Half"));
        assert_eq!(m.cancel(), Resolution::Cancelled);
        assert_eq!(f.texts(), vec!["Half"]);

        let g = Fixture::new();
        let mut m = g.machine();
        m.begin_streaming();
        m.cancel();
        assert!(g.transcript.is_empty());
        assert_eq!(m.resolve_fallback::<String>(Ok("late".into())), Resolution::Cancelled);
        assert!(g.transcript.is_empty());
    }
}
