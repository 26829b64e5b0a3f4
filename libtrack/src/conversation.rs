// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Conversation driver
//
// One Conversation per chat window. It owns the backend client (and with it
// the session id), the transcript, and the busy flag, and runs each turn
// end to end: local guidance first, then streaming with fallback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::ChatClient;
use crate::config::{Config, Notices};
use crate::guide::{GuideRouter, NlpParse, ReplyKind};
use crate::http::HttpSender;
use crate::message::{ConversationMessage, Transcript};
use crate::reconcile::{JsonShapeDetector, NextStep, Resolution, ToolCallDetector, TurnMachine};

/// Why a message was not accepted. Every other failure ends up in the
/// transcript instead.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("a turn is already in progress")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Answered by local guidance; the backend was not contacted.
    Local(ReplyKind),
    /// Went to the backend and ended this way.
    Resolved(Resolution),
}

/// Clears the busy flag when the turn ends, including when the turn future
/// is dropped mid-flight.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Conversation {
    client: ChatClient,
    transcript: Transcript,
    router: GuideRouter,
    notices: Notices,
    detector: Box<dyn ToolCallDetector>,
    streaming: bool,
    busy: AtomicBool,
    turns: AtomicU64,
}

impl Conversation {
    pub fn new(http: Arc<dyn HttpSender>, config: &Config) -> Self {
        Self {
            client: ChatClient::from_config(http, config),
            transcript: Transcript::new(),
            router: GuideRouter::new(config.guide.clone()),
            notices: config.notices.clone(),
            detector: Box::new(JsonShapeDetector::new(config.stream.tool_call_keys.clone())),
            streaming: true,
            busy: AtomicBool::new(false),
            turns: AtomicU64::new(0),
        }
    }

    /// Replace the tool-call heuristic.
    pub fn with_detector(mut self, detector: impl ToolCallDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Use the non-streaming endpoint for every turn.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversationMessage>> {
        self.transcript.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run one turn to completion.
    pub async fn submit(
        &self,
        message: &str,
        nlp: Option<&NlpParse>,
    ) -> Result<TurnOutcome, TurnError> {
        self.submit_cancellable(message, nlp, CancellationToken::new())
            .await
    }

    /// Run one turn; firing `cancel` abandons it and drops the placeholder.
    pub async fn submit_cancellable(
        &self,
        message: &str,
        nlp: Option<&NlpParse>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        let _busy = BusyGuard::acquire(&self.busy).ok_or(TurnError::Busy)?;
        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;

        self.transcript.push_user(message);

        if let Some(reply) = self.router.route(message, nlp) {
            self.transcript.push_assistant(reply.text, reply.widget);
            tracing::info!(turn, kind = ?reply.kind, "turn answered locally");
            return Ok(TurnOutcome::Local(reply.kind));
        }

        let mut machine = TurnMachine::new(
            &self.transcript,
            &self.notices,
            self.detector.as_ref(),
            message,
        );
        let resolution = if self.streaming {
            self.run_streaming(&mut machine, &cancel).await
        } else {
            machine.begin_direct();
            self.run_fallback(&mut machine, &cancel).await
        };

        tracing::info!(
            turn,
            session_id = self.client.current_session_id().unwrap_or_default(),
            streamed = machine.streamed(),
            resolution = resolution.as_str(),
            "turn resolved"
        );
        Ok(TurnOutcome::Resolved(resolution))
    }

    async fn run_streaming(
        &self,
        machine: &mut TurnMachine<'_>,
        cancel: &CancellationToken,
    ) -> Resolution {
        machine.begin_streaming();
        let message = machine.user_message().to_string();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return machine.cancel(),
            opened = self.client.open_stream(&message, cancel.child_token()) => opened,
        };

        let step = match opened {
            Err(e) => machine.on_stream_failed(&e),
            Ok(mut events) => loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return machine.cancel(),
                    item = events.next() => item,
                };
                match item {
                    Some(Ok(event)) => {
                        tracing::debug!(kind = ?event.kind, "chat event");
                        if let Some(resolution) = machine.on_event(&event) {
                            break NextStep::Done(resolution);
                        }
                    }
                    Some(Err(e)) => break machine.on_stream_failed(&e),
                    None => break machine.on_stream_end(),
                }
            },
        };

        match step {
            NextStep::Done(resolution) => resolution,
            NextStep::Fallback => self.run_fallback(machine, cancel).await,
        }
    }

    async fn run_fallback(
        &self,
        machine: &mut TurnMachine<'_>,
        cancel: &CancellationToken,
    ) -> Resolution {
        let message = machine.user_message().to_string();
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return machine.cancel(),
            reply = self.client.send_message(&message) => reply,
        };
        machine.resolve_fallback(reply)
    }
}
