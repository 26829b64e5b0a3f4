// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Chat session controller
//
// Owns one conversation's link to the backend: the lazily bootstrapped
// session id, the streaming request for each turn, and the non-streaming
// call used for fallback.

use crate::config::{ApiConfig, Config, StreamConfig, UserContext};
use crate::http::{HttpBody, HttpError, HttpRequest, HttpSender};
use crate::stream::{ChatEvent, ChatEventClassifier, EventStreamProcessor, StreamError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Typed events of one streaming turn, in arrival order.
///
/// Ends after the sentinel or at end of input. A read failure is delivered
/// as a final `Err(StreamError::Aborted)`.
pub type ChatEventStream = ReceiverStream<Result<ChatEvent, StreamError>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the buffered (non-streaming) endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat request could not be sent: {0}")]
    Transport(#[from] HttpError),

    #[error("chat request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode chat response: {0}")]
    Decode(String),
}

/// Error returned by an [`EventHandler`]. Logged, never fatal to the stream.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback-style consumer for streamed events.
pub trait EventHandler: Send {
    fn handle(&mut self, event: ChatEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: FnMut(ChatEvent) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, event: ChatEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody<'a> {
    message: &'a str,
    session_id: &'a str,
    user_id: &'a str,
    user_name: &'a str,
    user_role: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequestBody<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct SessionResponseBody {
    #[serde(rename = "sessionId", alias = "session_id")]
    session_id: String,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    message: String,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Backend link for one conversation.
pub struct ChatClient {
    http: Arc<dyn HttpSender>,
    api: ApiConfig,
    user: UserContext,
    stream: StreamConfig,
    session_id: OnceCell<String>,
}

impl ChatClient {
    pub fn new(
        http: Arc<dyn HttpSender>,
        api: ApiConfig,
        user: UserContext,
        stream: StreamConfig,
    ) -> Self {
        Self {
            http,
            api,
            user,
            stream,
            session_id: OnceCell::new(),
        }
    }

    pub fn from_config(http: Arc<dyn HttpSender>, config: &Config) -> Self {
        Self::new(
            http,
            config.api.clone(),
            config.user.clone(),
            config.stream.clone(),
        )
    }

    /// The session id if one has been established.
    pub fn current_session_id(&self) -> Option<&str> {
        self.session_id.get().map(String::as_str)
    }

    /// The conversation's session id, bootstrapped on first use.
    ///
    /// Concurrent first callers share one bootstrap request. If bootstrap
    /// fails, a local id is generated once and kept for the conversation.
    pub async fn session_id(&self) -> &str {
        self.session_id
            .get_or_init(|| self.bootstrap_session())
            .await
            .as_str()
    }

    async fn bootstrap_session(&self) -> String {
        match self.request_session().await {
            Ok(id) => {
                tracing::info!(session_id = %id, "chat session established");
                id
            }
            Err(e) => {
                let id = local_session_id();
                tracing::warn!(error = %e, session_id = %id, "session bootstrap failed, using local id");
                id
            }
        }
    }

    async fn request_session(&self) -> Result<String, ChatError> {
        let body = SessionRequestBody {
            user_id: &self.user.user_id,
        };
        let request = HttpRequest::post_json(self.api.session_url(), &body)?
            .with_timeout_ms(Some(self.api.timeout_ms));
        let bytes = self.send_buffered(request).await?;
        let parsed: SessionResponseBody =
            serde_json::from_slice(&bytes).map_err(|e| ChatError::Decode(e.to_string()))?;
        if parsed.session_id.trim().is_empty() {
            return Err(ChatError::Decode("empty sessionId".to_string()));
        }
        Ok(parsed.session_id)
    }

    /// Issue the streaming request and return its typed event stream.
    ///
    /// Fails before any event is produced if the request cannot be sent,
    /// the status is not a success, or the transport has no streaming body.
    pub async fn open_stream(
        &self,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream, StreamError> {
        let session_id = self.session_id().await;
        let request = HttpRequest::post_json(self.api.stream_url(), &self.request_body(message, session_id))?
            .streaming();

        let response = self.http.send(request).await?;
        let status = response.status;

        if !status.is_success() {
            let body = response.body.into_bytes().await.unwrap_or_default();
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(status = status.as_u16(), session_id, "stream request rejected");
            return Err(StreamError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let stream = match response.body {
            HttpBody::Stream(stream) => stream,
            HttpBody::Full(_) => return Err(StreamError::Unsupported),
        };

        tracing::debug!(session_id, "stream opened");
        let events = EventStreamProcessor::new(ChatEventClassifier)
            .with_capacity(self.stream.channel_capacity)
            .with_max_frame_bytes(self.stream.max_frame_bytes)
            .with_idle_timeout(self.stream.idle_timeout())
            .with_cancellation(cancel)
            .process(stream);
        Ok(events)
    }

    /// Stream a message into a callback handler.
    ///
    /// Handler errors are logged and the stream continues. Returns the
    /// stream's own failure, if any, after every earlier event was handled.
    pub async fn stream_message(
        &self,
        message: &str,
        handler: &mut impl EventHandler,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        let mut events = self.open_stream(message, cancel).await?;
        while let Some(item) = events.next().await {
            let event = item?;
            let kind = event.kind.clone();
            if let Err(e) = handler.handle(event) {
                tracing::warn!(error = %e, kind = ?kind, "event handler failed");
            }
        }
        Ok(())
    }

    /// Non-streaming chat call. Returns the reply text.
    pub async fn send_message(&self, message: &str) -> Result<String, ChatError> {
        let session_id = self.session_id().await;
        let request = HttpRequest::post_json(self.api.chat_url(), &self.request_body(message, session_id))?
            .with_timeout_ms(Some(self.api.timeout_ms));
        let bytes = self.send_buffered(request).await?;
        let parsed: ChatResponseBody =
            serde_json::from_slice(&bytes).map_err(|e| ChatError::Decode(e.to_string()))?;
        Ok(parsed.message)
    }

    async fn send_buffered(&self, request: HttpRequest) -> Result<bytes::Bytes, ChatError> {
        let response = self.http.send(request).await?;
        let status = response.status;
        let body = response.body.into_bytes().await?;
        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }

    fn request_body<'a>(&'a self, message: &'a str, session_id: &'a str) -> ChatRequestBody<'a> {
        ChatRequestBody {
            message,
            session_id,
            user_id: &self.user.user_id,
            user_name: &self.user.user_name,
            user_role: &self.user.user_role,
        }
    }
}

/// Session id used when the backend could not issue one.
fn local_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("local-{millis}-{}", &suffix[..8])
}
