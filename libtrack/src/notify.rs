// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Notification feed
//
// Same framing as the chat stream, different payloads: each frame carries
// one user notification. Keep-alives are skipped and `[DONE]` closes the feed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::http::HttpError;
use crate::stream::{
    preview, Classified, EventStreamProcessor, FrameClassifier, StreamError, StreamFrame,
    DONE_SENTINEL,
};

/// A user-facing notice pushed by the backend (due dates, approvals, holds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(flatten)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Classifies frames of the notification feed.
///
/// Accepts payloads typed `notification` or untyped; `ping` and `heartbeat`
/// frames and any other type are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationClassifier;

impl FrameClassifier for NotificationClassifier {
    type Event = Notification;

    fn classify(&self, frame: &StreamFrame) -> Classified<Notification> {
        let Some(payload) = frame.payload() else {
            return Classified::Skip;
        };
        if payload == DONE_SENTINEL {
            return Classified::Done;
        }

        let mut value: serde_json::Value = match serde_json::from_str(&payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, payload = %preview(&payload), "dropping unparsable notification");
                return Classified::Skip;
            }
        };

        let Some(obj) = value.as_object_mut() else {
            tracing::warn!(payload = %preview(&payload), "dropping non-object notification");
            return Classified::Skip;
        };
        match obj.remove("type") {
            None => {}
            Some(serde_json::Value::String(t)) if t == "notification" => {}
            Some(other) => {
                tracing::debug!(kind = %other, "skipping non-notification frame");
                return Classified::Skip;
            }
        }

        match serde_json::from_value::<Notification>(value) {
            Ok(n) => Classified::Event(n),
            Err(e) => {
                tracing::warn!(error = %e, payload = %preview(&payload), "dropping malformed notification");
                Classified::Skip
            }
        }
    }
}

/// Decode a notification feed body into notifications, in arrival order.
pub fn notification_stream(
    input: impl Stream<Item = Result<Bytes, HttpError>> + Unpin + Send + 'static,
    cancel: CancellationToken,
) -> ReceiverStream<Result<Notification, StreamError>> {
    EventStreamProcessor::new(NotificationClassifier)
        .with_cancellation(cancel)
        .process(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio_stream::StreamExt;

    fn frame(raw: &str) -> StreamFrame {
        StreamFrame::from_raw(raw)
    }

    #[test]
    fn parses_notification() {
        let c = NotificationClassifier;
        let out = c.classify(&frame(
            r#"data: {"type":"notification","id":"n1","title":"Due soon","message":"Dune is due tomorrow","createdAt":"2026-03-01T10:00:00Z","itemId":"b7"}"#,
        ));
        let Classified::Event(n) = out else {
            panic!("expected event, got {out:?}");
        };
        assert_eq!(n.id, "n1");
        assert_eq!(n.title, "Due soon");
        assert!(!n.read);
        assert!(n.created_at.is_some());
        assert_eq!(n.meta.get("itemId").and_then(|v| v.as_str()), Some("b7"));
        assert!(!n.meta.contains_key("type"));
    }

    #[test]
    fn untyped_payload_accepted() {
        let out = NotificationClassifier.classify(&frame(r#"data: {"id":"2","message":"Approved"}"#));
        assert!(matches!(out, Classified::Event(_)));
    }

    #[test]
    fn heartbeats_and_garbage_skipped() {
        let c = NotificationClassifier;
        assert_eq!(c.classify(&frame(r#"data: {"type":"ping"}"#)), Classified::Skip);
        assert_eq!(c.classify(&frame(r#"data: {"type":"heartbeat"}"#)), Classified::Skip);
        assert_eq!(c.classify(&frame("data: {oops")), Classified::Skip);
        assert_eq!(c.classify(&frame("data: [1,2]")), Classified::Skip);
        assert_eq!(c.classify(&frame(": keep-alive")), Classified::Skip);
        assert_eq!(c.classify(&frame(r#"data: {"id":"3"}"#)), Classified::Skip);
        assert_eq!(c.classify(&frame("data: [DONE]")), Classified::Done);
    }

    #[tokio::test]
    async fn feed_stops_at_sentinel() {
        let chunks: Vec<Result<Bytes, HttpError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"ping\"}\n\ndata: {\"id\":\"1\",\"mess")),
            Ok(Bytes::from_static(b"age\":\"Hold ready\"}\n\ndata: [DONE]\n\n")),
            Ok(Bytes::from_static(b"data: {\"id\":\"2\",\"message\":\"late\"}\n\n")),
        ];
        let items: Vec<_> = notification_stream(stream::iter(chunks), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().message, "Hold ready");
    }
}
