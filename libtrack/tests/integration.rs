// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end turns through the real reqwest transport:
// message -> session bootstrap -> streaming request -> SSE decode ->
// reconciliation -> transcript
//
// wiremock stands in for the Lib-Track chat backend.

use std::sync::Arc;

use libtrack::config::{self, StringSource};
use libtrack::conversation::{Conversation, TurnOutcome};
use libtrack::http::ReqwestHttpSender;
use libtrack::reconcile::Resolution;
use tokio_util::sync::CancellationToken;
use tokio_stream::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

fn config_yaml(base_url: &str) -> String {
    format!(
        r#"libtrack: v1
api:
  base_url: "{base_url}"
  timeout_ms: 2000
user:
  id: "1001"
  name: "Grace"
  role: student
"#
    )
}

fn conversation(server: &MockServer) -> Conversation {
    let config = config::load_config(&StringSource::new(config_yaml(&server.uri()))).unwrap();
    let http = Arc::new(ReqwestHttpSender::new(reqwest::Client::new()));
    Conversation::new(http, &config)
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn mount_session(server: &MockServer, session_id: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/chat/session"))
        .and(body_partial_json(serde_json::json!({"userId": "1001"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"sessionId": session_id})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn texts(conv: &Conversation) -> Vec<String> {
    conv.transcript()
        .snapshot()
        .into_iter()
        .map(|m| m.text)
        .collect()
}

const QUESTION: &str = "Do you have any books on orbital mechanics?";

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streamed_answer_lands_in_one_message() {
    let server = MockServer::start().await;
    mount_session(&server, "sess-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({
            "message": QUESTION,
            "sessionId": "sess-1",
            "userId": "1001",
            "userName": "Grace",
            "userRole": "student",
        })))
        .respond_with(sse(concat!(
            "data: {\"type\":\"session\",\"sessionId\":\"sess-1\"}\n\n",
            ": keep-alive\n\n",
            "data: {\"type\":\"content\",\"content\":\"Two titles \"}\n\n",
            "data: {broken json\n\n",
            "data: {\"type\":\"content\",\"content\":\"are on shelf 5B.\"}\n\n",
            "data: [DONE]\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    let outcome = conv.submit(QUESTION, None).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Resolved(Resolution::Success));
    assert_eq!(texts(&conv), vec![QUESTION, "Two titles are on shelf 5B."]);
}

#[tokio::test]
async fn events_after_sentinel_are_ignored() {
    let server = MockServer::start().await;
    mount_session(&server, "sess-2", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(sse(concat!(
            "data: {\"type\":\"content\",\"content\":\"chunk1\"}\n\n",
            "data: [DONE]\n\n",
            "data: {\"type\":\"content\",\"content\":\"chunk2\"}\n\n",
        )))
        .mount(&server)
        .await;

    let conv = conversation(&server);
    let events: Vec<_> = conv
        .client()
        .open_stream(QUESTION, CancellationToken::new())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].as_ref().unwrap().content.as_deref(),
        Some("chunk1")
    );
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_triggers_exactly_one_fallback() {
    let server = MockServer::start().await;
    mount_session(&server, "sess-3", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"message": QUESTION, "sessionId": "sess-3"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"message": "Try the 500s section."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    let outcome = conv.submit(QUESTION, None).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Resolved(Resolution::Fallback));
    assert_eq!(texts(&conv), vec![QUESTION, "Try the 500s section."]);
}

#[tokio::test]
async fn fallback_failure_shows_error_notice() {
    let server = MockServer::start().await;
    mount_session(&server, "sess-4", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    let outcome = conv.submit(QUESTION, None).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Resolved(Resolution::Failed));
    let last = conv.transcript().last().unwrap();
    assert_eq!(last.text, config::Notices::default().error);
    assert!(!last.pending);
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_bootstrapped_once_across_turns() {
    let server = MockServer::start().await;
    mount_session(&server, "sess-5", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(body_partial_json(serde_json::json!({"sessionId": "sess-5"})))
        .respond_with(sse(
            "data: {\"type\":\"content\",\"content\":\"ok\"}\n\ndata: [DONE]\n\n",
        ))
        .expect(3)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    for question in ["first question", "second question", "third question"] {
        let outcome = conv.submit(question, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Resolved(Resolution::Success));
    }
    assert_eq!(conv.client().current_session_id(), Some("sess-5"));
}

#[tokio::test]
async fn failed_bootstrap_reuses_local_session_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/session"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(sse(
            "data: {\"type\":\"content\",\"content\":\"ok\"}\n\ndata: [DONE]\n\n",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    conv.submit("first question", None).await.unwrap();
    conv.submit("second question", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let session_ids: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/chat/stream")
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["sessionId"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(session_ids.len(), 2);
    assert!(session_ids[0].starts_with("local-"));
    assert_eq!(session_ids[0], session_ids[1]);
}

// ---------------------------------------------------------------------------
// Local guidance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn faq_answered_without_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let conv = conversation(&server);
    let outcome = conv
        .submit("How many books can I borrow?", None)
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Local(_)));
    assert_eq!(conv.transcript().len(), 2);
}
