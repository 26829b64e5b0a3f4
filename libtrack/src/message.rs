// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Conversation transcript
//
// The transcript is the only mutable state shared with the UI. It lives in
// a watch channel: every change is one read-modify-write on the current
// list, and observers always see a complete snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Transcript-unique message identifier.
pub type MessageId = u64;

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single displayed transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    /// Named interactive UI unit carried instead of, or alongside, text.
    pub widget: Option<String>,
    /// Transient entry (typing indicator, tool notice) awaiting replacement.
    pub pending: bool,
}

impl ConversationMessage {
    /// Whether streamed text may be appended to this message.
    pub fn is_appendable(&self) -> bool {
        self.role == Role::Assistant && self.widget.is_none() && !self.pending
    }
}

/// Observable, append-mostly list of conversation messages.
pub struct Transcript {
    messages: watch::Sender<Vec<ConversationMessage>>,
    next_id: AtomicU64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        let (messages, _) = watch::channel(Vec::new());
        Self {
            messages,
            next_id: AtomicU64::new(1),
        }
    }

    /// Receive a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversationMessage>> {
        self.messages.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        self.messages.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    pub fn last(&self) -> Option<ConversationMessage> {
        self.messages.borrow().last().cloned()
    }

    pub fn get(&self, id: MessageId) -> Option<ConversationMessage> {
        self.messages.borrow().iter().find(|m| m.id == id).cloned()
    }

    pub fn push_user(&self, text: impl Into<String>) -> MessageId {
        self.push(Role::User, text.into(), None, false)
    }

    pub fn push_assistant(&self, text: impl Into<String>, widget: Option<String>) -> MessageId {
        self.push(Role::Assistant, text.into(), widget, false)
    }

    /// Push a transient assistant entry (typing indicator, tool notice).
    pub fn push_pending(&self, text: impl Into<String>) -> MessageId {
        self.push(Role::Assistant, text.into(), None, true)
    }

    /// Replace message `id` in place with a settled assistant message.
    ///
    /// The replacement gets a new id so observers can tell it apart from the
    /// placeholder it took the place of. Returns `None` if `id` is gone.
    pub fn replace(&self, id: MessageId, text: impl Into<String>, widget: Option<String>) -> Option<MessageId> {
        let new_id = self.allocate_id();
        let text = text.into();
        let replaced = self.messages.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| m.id == id) {
                Some(slot) => {
                    *slot = ConversationMessage {
                        id: new_id,
                        role: Role::Assistant,
                        text,
                        widget,
                        pending: false,
                    };
                    true
                }
                None => false,
            }
        });
        replaced.then_some(new_id)
    }

    /// Replace message `id` with another transient entry.
    pub fn replace_pending(&self, id: MessageId, text: impl Into<String>) -> Option<MessageId> {
        let new_id = self.allocate_id();
        let text = text.into();
        let replaced = self.messages.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| m.id == id) {
                Some(slot) => {
                    *slot = ConversationMessage {
                        id: new_id,
                        role: Role::Assistant,
                        text,
                        widget: None,
                        pending: true,
                    };
                    true
                }
                None => false,
            }
        });
        replaced.then_some(new_id)
    }

    /// Append `chunk` to message `id` only while it is still the newest entry.
    pub fn append_if_last(&self, id: MessageId, chunk: &str) -> bool {
        self.messages.send_if_modified(|messages| match messages.last_mut() {
            Some(message) if message.id == id && message.is_appendable() => {
                message.text.push_str(chunk);
                true
            }
            _ => false,
        })
    }

    /// Remove message `id`. Returns whether it existed.
    pub fn remove(&self, id: MessageId) -> bool {
        self.messages.send_if_modified(|messages| {
            let before = messages.len();
            messages.retain(|m| m.id != id);
            messages.len() != before
        })
    }

    /// Clear the pending flag so the entry stays as a regular message.
    pub fn settle(&self, id: MessageId) -> bool {
        self.messages.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| m.id == id) {
                Some(message) if message.pending => {
                    message.pending = false;
                    true
                }
                _ => false,
            }
        })
    }

    fn push(&self, role: Role, text: String, widget: Option<String>, pending: bool) -> MessageId {
        let id = self.allocate_id();
        self.messages.send_modify(|messages| {
            messages.push(ConversationMessage {
                id,
                role,
                text,
                widget,
                pending,
            });
        });
        id
    }

    fn allocate_id(&self) -> MessageId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
