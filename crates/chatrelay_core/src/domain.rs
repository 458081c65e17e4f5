//! crates/chatrelay_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or storage format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};
use uuid::timestamp::context::ContextV7;
use uuid::{Timestamp, Uuid};

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn of a conversation.
///
/// `content` is raw text and may contain fenced code blocks using the
/// triple-backtick convention; the parser derives display segments from it
/// on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message with a fresh time-ordered id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One independent chat conversation with its full message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub name: String,
    pub messages: Vec<Message>,
}

impl ChatSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            name: name.into(),
            messages: Vec::new(),
        }
    }
}

/// A typed slice of rendered message content. Derived from `Message::content`
/// on every render, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text { value: String },
    Code { language: String, value: String },
}

/// Transient state of one streaming request cycle. Lives only while the
/// cycle runs; the accumulated text either becomes a committed `Message`
/// or is dropped on error.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    pub in_flight_text: String,
    pub is_active: bool,
    pub last_error: Option<String>,
}

/// Generates an opaque, unique, time-ordered identifier. UUIDv7 encodes a
/// millisecond timestamp in its high bits; the shared `ContextV7` counter
/// keeps ids generated within the same millisecond in creation order, so
/// lexicographic order always follows creation order.
pub fn fresh_id() -> String {
    static CONTEXT: OnceLock<Mutex<ContextV7>> = OnceLock::new();
    let context = CONTEXT
        .get_or_init(|| Mutex::new(ContextV7::new()))
        .lock()
        .unwrap();
    Uuid::new_v7(Timestamp::now(&*context)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_unique_and_ordered() {
        let ids: Vec<String> = (0..200).map(|_| fresh_id()).collect();
        for pair in ids.windows(2) {
            assert!(
                pair[0] < pair[1],
                "ids must sort in creation order, even within one millisecond"
            );
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
