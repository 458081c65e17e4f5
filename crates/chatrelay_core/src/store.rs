//! crates/chatrelay_core/src/store.rs
//!
//! The single owner of all chat sessions and the active-session pointer.
//! Every mutation goes through one of the named operations below, each of
//! which rewrites the persisted representation before returning, so the
//! stored copy never reflects a half-applied update.
//!
//! All operations are total over malformed ids: a stale reference degrades
//! to a no-op instead of failing, because this store is the single source
//! of truth for rendering and must never leave the UI inconsistent.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{ChatSession, Message};
use crate::ports::StateStore;

/// Key under which the serialized session list lives in the state store.
pub const STORAGE_KEY: &str = "chat-sessions";

/// Display name given to the synthesized default session.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active_id: String,
    backend: Arc<dyn StateStore>,
}

impl SessionStore {
    /// Loads the session list from the backend, falling back to a single
    /// default session when the key is missing, malformed, or empty.
    pub fn load(backend: Arc<dyn StateStore>) -> Self {
        let sessions = backend
            .get(STORAGE_KEY)
            .and_then(|raw| match serde_json::from_str::<Vec<ChatSession>>(&raw) {
                Ok(sessions) => Some(sessions),
                Err(err) => {
                    warn!("discarding malformed persisted sessions: {err}");
                    None
                }
            })
            .filter(|sessions| !sessions.is_empty())
            .unwrap_or_else(|| vec![ChatSession::new(DEFAULT_SESSION_NAME)]);

        let active_id = sessions[0].id.clone();
        Self {
            sessions,
            active_id,
            backend,
        }
    }

    //=====================================================================================
    // Read access
    //=====================================================================================

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    /// The active session. Falls back to the first session if the active
    /// pointer has gone stale; the list is never empty.
    pub fn active_session(&self) -> &ChatSession {
        self.sessions
            .iter()
            .find(|s| s.id == self.active_id)
            .unwrap_or(&self.sessions[0])
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Creates a new auto-numbered session at the front of the list and
    /// makes it active. The returned id is immediately valid for every
    /// other operation.
    pub fn create_session(&mut self) -> String {
        let name = format!("Chat {}", self.sessions.len() + 1);
        let session = ChatSession::new(name);
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.active_id = id.clone();
        self.persist();
        id
    }

    /// Sets the active pointer. Silently tolerates unknown ids. The active
    /// pointer is in-memory only; the persisted layout holds just the
    /// session list.
    pub fn select_session(&mut self, id: &str) {
        if self.sessions.iter().any(|s| s.id == id) {
            self.active_id = id.to_string();
        }
    }

    /// Removes a session. If it was active, the first remaining session
    /// becomes active; if it was the last one, a fresh default session is
    /// synthesized. The list is never empty after this returns.
    pub fn delete_session(&mut self, id: &str) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return;
        }
        if self.sessions.is_empty() {
            self.sessions.push(ChatSession::new(DEFAULT_SESSION_NAME));
        }
        if self.active_id == id {
            self.active_id = self.sessions[0].id.clone();
        }
        self.persist();
    }

    /// Replaces a session's display name. Empty or whitespace-only names
    /// are rejected, preserving the prior name.
    pub fn rename_session(&mut self, id: &str, name: &str) {
        if name.trim().is_empty() {
            return;
        }
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.name = name.to_string();
            self.persist();
        }
    }

    /// Appends messages to one session as a single store update.
    pub fn append_messages(&mut self, session_id: &str, messages: Vec<Message>) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            session.messages.extend(messages);
            self.persist();
        }
    }

    /// Bulk-sets one session's entire message sequence. Used to commit a
    /// user + assistant turn atomically, and to clear a conversation.
    pub fn replace_messages(&mut self, session_id: &str, messages: Vec<Message>) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            session.messages = messages;
            self.persist();
        }
    }

    /// Resets one session's conversation without deleting the session.
    pub fn clear_messages(&mut self, session_id: &str) {
        self.replace_messages(session_id, Vec::new());
    }

    /// Replaces one message's content in place by id; role, id, and
    /// position are unchanged. Unknown ids are a no-op.
    pub fn update_message_content(&mut self, session_id: &str, message_id: &str, content: &str) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            if let Some(message) = session.messages.iter_mut().find(|m| m.id == message_id) {
                message.content = content.to_string();
                self.persist();
            }
        }
    }

    /// Writes the full session list to the backend. A write failure keeps
    /// the in-memory state authoritative and is only logged.
    fn persist(&self) {
        match serde_json::to_string(&self.sessions) {
            Ok(serialized) => {
                if let Err(err) = self.backend.set(STORAGE_KEY, &serialized) {
                    warn!("failed to persist sessions: {err}");
                }
            }
            Err(err) => warn!("failed to serialize sessions: {err}"),
        }
    }
}
