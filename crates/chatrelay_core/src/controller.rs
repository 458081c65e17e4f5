//! crates/chatrelay_core/src/controller.rs
//!
//! Drives one request/response cycle against the relay: appends the user
//! turn, streams the assistant reply fragment by fragment into a transient
//! accumulator, and commits the finished reply as a single store update.
//!
//! The cycle is scoped to the session id captured at submit time, not to
//! whichever session is active when the stream finishes. Switching or
//! deleting sessions while a reply is streaming neither halts the stream
//! nor redirects the commit.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{Message, Role, StreamState};
use crate::ports::{ChatTransport, PortError, ProviderTurn, StreamObserver};
use crate::store::SessionStore;
use crate::wire::{ChunkDecoder, WireEvent};

/// Where the controller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Committing,
}

/// A failed or rejected cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// A cycle is already in flight; concurrent cycles would race on the
    /// accumulator and on which session receives the commit.
    #[error("a streaming cycle is already in progress")]
    Busy,
    /// Submitted input was empty or whitespace-only.
    #[error("cannot submit an empty message")]
    EmptyInput,
    /// The request or stream failed. The user's message stays in history,
    /// so a retry resends it as context.
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct StreamingController {
    transport: Arc<dyn ChatTransport>,
    phase: Phase,
    stream: StreamState,
}

impl StreamingController {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            phase: Phase::Idle,
            stream: StreamState::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The transient state of the current (or most recent) cycle.
    pub fn stream_state(&self) -> &StreamState {
        &self.stream
    }

    /// Abandons a cycle whose `submit` future was dropped mid-flight, as on
    /// page teardown. The underlying reader was already released when the
    /// future was dropped; this discards the accumulator and returns the
    /// controller to idle so a new cycle can start.
    pub fn reset(&mut self) {
        self.stream = StreamState::default();
        self.phase = Phase::Idle;
    }

    /// Submits one user turn against the currently active session and runs
    /// the full cycle to completion. Returns the committed assistant
    /// message.
    ///
    /// The store lock is taken only for individual store operations, never
    /// across a suspension point, so observers of the store see each named
    /// operation fully applied or not at all.
    pub async fn submit(
        &mut self,
        store: &Mutex<SessionStore>,
        input: &str,
        observer: &mut dyn StreamObserver,
    ) -> Result<Message, CycleError> {
        if self.phase != Phase::Idle {
            return Err(CycleError::Busy);
        }
        let input = input.trim();
        if input.is_empty() {
            return Err(CycleError::EmptyInput);
        }

        // --- Sending: append the user turn and capture the target session ---
        self.phase = Phase::Sending;
        self.stream = StreamState {
            is_active: true,
            ..StreamState::default()
        };

        let user_message = Message::new(Role::User, input);
        let (session_id, turns) = {
            let mut store = store.lock().await;
            let session_id = store.active_id().to_string();
            store.append_messages(&session_id, vec![user_message]);
            let turns: Vec<ProviderTurn> = store
                .session(&session_id)
                .map(|s| s.messages.iter().map(ProviderTurn::from).collect())
                .unwrap_or_default();
            (session_id, turns)
        };
        debug!(session = %session_id, turns = turns.len(), "dispatching chat request");

        let mut body = match self.transport.send(&turns).await {
            Ok(body) => body,
            Err(err) => return Err(self.fail(observer, err)),
        };

        // --- Streaming: apply fragments strictly in arrival order ---
        self.phase = Phase::Streaming;
        let mut decoder = ChunkDecoder::new();
        let mut in_band_error: Option<String> = None;

        'read: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return Err(self.fail(observer, err)),
            };
            let events = match decoder.feed(&chunk) {
                Ok(events) => events,
                Err(err) => return Err(self.fail(observer, err.into())),
            };
            for event in events {
                match event {
                    WireEvent::Fragment(text) => {
                        self.stream.in_flight_text.push_str(&text);
                        observer.on_update(&self.stream.in_flight_text);
                    }
                    WireEvent::Error(detail) => {
                        in_band_error = Some(detail);
                    }
                    WireEvent::Done => break 'read,
                }
            }
        }
        // Dropping `body` here releases the underlying reader whether the
        // stream ended at the sentinel, at natural exhaustion, or early.
        drop(body);

        if let Some(detail) = in_band_error {
            return Err(self.fail(observer, PortError::Unexpected(detail)));
        }

        // --- Committing: one bulk update alongside the user turn ---
        self.phase = Phase::Committing;
        let text = std::mem::take(&mut self.stream.in_flight_text);
        let assistant = Message::new(Role::Assistant, text);
        {
            let mut store = store.lock().await;
            match store.session(&session_id) {
                Some(session) => {
                    let mut messages = session.messages.clone();
                    messages.push(assistant.clone());
                    store.replace_messages(&session_id, messages);
                }
                // The target session was deleted mid-stream; the reply has
                // nowhere to go.
                None => warn!(session = %session_id, "dropping reply for deleted session"),
            }
        }

        self.stream.is_active = false;
        self.phase = Phase::Idle;
        Ok(assistant)
    }

    /// Transitions through the error state: the accumulator is discarded,
    /// the descriptor surfaces to the render boundary, and the controller
    /// returns to idle. The already-appended user message is not rolled
    /// back.
    fn fail(&mut self, observer: &mut dyn StreamObserver, err: PortError) -> CycleError {
        let detail = err.to_string();
        self.stream.in_flight_text.clear();
        self.stream.is_active = false;
        self.stream.last_error = Some(detail.clone());
        self.phase = Phase::Idle;
        observer.on_error(&detail);
        CycleError::Port(err)
    }
}
