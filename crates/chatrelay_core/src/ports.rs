//! crates/chatrelay_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like HTTP clients or
//! browser storage.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{Message, Role};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., provider, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Stream Aliases
//=========================================================================================

/// Incremental text fragments produced by the upstream model provider.
pub type FragmentStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

/// Raw byte chunks of a relay response body, framed with the
/// `data: <fragment>` / `data: [DONE]` line protocol of [`crate::wire`].
pub type ByteStream = Pin<Box<dyn Stream<Item = PortResult<Bytes>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// One role/content pair in the shape the model provider expects. Assistant
/// turns are mapped to the provider's `model` role by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ProviderTurn {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// The upstream text-completion service.
///
/// `history` is every prior turn of the conversation; `current` is the new
/// user turn. The returned stream yields plain text fragments in provider
/// order; the adapter owns whatever wire format the provider actually speaks.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn stream_completion(
        &self,
        history: &[ProviderTurn],
        current: &str,
    ) -> PortResult<FragmentStream>;
}

/// The client-side transport to the relay endpoint.
///
/// Takes the full conversation (history plus the new turn, newest last) and
/// returns the raw response body as it arrives, chunk by chunk. Chunks carry
/// the `data:` line framing; the chunk decoder undoes it.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, turns: &[ProviderTurn]) -> PortResult<ByteStream>;
}

/// The external key-value persistence collaborator (browser localStorage in
/// the original deployment, a JSON file here).
pub trait StateStore: Send + Sync {
    /// Returns the stored value for `key`, or `None` if absent/unreadable.
    fn get(&self, key: &str) -> Option<String>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

/// The render boundary for one streaming cycle. The controller publishes the
/// full in-flight accumulator after every fragment, and a terminal error
/// descriptor if the cycle fails.
pub trait StreamObserver: Send {
    /// Called after each fragment with the entire accumulated text so far.
    fn on_update(&mut self, in_flight: &str);
    /// Called at most once, when the cycle ends in failure.
    fn on_error(&mut self, message: &str);
}

/// An observer that discards everything; useful for headless callers.
pub struct NullObserver;

impl StreamObserver for NullObserver {
    fn on_update(&mut self, _in_flight: &str) {}
    fn on_error(&mut self, _message: &str) {}
}
