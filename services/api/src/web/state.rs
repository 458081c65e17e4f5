//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use chatrelay_core::ports::CompletionService;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The upstream completion adapter. `None` when no provider credential
    /// is configured; chat requests then fail with a 500 before any stream
    /// starts.
    pub completion: Option<Arc<dyn CompletionService>>,
}
