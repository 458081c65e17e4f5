pub mod chat;
pub mod state;

// Re-export the relay handler and OpenAPI doc to make them easily
// accessible to the binary that builds the web server router.
pub use chat::{chat_handler, ApiDoc};
