//! services/api/src/adapters/mod.rs
//!
//! Concrete implementations of the `core` crate's ports: the upstream model
//! provider, the relay transport, and local state persistence.

pub mod gemini;
pub mod relay;
pub mod storage;
