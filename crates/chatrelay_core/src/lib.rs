pub mod controller;
pub mod domain;
pub mod parser;
pub mod ports;
pub mod store;
pub mod wire;

pub use controller::{CycleError, Phase, StreamingController};
pub use domain::{ChatSession, Message, Role, Segment, StreamState};
pub use ports::{
    ByteStream, ChatTransport, CompletionService, FragmentStream, NullObserver, PortError,
    PortResult, ProviderTurn, StateStore, StreamObserver,
};
pub use store::{SessionStore, DEFAULT_SESSION_NAME, STORAGE_KEY};
