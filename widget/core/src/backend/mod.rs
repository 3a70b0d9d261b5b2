//! Dialog Backend Abstraction
//!
//! Provides a common interface for the remote parties of a conversation.
//!
//! # Available Backends
//!
//! - `HttpDialogBackend`: JSON over HTTP to a single turn endpoint
//!
//! # Adding a New Backend
//!
//! 1. Create a new module (e.g., `backend/grpc.rs`)
//! 2. Implement the `DialogBackend` trait
//! 3. Hand it to `ConversationOrchestrator::new`

pub mod http;
pub mod traits;

pub use http::HttpDialogBackend;
pub use traits::{
    BackendError, DialogBackend, DialogState, LiveChatAgent, TurnKind, TurnReply, TurnRequest,
};
