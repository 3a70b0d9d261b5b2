//! Widget Core - Cross-Window Protocol and Session State for a Chat Widget
//!
//! This crate holds the logic of an embeddable chat widget, independent of
//! any rendering layer. A parent page hosts the widget in a frame and talks
//! to it over a cross-window channel; the widget talks to a turn-based
//! dialog backend and, after escalation, to a live agent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Parent Page                              │
//! │              { event, data? } + origin + reply port              │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        WIDGET CORE                               │
//! │                   ┌───────────┴───────────┐                      │
//! │                   │  CrossWindowChannel   │  origin check        │
//! │                   └───────────┬───────────┘                      │
//! │                   ┌───────────┴───────────┐                      │
//! │                   │  ProtocolDispatcher   │  decode + route      │
//! │                   └──┬─────────┬───────┬──┘                      │
//! │          ┌───────────┘         │       └────────────┐            │
//! │  ┌───────┴────────┐  ┌─────────┴──────────┐  ┌──────┴─────────┐  │
//! │  │CredentialStore │  │ SessionMachine     │◄─┤ Conversation   │  │
//! │  │                │  │ (single owner)     │  │ Orchestrator   │  │
//! │  └────────────────┘  └────────────────────┘  └──────┬─────────┘  │
//! └─────────────────────────────────────────────────────┼────────────┘
//!                                                       │
//!                                            DialogBackend / LiveChatAgent
//! ```
//!
//! # Key Types
//!
//! - [`Widget`]: Owns everything for one mounted widget and runs its loop
//! - [`CrossWindowChannel`]: Origin-checked transport to the parent page
//! - [`ProtocolDispatcher`]: Inbound event vocabulary and its effects
//! - [`SessionMachine`]: The only place session state changes
//! - [`ConversationOrchestrator`]: Dialog turns with single-turn admission
//! - [`CredentialStore`]: Tokens and provider credentials, swapped wholesale
//!
//! # Quick Start
//!
//! ```ignore
//! use widget_core::{config::load_config, HttpDialogBackend, Widget};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = HttpDialogBackend::new("https://bot.example.com/turn", config.backend.timeout())?;
//!     let (mut widget, parent, handle) = Widget::new(&config, backend);
//!
//!     // Hand `parent` to whatever carries messages from the embedding page,
//!     // and `handle` to the rendering layer.
//!     widget.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: Cross-window channel, origin policy, reply ports
//! - [`events`]: Inbound event vocabulary and envelopes
//! - [`messages`]: Messages the widget posts to the parent
//! - [`dispatcher`]: Decoding and routing of inbound events
//! - [`session`]: Session state and its transitions
//! - [`orchestrator`]: Dialog turn lifecycle
//! - [`credentials`]: Credential store and providers
//! - [`backend`]: Dialog backend and live-chat agent interfaces
//! - [`transcript`]: Bounded message log
//! - [`interactive`]: Response templates parsed from bot replies
//! - [`audio`]: Audio subsystem events and interrupt flag
//! - [`locale`]: Locale list and persisted selection
//! - [`config`]: Layered configuration
//! - [`widget`]: The façade tying it together

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audio;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod events;
pub mod interactive;
pub mod locale;
pub mod messages;
pub mod orchestrator;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod widget;

// Re-exports for convenience
pub use audio::{AudioEvent, InterruptFlag, RecorderStatus};
pub use backend::{
    BackendError, DialogBackend, DialogState, HttpDialogBackend, LiveChatAgent, TurnKind,
    TurnReply, TurnRequest,
};
pub use config::{ConfigError, ConfigOverrides, ConfigSource, WidgetConfig};
pub use credentials::{
    AuthTokens, CredentialStore, Credentials, CredentialsProvider, ProviderCredentials,
    StaticCredentialsProvider,
};
pub use dispatcher::{DispatchOutcome, ParentCommand, ProtocolDispatcher};
pub use events::{EventKind, EventSource, InboundEvent};
pub use interactive::{InteractiveMessage, TemplateKind};
pub use locale::{FileLocaleStore, LocaleError, LocaleSelection, LocaleStore, MemoryLocaleStore};
pub use messages::{MessageId, WidgetMessage};
pub use orchestrator::{ConversationOrchestrator, SubmitOutcome, TurnError};
pub use session::{
    ChatMode, LiveChatStatus, RecordingStatus, Session, SessionChange, SessionError,
    SessionMachine, SessionObserver, TurnStatus,
};
pub use transcript::{EntryKind, Transcript, TranscriptEntry};
pub use transport::{
    ChannelConfig, ChannelError, CrossWindowChannel, OutboundPost, ParentWindow, SendOptions,
    SendOutcome,
};
pub use widget::{Attachment, LiveChatEvent, UserAction, Widget, WidgetError, WidgetHandle};
