//! Dialog Backend Traits
//!
//! Interfaces of the two remote parties a conversation can talk to: the
//! turn-based dialog backend (the bot) and, after escalation, a live agent.
//!
//! # Design Philosophy
//!
//! The core never knows how a turn travels over the wire. It hands a
//! [`TurnRequest`] to a [`DialogBackend`] and gets a [`TurnReply`] or a
//! [`BackendError`] back. Implementations own serialization, auth headers
//! and retries.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What produced the text of a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnKind {
    /// Typed or spoken by the user
    Human,
    /// Value of a response-card button the user clicked
    Button,
    /// Thumbs up/down feedback value
    Feedback,
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Human => "human",
            Self::Button => "button",
            Self::Feedback => "feedback",
        };
        f.write_str(s)
    }
}

/// Dialog state reported with a bot reply
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DialogState {
    /// The bot is waiting for a new intent
    ElicitIntent,
    /// The bot asks the user to confirm the intent
    ConfirmIntent,
    /// The bot asks for a slot value
    ElicitSlot,
    /// All slots filled, fulfillment pending
    ReadyForFulfillment,
    /// The intent was fulfilled
    Fulfilled,
    /// The intent failed
    Failed,
    /// A state this widget does not know
    Other(String),
}

impl DialogState {
    /// Whether the conversation reached a terminal state for the intent
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fulfilled | Self::ReadyForFulfillment | Self::Failed
        )
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ElicitIntent => "ElicitIntent",
            Self::ConfirmIntent => "ConfirmIntent",
            Self::ElicitSlot => "ElicitSlot",
            Self::ReadyForFulfillment => "ReadyForFulfillment",
            Self::Fulfilled => "Fulfilled",
            Self::Failed => "Failed",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for DialogState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ElicitIntent" => Self::ElicitIntent,
            "ConfirmIntent" => Self::ConfirmIntent,
            "ElicitSlot" => Self::ElicitSlot,
            "ReadyForFulfillment" => Self::ReadyForFulfillment,
            "Fulfilled" => Self::Fulfilled,
            "Failed" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<DialogState> for String {
    fn from(state: DialogState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn sent to the dialog backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Input text
    pub text: String,
    /// What produced the text
    pub kind: TurnKind,
    /// Session attributes at submission time
    pub session_attributes: BTreeMap<String, String>,
    /// Active locale, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl TurnRequest {
    /// Create a request with no attributes and no locale
    pub fn new(text: impl Into<String>, kind: TurnKind) -> Self {
        Self {
            text: text.into(),
            kind,
            session_attributes: BTreeMap::new(),
            locale: None,
        }
    }
}

/// The backend's answer to a turn
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    /// Bot reply text (may be a structured interactive envelope)
    #[serde(default)]
    pub reply_text: String,
    /// Attributes to merge into the session
    #[serde(default)]
    pub new_session_attributes: BTreeMap<String, String>,
    /// Dialog state after the turn
    #[serde(default)]
    pub dialog_state: Option<DialogState>,
}

/// Errors from the dialog backend or the live-chat agent
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request never reached the backend or the response was lost
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with an error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Turn-based dialog backend
#[async_trait]
pub trait DialogBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send one turn and wait for the reply
    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError>;
}

/// Live-agent connection after escalation
#[async_trait]
pub trait LiveChatAgent: Send + Sync {
    /// Forward a user message to the agent
    async fn send_message(&self, text: &str) -> Result<(), BackendError>;
}
