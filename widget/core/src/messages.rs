//! Widget Messages
//!
//! Messages sent from the widget to its parent page. The parent is the
//! authority for login/logout flows and for the frame's size, so the widget
//! asks instead of acting.
//!
//! Every message serializes to the `{ "event": <kind>, ... }` envelope the
//! parent listens for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventKind;

/// Messages from the widget to the parent window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WidgetMessage {
    /// Answer to a `ping`
    Pong,
    /// Ask the parent to run its login flow
    RequestLogin,
    /// Ask the parent to run its logout flow
    RequestLogout,
    /// Announce that the user escalated to a live agent
    RequestLiveChat,
    /// Announce that the user ended the live chat
    RequestLiveChatEnd,
    /// Ask the parent to minimize or restore the frame
    ToggleMinimizeUi,
    /// Positive acknowledgment on a reply port
    Resolve {
        /// Event name being acknowledged
        #[serde(rename = "type")]
        kind: String,
    },
    /// Negative acknowledgment on a reply port
    Reject {
        /// Event name being rejected
        #[serde(rename = "type")]
        kind: String,
        /// Why it was rejected
        error: String,
    },
}

impl WidgetMessage {
    /// Protocol kind of this message
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Pong => EventKind::Pong,
            Self::RequestLogin => EventKind::RequestLogin,
            Self::RequestLogout => EventKind::RequestLogout,
            Self::RequestLiveChat => EventKind::RequestLiveChat,
            Self::RequestLiveChatEnd => EventKind::RequestLiveChatEnd,
            Self::ToggleMinimizeUi => EventKind::ToggleMinimizeUi,
            Self::Resolve { .. } => EventKind::Resolve,
            Self::Reject { .. } => EventKind::Reject,
        }
    }

    /// Acknowledge an event by name
    pub fn resolve(kind: impl Into<String>) -> Self {
        Self::Resolve { kind: kind.into() }
    }

    /// Reject an event by name
    pub fn reject(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Reject {
            kind: kind.into(),
            error: error.into(),
        }
    }

    /// JSON envelope as posted to the parent
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Transcript message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}
