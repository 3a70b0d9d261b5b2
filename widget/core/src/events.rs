//! Inbound Events
//!
//! Events delivered to the widget from outside: messages posted by the
//! parent page across the frame boundary, and same-page component events
//! raised by a host that mounts the widget directly.
//!
//! # Design Philosophy
//!
//! Everything arriving here is untrusted. The transport only guarantees the
//! envelope shape (`{ event, data? }`) and, for parent-window messages, that
//! the origin is allow-listed. Payload fields are validated later, when the
//! dispatcher decodes an event into a typed command.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::ReplyPort;

/// Closed vocabulary of event kinds used by the cross-window protocol
///
/// Kinds outside this set are still delivered (as an unrecognized name) so
/// newer parents can talk to older widgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Health probe, always answered with `pong`
    Ping,
    /// Answer to a health probe
    Pong,
    /// Parent confirms a completed login and hands over tokens
    ConfirmLogin,
    /// Parent confirms a completed logout
    ConfirmLogout,
    /// Parent posts a text message on behalf of the user
    PostText,
    /// Parent replaces the temporary provider credentials
    ReplaceCreds,
    /// Widget asks the parent to start a login flow
    RequestLogin,
    /// Widget asks the parent to start a logout flow
    RequestLogout,
    /// Widget announces a live-chat escalation
    RequestLiveChat,
    /// Widget announces the end of a live chat
    RequestLiveChatEnd,
    /// Widget asks the parent to minimize or restore the frame
    ToggleMinimizeUi,
    /// Positive acknowledgment posted on a reply port
    Resolve,
    /// Negative acknowledgment posted on a reply port
    Reject,
}

impl EventKind {
    /// Wire name of this kind
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::ConfirmLogin => "confirmLogin",
            Self::ConfirmLogout => "confirmLogout",
            Self::PostText => "postText",
            Self::ReplaceCreds => "replaceCreds",
            Self::RequestLogin => "requestLogin",
            Self::RequestLogout => "requestLogout",
            Self::RequestLiveChat => "requestLiveChat",
            Self::RequestLiveChatEnd => "requestLiveChatEnd",
            Self::ToggleMinimizeUi => "toggleMinimizeUi",
            Self::Resolve => "resolve",
            Self::Reject => "reject",
        }
    }

    /// Look up a kind by its wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "confirmLogin" => Self::ConfirmLogin,
            "confirmLogout" => Self::ConfirmLogout,
            "postText" => Self::PostText,
            "replaceCreds" => Self::ReplaceCreds,
            "requestLogin" => Self::RequestLogin,
            "requestLogout" => Self::RequestLogout,
            "requestLiveChat" => Self::RequestLiveChat,
            "requestLiveChatEnd" => Self::RequestLiveChatEnd,
            "toggleMinimizeUi" => Self::ToggleMinimizeUi,
            "resolve" => Self::Resolve,
            "reject" => Self::Reject,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds the widget only ever sends, never acts upon
    #[must_use]
    pub fn is_outbound_only(self) -> bool {
        matches!(
            self,
            Self::RequestLogin
                | Self::RequestLogout
                | Self::RequestLiveChat
                | Self::RequestLiveChatEnd
                | Self::ToggleMinimizeUi
                | Self::Resolve
                | Self::Reject
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an inbound event came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Posted by the parent page across the frame boundary (origin-checked)
    ParentWindow,
    /// Raised by a host that mounts the widget on the same page
    HostComponent,
}

/// A message as handed over by the transport, before admission
#[derive(Debug)]
pub struct RawInbound {
    /// Who delivered it
    pub source: EventSource,
    /// Claimed origin of the sender (empty for host components)
    pub origin: String,
    /// The posted data, expected to be a `{ event, data? }` envelope
    pub data: Value,
    /// One-shot reply port, if the sender attached one
    pub port: Option<ReplyPort>,
}

impl RawInbound {
    /// A parent-window message without a reply port
    pub fn from_parent(origin: impl Into<String>, data: Value) -> Self {
        Self {
            source: EventSource::ParentWindow,
            origin: origin.into(),
            data,
            port: None,
        }
    }

    /// A same-page component event
    #[must_use]
    pub fn from_component(data: Value) -> Self {
        Self {
            source: EventSource::HostComponent,
            origin: String::new(),
            data,
            port: None,
        }
    }

    /// Attach a reply port
    #[must_use]
    pub fn with_port(mut self, port: ReplyPort) -> Self {
        self.port = Some(port);
        self
    }
}

/// An admitted inbound event
///
/// Produced by the channel once the origin has been checked and the
/// envelope has an `event` name. Exists only for the duration of dispatch.
#[derive(Debug)]
pub struct InboundEvent {
    /// Event name as sent (may be outside the known vocabulary)
    pub event: String,
    /// The full envelope, kept for payload fields posted outside `data`
    pub envelope: Value,
    /// Origin of the sender
    pub origin: String,
    /// Who delivered it
    pub source: EventSource,
    reply: Option<ReplyPort>,
}

impl InboundEvent {
    /// Build an event from an already-validated envelope
    pub fn new(
        event: impl Into<String>,
        envelope: Value,
        origin: impl Into<String>,
        source: EventSource,
        reply: Option<ReplyPort>,
    ) -> Self {
        Self {
            event: event.into(),
            envelope,
            origin: origin.into(),
            source,
            reply,
        }
    }

    /// Known kind, if the name is in the vocabulary
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.event)
    }

    /// The `data` member of the envelope
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.envelope.get("data").filter(|v| !v.is_null())
    }

    /// A member of the envelope outside `data`
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.envelope.get(name).filter(|v| !v.is_null())
    }

    /// Whether the sender attached a reply port
    #[must_use]
    pub fn has_reply_port(&self) -> bool {
        self.reply.is_some()
    }

    /// Take ownership of the reply port; the taker must answer on it
    pub fn take_reply(&mut self) -> Option<ReplyPort> {
        self.reply.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in [
            EventKind::Ping,
            EventKind::ConfirmLogin,
            EventKind::PostText,
            EventKind::RequestLiveChatEnd,
            EventKind::ToggleMinimizeUi,
        ] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("unknownEvent"), None);
    }

    #[test]
    fn test_event_kind_serde_matches_wire_name() {
        let json = serde_json::to_string(&EventKind::ReplaceCreds).unwrap();
        assert_eq!(json, "\"replaceCreds\"");
    }

    #[test]
    fn test_outbound_only_kinds() {
        assert!(EventKind::RequestLogin.is_outbound_only());
        assert!(!EventKind::Ping.is_outbound_only());
        assert!(!EventKind::ConfirmLogout.is_outbound_only());
    }

    #[test]
    fn test_payload_ignores_null_data() {
        let event = InboundEvent::new(
            "confirmLogout",
            json!({ "event": "confirmLogout", "data": null }),
            "https://parent.example.com",
            EventSource::ParentWindow,
            None,
        );
        assert!(event.payload().is_none());
        assert_eq!(event.kind(), Some(EventKind::ConfirmLogout));
    }
}
