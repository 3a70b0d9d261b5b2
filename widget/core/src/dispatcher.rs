//! Protocol Dispatcher
//!
//! Turns admitted [`InboundEvent`]s into typed [`ParentCommand`]s and routes
//! them to the session machine, the credential store and the orchestrator.
//!
//! # Design Philosophy
//!
//! Dispatch is synchronous and never waits on the network. A `postText`
//! only asks the orchestrator to start a turn; the reply arrives later as a
//! separate state change. Payloads are untrusted, so every command's
//! required fields are checked at decode time and anything that fails is
//! ignored with a warning rather than partially applied.
//!
//! | event          | action                                         |
//! |----------------|------------------------------------------------|
//! | `ping`         | reply `pong` (on the port, else outbound)      |
//! | `confirmLogin` | replace tokens, mark logged in                 |
//! | `confirmLogout`| clear credentials, mark logged out             |
//! | `postText`     | submit a human turn                            |
//! | `replaceCreds` | replace the provider credentials               |
//! | other          | ignored                                        |
//!
//! A message that carries a reply port gets exactly one answer: `pong` for
//! a ping, otherwise `resolve` when applied and `reject` when not.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::backend::{DialogBackend, TurnKind};
use crate::credentials::{AuthTokens, CredentialStore, ProviderCredentials, StaticCredentialsProvider};
use crate::events::{EventKind, InboundEvent};
use crate::messages::WidgetMessage;
use crate::orchestrator::ConversationOrchestrator;
use crate::session::SessionMachine;
use crate::transport::{OutboundSender, ReplyPort};

/// A decoded inbound command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentCommand {
    /// Health probe
    Ping,
    /// Probe answer from the parent
    Pong,
    /// Login completed with these tokens
    ConfirmLogin(AuthTokens),
    /// Logout completed
    ConfirmLogout,
    /// Text to submit as a human turn
    PostText {
        /// Message text
        message: String,
    },
    /// New provider credentials
    ReplaceCreds(ProviderCredentials),
    /// A kind the widget sends but never handles
    OutboundOnly(EventKind),
    /// A kind outside the vocabulary
    Unknown(String),
}

/// Decode failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Required payload fields missing or of the wrong shape
    #[error("Malformed {event} payload: {reason}")]
    MalformedPayload {
        /// Event name
        event: String,
        /// What was wrong
        reason: String,
    },
}

/// Result of dispatching one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command took effect
    Applied,
    /// The command was valid but refused by its target
    Refused(String),
    /// Nothing to do for this event
    Ignored,
    /// The payload failed validation
    Malformed(String),
}

/// Counters per outcome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Commands applied
    pub applied: u64,
    /// Commands refused
    pub refused: u64,
    /// Events ignored
    pub ignored: u64,
    /// Payloads rejected
    pub malformed: u64,
}

/// Everything a command may touch
pub struct DispatchTargets<'a, B: DialogBackend + 'static> {
    /// Session state
    pub session: &'a mut SessionMachine,
    /// Credentials
    pub credentials: &'a CredentialStore,
    /// Turn driver
    pub orchestrator: &'a mut ConversationOrchestrator<B>,
    /// Outbound half of the channel
    pub outbound: &'a OutboundSender,
}

/// Routes inbound events, one at a time, in arrival order
#[derive(Debug, Default)]
pub struct ProtocolDispatcher {
    stats: DispatchStats,
}

impl ProtocolDispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome counters
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Decode an event into a command, validating required fields
    pub fn decode(event: &InboundEvent) -> Result<ParentCommand, DispatchError> {
        let Some(kind) = event.kind() else {
            return Ok(ParentCommand::Unknown(event.event.clone()));
        };
        let malformed = |reason: &str| DispatchError::MalformedPayload {
            event: event.event.clone(),
            reason: reason.to_string(),
        };

        let command = match kind {
            EventKind::Ping => ParentCommand::Ping,
            EventKind::Pong => ParentCommand::Pong,
            EventKind::ConfirmLogout => ParentCommand::ConfirmLogout,
            EventKind::ConfirmLogin => {
                let tokens = event
                    .payload()
                    .and_then(decode_tokens)
                    .ok_or_else(|| malformed("missing identity token"))?;
                ParentCommand::ConfirmLogin(tokens)
            }
            EventKind::PostText => {
                let message = event
                    .payload()
                    .and_then(|data| data.get("message"))
                    .or_else(|| event.field("message"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .ok_or_else(|| malformed("missing message text"))?;
                ParentCommand::PostText {
                    message: message.to_string(),
                }
            }
            EventKind::ReplaceCreds => {
                let raw = event
                    .payload()
                    .and_then(|data| data.get("creds"))
                    .or_else(|| event.field("creds"))
                    .or_else(|| event.payload())
                    .ok_or_else(|| malformed("missing credentials"))?;
                let creds: ProviderCredentials = serde_json::from_value(raw.clone())
                    .map_err(|e| malformed(&e.to_string()))?;
                if creds.access_key_id.is_empty() || creds.secret_access_key.is_empty() {
                    return Err(malformed("empty credential fields"));
                }
                ParentCommand::ReplaceCreds(creds)
            }
            other => ParentCommand::OutboundOnly(other),
        };
        Ok(command)
    }

    /// Decode and apply one event
    ///
    /// Returns once the command has been routed; never waits for a turn.
    pub fn dispatch<B: DialogBackend + 'static>(
        &mut self,
        mut event: InboundEvent,
        targets: DispatchTargets<'_, B>,
    ) -> DispatchOutcome {
        let reply = event.take_reply();
        tracing::debug!(event = %event.event, source = ?event.source, "Dispatching inbound event");

        let command = match Self::decode(&event) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, origin = %event.origin, "Ignoring malformed event");
                let outcome = DispatchOutcome::Malformed(e.to_string());
                self.finish(reply, &event.event, &outcome);
                return outcome;
            }
        };

        if command == ParentCommand::Ping {
            self.answer_ping(reply, targets.outbound);
            self.stats.applied += 1;
            return DispatchOutcome::Applied;
        }

        let outcome = Self::apply(command, targets);
        self.finish(reply, &event.event, &outcome);
        outcome
    }

    fn apply<B: DialogBackend + 'static>(
        command: ParentCommand,
        targets: DispatchTargets<'_, B>,
    ) -> DispatchOutcome {
        let DispatchTargets {
            session,
            credentials,
            orchestrator,
            ..
        } = targets;

        match command {
            ParentCommand::Ping | ParentCommand::Pong => DispatchOutcome::Applied,
            ParentCommand::ConfirmLogin(tokens) => {
                credentials.replace_tokens(tokens);
                session.set_logged_in(true);
                tracing::info!("Login confirmed by parent");
                DispatchOutcome::Applied
            }
            ParentCommand::ConfirmLogout => {
                credentials.clear();
                session.set_logged_in(false);
                tracing::info!("Logout confirmed by parent");
                DispatchOutcome::Applied
            }
            ParentCommand::PostText { message } => {
                match orchestrator.submit_turn(session, &message, TurnKind::Human) {
                    Ok(_) => DispatchOutcome::Applied,
                    Err(e) => {
                        tracing::warn!(error = %e, "postText refused");
                        DispatchOutcome::Refused(e.to_string())
                    }
                }
            }
            ParentCommand::ReplaceCreds(creds) => {
                credentials.replace_provider(Arc::new(StaticCredentialsProvider::new(creds)));
                DispatchOutcome::Applied
            }
            ParentCommand::OutboundOnly(kind) => {
                tracing::debug!(event = %kind, "Ignoring outbound-only event received inbound");
                DispatchOutcome::Ignored
            }
            ParentCommand::Unknown(name) => {
                tracing::debug!(event = %name, "Ignoring unknown event");
                DispatchOutcome::Ignored
            }
        }
    }

    fn answer_ping(&self, reply: Option<ReplyPort>, outbound: &OutboundSender) {
        match reply {
            Some(port) => {
                if !port.post(&WidgetMessage::Pong) {
                    tracing::debug!("Ping sender stopped listening before pong");
                }
            }
            None => {
                if let Err(e) = outbound.try_post(WidgetMessage::Pong) {
                    tracing::warn!(error = %e, "Failed to send pong to parent");
                }
            }
        }
    }

    fn finish(&mut self, reply: Option<ReplyPort>, event: &str, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Applied => self.stats.applied += 1,
            DispatchOutcome::Refused(_) => self.stats.refused += 1,
            DispatchOutcome::Ignored => self.stats.ignored += 1,
            DispatchOutcome::Malformed(_) => self.stats.malformed += 1,
        }

        let Some(port) = reply else {
            return;
        };
        let answer = match outcome {
            DispatchOutcome::Applied => WidgetMessage::resolve(event),
            DispatchOutcome::Ignored => WidgetMessage::reject(event, "unsupported event"),
            DispatchOutcome::Refused(reason) | DispatchOutcome::Malformed(reason) => {
                WidgetMessage::reject(event, reason.as_str())
            }
        };
        if !port.post(&answer) {
            tracing::debug!(event, "Sender stopped listening before acknowledgment");
        }
    }
}

/// Tokens from a `confirmLogin` payload
///
/// Accepts `{ token }`, the `{ idtokenjwt, accesstokenjwt, refreshtoken }`
/// triple, or a bare token string.
fn decode_tokens(data: &Value) -> Option<AuthTokens> {
    let tokens = match data {
        Value::String(token) => AuthTokens::with_id_token(token.as_str()),
        Value::Object(map) => {
            let mut tokens: AuthTokens = serde_json::from_value(data.clone()).unwrap_or_default();
            if let Some(token) = map.get("token").and_then(Value::as_str) {
                tokens.id_token = token.to_string();
            }
            tokens
        }
        _ => return None,
    };
    tokens.is_authenticated().then_some(tokens)
}
