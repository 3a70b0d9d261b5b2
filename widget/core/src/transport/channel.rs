//! Cross-Window Channel
//!
//! In-process model of the frame boundary between the parent page and the
//! embedded widget.
//!
//! # Usage
//!
//! ```ignore
//! let (mut channel, parent) = CrossWindowChannel::pair(&ChannelConfig::for_parent(origin));
//!
//! // Parent side: post messages, read what the widget sends
//! let reply = parent.post_with_port(origin, json!({ "event": "ping" })).await?;
//!
//! // Widget side: admitted events only
//! let mut events = channel.receive();
//! while let Some(event) = events.next().await { /* dispatch */ }
//! ```
//!
//! # Security
//!
//! Parent-window messages are checked against the [`OriginPolicy`] before
//! they become [`InboundEvent`]s. Rejected messages are dropped silently,
//! their reply port discarded unanswered, and counted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::events::{EventSource, InboundEvent, RawInbound};
use crate::messages::WidgetMessage;

use super::config::ChannelConfig;
use super::origin::{OriginPolicy, OriginValidationResult};
use super::reply::ReplyPort;

/// Errors raised by the cross-window channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The other side is gone or the channel was closed
    #[error("Channel closed")]
    Closed,

    /// Outbound queue is full
    #[error("Channel full")]
    Full,

    /// The parent did not answer an expect-reply send in time
    #[error("No reply within {0:?}")]
    ReplyTimeout(Duration),

    /// The parent dropped the reply port without answering
    #[error("Reply port dropped without a reply")]
    ReplyDropped,

    /// Sender origin is not allow-listed
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin {
        /// Claimed origin
        origin: String,
        /// Why it was rejected
        reason: String,
    },

    /// Message is not a `{ event, data? }` envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Options for an outbound send
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Attach a reply port and wait for the parent's answer
    pub expect_reply: bool,
}

impl SendOptions {
    /// Post without waiting for an answer
    #[must_use]
    pub fn fire_and_forget() -> Self {
        Self { expect_reply: false }
    }

    /// Attach a reply port
    #[must_use]
    pub fn expecting_reply() -> Self {
        Self { expect_reply: true }
    }
}

/// Result of a successful send
#[derive(Debug)]
pub enum SendOutcome {
    /// Message queued for the parent
    Delivered,
    /// Message queued; the parent's answer is pending
    AwaitingReply(PendingReply),
}

/// A parent reply not yet received
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Value>,
    timeout: Duration,
}

impl PendingReply {
    /// Wait for the parent's answer, bounded by the configured timeout
    pub async fn wait(self) -> Result<Value, ChannelError> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ChannelError::ReplyDropped),
            Err(_) => Err(ChannelError::ReplyTimeout(self.timeout)),
        }
    }
}

/// A message posted by the widget to the parent
#[derive(Debug)]
pub struct OutboundPost {
    /// The message
    pub message: WidgetMessage,
    /// Port for the parent's answer, present on expect-reply sends
    pub port: Option<ReplyPort>,
}

/// Cloneable sending half of the channel
///
/// Handed to the dispatcher and the widget façade so both can post to the
/// parent without owning the channel.
#[derive(Clone, Debug)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundPost>,
    connected: Arc<AtomicBool>,
    reply_timeout: Duration,
}

impl OutboundSender {
    /// Send a message to the parent
    pub async fn send(
        &self,
        message: WidgetMessage,
        options: SendOptions,
    ) -> Result<SendOutcome, ChannelError> {
        let (post, outcome) = self.prepare(message, options)?;
        self.tx
            .send(post)
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(outcome)
    }

    /// Queue a message without waiting for capacity
    ///
    /// Used from synchronous handlers; fails with `Full` instead of blocking.
    pub fn try_post(&self, message: WidgetMessage) -> Result<(), ChannelError> {
        let (post, _) = self.prepare(message, SendOptions::fire_and_forget())?;
        self.tx.try_send(post).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Reserve room for one fire-and-forget post
    ///
    /// Lets a handler commit a state change only once its notification to
    /// the parent can no longer fail. Dropping the slot releases the room.
    pub fn try_reserve(&self) -> Result<OutboundSlot<'_>, ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let permit = self.tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => ChannelError::Full,
            mpsc::error::TrySendError::Closed(()) => ChannelError::Closed,
        })?;
        Ok(OutboundSlot { permit })
    }

    /// Whether the channel is still open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn prepare(
        &self,
        message: WidgetMessage,
        options: SendOptions,
    ) -> Result<(OutboundPost, SendOutcome), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        tracing::debug!(event = %message.kind(), expect_reply = options.expect_reply, "Posting to parent");
        if options.expect_reply {
            let (port, rx) = ReplyPort::new();
            let pending = PendingReply {
                rx,
                timeout: self.reply_timeout,
            };
            Ok((
                OutboundPost {
                    message,
                    port: Some(port),
                },
                SendOutcome::AwaitingReply(pending),
            ))
        } else {
            Ok((
                OutboundPost {
                    message,
                    port: None,
                },
                SendOutcome::Delivered,
            ))
        }
    }
}

/// Reserved room in the outbound queue
#[derive(Debug)]
pub struct OutboundSlot<'a> {
    permit: mpsc::Permit<'a, OutboundPost>,
}

impl OutboundSlot<'_> {
    /// Post `message` into the reserved room
    pub fn post(self, message: WidgetMessage) {
        tracing::debug!(event = %message.kind(), "Posting to parent");
        self.permit.send(OutboundPost {
            message,
            port: None,
        });
    }
}

/// Widget side of the frame boundary
pub struct CrossWindowChannel {
    policy: OriginPolicy,
    inbound_rx: mpsc::Receiver<RawInbound>,
    outbound: OutboundSender,
    connected: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl CrossWindowChannel {
    /// Create a connected channel and its parent-window peer
    #[must_use]
    pub fn pair(config: &ChannelConfig) -> (Self, ParentWindow) {
        let capacity = config.capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let connected = Arc::new(AtomicBool::new(true));

        let channel = Self {
            policy: OriginPolicy::from_config(&config.allowed_origins),
            inbound_rx,
            outbound: OutboundSender {
                tx: outbound_tx,
                connected: Arc::clone(&connected),
                reply_timeout: config.reply_timeout(),
            },
            connected: Arc::clone(&connected),
            dropped: AtomicU64::new(0),
        };
        let parent = ParentWindow {
            inbound_tx,
            outbound_rx,
            connected,
        };
        (channel, parent)
    }

    /// Sending half, for components that post to the parent
    #[must_use]
    pub fn outbound(&self) -> OutboundSender {
        self.outbound.clone()
    }

    /// Send a message to the parent
    pub async fn send(
        &self,
        message: WidgetMessage,
        options: SendOptions,
    ) -> Result<SendOutcome, ChannelError> {
        self.outbound.send(message, options).await
    }

    /// Lazy stream of admitted inbound events
    ///
    /// Ends when the parent side is gone or the channel is closed. Calling
    /// `receive` again resumes from the next queued message.
    pub fn receive(&mut self) -> impl Stream<Item = InboundEvent> + '_ {
        futures::stream::unfold(self, |channel| async move {
            let event = channel.next_event().await?;
            Some((event, channel))
        })
    }

    /// Next admitted inbound event, in arrival order
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        loop {
            let raw = self.inbound_rx.recv().await?;
            match self.admit(raw) {
                Ok(event) => return Some(event),
                Err(e) => tracing::debug!(error = %e, "Inbound message not admitted"),
            }
        }
    }

    /// Admitted inbound event if one is already queued
    pub fn try_next_event(&mut self) -> Option<InboundEvent> {
        while let Ok(raw) = self.inbound_rx.try_recv() {
            if let Ok(event) = self.admit(raw) {
                return Some(event);
            }
        }
        None
    }

    /// Messages dropped because of their origin
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the channel is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop listening; queued and future messages are discarded
    pub fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.inbound_rx.close();
        while let Ok(raw) = self.inbound_rx.try_recv() {
            if let Some(port) = raw.port {
                port.discard();
            }
        }
    }

    fn admit(&self, raw: RawInbound) -> Result<InboundEvent, ChannelError> {
        let RawInbound {
            source,
            origin,
            data,
            port,
        } = raw;

        if source == EventSource::ParentWindow {
            if let OriginValidationResult::Denied { reason } = self.policy.validate(&origin) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(origin = %origin, reason = %reason, "Dropping message from untrusted origin");
                if let Some(port) = port {
                    port.discard();
                }
                return Err(ChannelError::InvalidOrigin { origin, reason });
            }
        }

        let event = match data.get("event").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                tracing::warn!(origin = %origin, "Inbound message has no event name");
                if let Some(port) = port {
                    port.post(&WidgetMessage::reject("", "missing event name"));
                }
                return Err(ChannelError::MalformedEnvelope(
                    "missing event name".to_string(),
                ));
            }
        };

        Ok(InboundEvent::new(event, data, origin, source, port))
    }
}

/// Parent-page side of the frame boundary
///
/// Used by the host process and by tests to play the embedding page.
pub struct ParentWindow {
    inbound_tx: mpsc::Sender<RawInbound>,
    outbound_rx: mpsc::Receiver<OutboundPost>,
    connected: Arc<AtomicBool>,
}

impl ParentWindow {
    /// Post a message to the widget as `origin`
    pub async fn post(&self, origin: &str, data: Value) -> Result<(), ChannelError> {
        self.deliver(RawInbound::from_parent(origin, data)).await
    }

    /// Post a message carrying a reply port; returns the port's receiving end
    pub async fn post_with_port(
        &self,
        origin: &str,
        data: Value,
    ) -> Result<oneshot::Receiver<Value>, ChannelError> {
        let (port, rx) = ReplyPort::new();
        self.deliver(RawInbound::from_parent(origin, data).with_port(port))
            .await?;
        Ok(rx)
    }

    /// Raise a same-page component event (no origin check, no port)
    pub async fn component_event(&self, data: Value) -> Result<(), ChannelError> {
        self.deliver(RawInbound::from_component(data)).await
    }

    /// Next message posted by the widget
    pub async fn recv(&mut self) -> Option<OutboundPost> {
        self.outbound_rx.recv().await
    }

    /// Message posted by the widget, if one is queued
    pub fn try_recv(&mut self) -> Option<OutboundPost> {
        self.outbound_rx.try_recv().ok()
    }

    async fn deliver(&self, raw: RawInbound) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            if let Some(port) = raw.port {
                port.discard();
            }
            return Err(ChannelError::Closed);
        }
        self.inbound_tx.send(raw).await.map_err(|e| {
            if let Some(port) = e.0.port {
                port.discard();
            }
            ChannelError::Closed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PARENT: &str = "https://parent.example.com";

    fn channel() -> (CrossWindowChannel, ParentWindow) {
        CrossWindowChannel::pair(&ChannelConfig::for_parent(PARENT))
    }

    #[tokio::test]
    async fn test_admits_allowed_origin() {
        let (mut channel, parent) = channel();
        parent
            .post(PARENT, json!({ "event": "postText", "data": { "message": "hi" } }))
            .await
            .unwrap();

        let event = channel.next_event().await.unwrap();
        assert_eq!(event.event, "postText");
        assert_eq!(event.origin, PARENT);
        assert_eq!(event.payload(), Some(&json!({ "message": "hi" })));
    }

    #[tokio::test]
    async fn test_drops_untrusted_origin_without_reply() {
        let (mut channel, parent) = channel();
        let rx = parent
            .post_with_port("https://evil.example.com", json!({ "event": "ping" }))
            .await
            .unwrap();
        parent.post(PARENT, json!({ "event": "pong" })).await.unwrap();

        let event = channel.next_event().await.unwrap();
        assert_eq!(event.event, "pong");
        assert_eq!(channel.dropped_count(), 1);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_envelope_without_event() {
        let (mut channel, parent) = channel();
        let rx = parent
            .post_with_port(PARENT, json!({ "data": {} }))
            .await
            .unwrap();
        drop(parent);

        assert!(channel.next_event().await.is_none());
        let reply = rx.await.unwrap();
        assert_eq!(reply["event"], "reject");
    }

    #[tokio::test]
    async fn test_component_events_skip_origin_check() {
        let (mut channel, parent) = channel();
        parent.component_event(json!({ "event": "ping" })).await.unwrap();

        let event = channel.next_event().await.unwrap();
        assert_eq!(event.source, EventSource::HostComponent);
        assert!(!event.has_reply_port());
    }

    #[tokio::test]
    async fn test_receive_stream_preserves_order_and_restarts() {
        let (mut channel, parent) = channel();
        for name in ["ping", "confirmLogout", "unknownKind"] {
            parent.post(PARENT, json!({ "event": name })).await.unwrap();
        }

        let first: Vec<String> = channel
            .receive()
            .take(2)
            .map(|e| e.event)
            .collect()
            .await;
        assert_eq!(first, vec!["ping", "confirmLogout"]);

        let rest = Box::pin(channel.receive()).next().await.unwrap();
        assert_eq!(rest.event, "unknownKind");
    }

    #[tokio::test]
    async fn test_expect_reply_resolves() {
        let (channel, mut parent) = channel();
        let outcome = channel
            .send(WidgetMessage::RequestLogin, SendOptions::expecting_reply())
            .await
            .unwrap();

        let post = parent.recv().await.unwrap();
        assert_eq!(post.message, WidgetMessage::RequestLogin);
        post.port.unwrap().post(&json!({ "event": "resolve" }));

        let SendOutcome::AwaitingReply(pending) = outcome else {
            panic!("expected a pending reply");
        };
        assert_eq!(pending.wait().await.unwrap(), json!({ "event": "resolve" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expect_reply_times_out() {
        let (channel, mut parent) = channel();
        let outcome = channel
            .send(WidgetMessage::RequestLogout, SendOptions::expecting_reply())
            .await
            .unwrap();
        let _post = parent.recv().await.unwrap();

        let SendOutcome::AwaitingReply(pending) = outcome else {
            panic!("expected a pending reply");
        };
        assert!(matches!(
            pending.wait().await,
            Err(ChannelError::ReplyTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_close_rejects_further_traffic() {
        let (mut channel, parent) = channel();
        let outbound = channel.outbound();
        channel.close();

        assert!(!channel.is_connected());
        assert_eq!(
            parent.post(PARENT, json!({ "event": "ping" })).await,
            Err(ChannelError::Closed)
        );
        assert_eq!(outbound.try_post(WidgetMessage::Pong), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_try_post_full() {
        let config = ChannelConfig {
            capacity: 1,
            ..ChannelConfig::for_parent(PARENT)
        };
        let (channel, _parent) = CrossWindowChannel::pair(&config);
        let outbound = channel.outbound();

        outbound.try_post(WidgetMessage::Pong).unwrap();
        assert_eq!(outbound.try_post(WidgetMessage::Pong), Err(ChannelError::Full));
    }
}
