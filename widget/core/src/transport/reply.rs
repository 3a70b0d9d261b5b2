//! One-shot Reply Ports
//!
//! A reply port travels with an inbound message and lets the handler answer
//! the sender. The port is consumed by the first reply, so a second reply
//! cannot be expressed.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

/// Single-use return channel attached to an inbound message
#[derive(Debug)]
pub struct ReplyPort {
    tx: Option<oneshot::Sender<Value>>,
}

impl ReplyPort {
    /// Create a port and the receiving end held by the sender
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Post the one reply this port allows
    ///
    /// Returns `false` if the sender stopped listening.
    pub fn post<T: Serialize>(mut self, reply: &T) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        match serde_json::to_value(reply) {
            Ok(value) => tx.send(value).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode port reply");
                false
            }
        }
    }

    /// Drop the port without replying
    ///
    /// Only for messages that must not be answered (untrusted origin).
    pub fn discard(mut self) {
        self.tx.take();
    }
}

impl Drop for ReplyPort {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("Reply port dropped without a reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_delivers_once() {
        let (port, rx) = ReplyPort::new();
        assert!(port.post(&json!({ "event": "pong" })));
        assert_eq!(rx.await.unwrap(), json!({ "event": "pong" }));
    }

    #[tokio::test]
    async fn test_discard_closes_receiver() {
        let (port, rx) = ReplyPort::new();
        port.discard();
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (port, rx) = ReplyPort::new();
        drop(rx);
        assert!(!port.post(&json!({ "event": "pong" })));
    }
}
