//! Transport Layer for the Parent/Widget Boundary
//!
//! Models the `postMessage`-style link between a hosting page and the
//! embedded widget frame:
//! - [`CrossWindowChannel`]: widget side, origin-checked inbound stream and
//!   outbound sends with optional reply expectation
//! - [`ParentWindow`]: parent side, used by the host binary and tests
//! - [`ReplyPort`]: one-shot response port carried by a message
//!
//! # Security
//!
//! - Every parent-window message is checked against the configured origin
//!   allow-list before admission
//! - Rejected messages never receive a reply, even when they carry a port

pub mod channel;
pub mod config;
pub mod origin;
pub mod reply;

pub use channel::{
    ChannelError, CrossWindowChannel, OutboundPost, OutboundSender, OutboundSlot, ParentWindow,
    PendingReply, SendOptions, SendOutcome,
};
pub use config::ChannelConfig;
pub use origin::{OriginPolicy, OriginValidationResult};
pub use reply::ReplyPort;
