//! WAMP wire protocol for wampkit.
//!
//! This crate defines the messages a WAMP client and router exchange:
//!
//! - **Messages** ([`Message`], [`MessageKind`]): one variant per WAMP
//!   message kind, with conversion to and from the JSON array form.
//! - **Values** ([`RequestId`], [`Payload`], [`InvocationPolicy`], ...):
//!   the typed pieces messages are built from.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (correlation, dispatch)
//! ```
//!
//! The protocol layer knows nothing about connections or sessions.

mod codec;
mod error;
mod message;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{Message, MessageKind};
pub use types::{
    Dict, InvocationPolicy, List, Payload, PublicationId, RegistrationId,
    RequestId, Roles, SessionId, SubscriptionId, MAX_ID,
};

/// Well-known WAMP URIs used by the session engine.
pub mod uri {
    /// Normal client- or router-initiated close.
    pub const CLOSE_NORMAL: &str = "wamp.close.normal";
    /// Reply to a router-initiated GOODBYE.
    pub const GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";
    /// Default error URI for a failed invocation handler.
    pub const RUNTIME_ERROR: &str = "wamp.error.runtime_error";
}
