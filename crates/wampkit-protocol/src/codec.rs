//! Codec trait and implementations for turning messages into bytes.
//!
//! The session engine does not care how a [`Message`] is serialized; it
//! only needs something that implements [`Codec`]. WAMP negotiates the
//! serializer through the WebSocket subprotocol, and [`JsonCodec`] matches
//! `wamp.2.json`.

use crate::{Message, ProtocolError};

/// Encodes messages to bytes and decodes bytes back into messages.
///
/// `Send + Sync + 'static` because the codec is shared between the
/// session's reader task and every task that sends.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the serializer fails. This does
    /// not happen for well-formed messages.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes one message.
    ///
    /// # Errors
    /// - `ProtocolError::Decode` if the bytes are not valid for the format
    /// - `ProtocolError::Malformed` if they parse but are no WAMP message
    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] for the `wamp.2.json` serialization.
///
/// ## Example
///
/// ```rust
/// use wampkit_protocol::{Codec, JsonCodec, Message, RequestId};
///
/// let codec = JsonCodec;
/// let msg = Message::Unregistered { request: RequestId(4) };
///
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(bytes, b"[67,4]");
/// assert_eq!(codec.decode(&bytes).unwrap(), msg);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&message.to_value()).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        Message::from_value(value)
    }
}
