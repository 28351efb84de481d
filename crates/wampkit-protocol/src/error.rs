//! Error types for the protocol layer.
//!
//! When you see a `ProtocolError`, the problem is in turning bytes into a
//! WAMP message or back, not in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON at all.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The JSON parsed, but its shape matches no WAMP message kind, or a
    /// required field is missing or of the wrong type.
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Shorthand for building a [`ProtocolError::Malformed`].
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
