//! Unified error type for the wampkit client.

use wampkit_protocol::ProtocolError;
use wampkit_session::SessionError;
use wampkit_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `wampkit` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WampError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (handshake, registration, remote error,
    /// timeout, closed).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A meta procedure returned something other than the documented
    /// shape.
    #[error("unexpected result from {procedure}: {detail}")]
    UnexpectedResult { procedure: String, detail: String },
}

impl WampError {
    /// The router-reported error URI, if this is a remote error.
    pub fn remote_uri(&self) -> Option<&str> {
        match self {
            Self::Session(SessionError::Remote(remote)) => Some(&remote.error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wampkit_protocol::{Dict, Payload};
    use wampkit_session::RemoteError;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wamp_err: WampError = err.into();
        assert!(matches!(wamp_err, WampError::Transport(_)));
        assert!(wamp_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = serde_json::from_str::<serde_json::Value>("{")
            .map_err(ProtocolError::Decode)
            .unwrap_err();
        let wamp_err: WampError = err.into();
        assert!(matches!(wamp_err, WampError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let wamp_err: WampError = SessionError::SessionClosed.into();
        assert!(matches!(wamp_err, WampError::Session(_)));
        assert_eq!(wamp_err.remote_uri(), None);
    }

    #[test]
    fn test_remote_uri() {
        let wamp_err: WampError = SessionError::Remote(RemoteError {
            error: "wamp.error.no_such_procedure".into(),
            details: Dict::new(),
            payload: Payload::default(),
        })
        .into();
        assert_eq!(wamp_err.remote_uri(), Some("wamp.error.no_such_procedure"));
    }
}
