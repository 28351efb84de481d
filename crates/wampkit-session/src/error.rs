//! Error types for the session layer.

use std::time::Duration;

use wampkit_protocol::{
    Dict, MessageKind, Payload, ProtocolError, RegistrationId, RequestId,
    SubscriptionId,
};

use crate::SessionState;

/// Errors that can occur while running a WAMP session.
///
/// Per-call errors ([`Remote`](Self::Remote), [`Timeout`](Self::Timeout))
/// only ever reach the caller that issued the request. They never stop
/// the receiver loop.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The router rejected or never answered HELLO. The session stays
    /// `Disconnected`.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A manifest binding could not be registered or subscribed, so
    /// `begin()` was aborted and earlier registrations rolled back.
    #[error("binding {binding:?} failed: {source}")]
    Registration {
        binding: String,
        #[source]
        source: Box<SessionError>,
    },

    /// Two manifest bindings share a name.
    #[error("duplicate binding name {0:?}")]
    DuplicateBinding(String),

    /// The router answered the request with an ERROR message.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No response arrived in time. The correlation entry is gone, so a
    /// late reply is dropped.
    #[error("request {request_id} timed out after {after:?}")]
    Timeout {
        request_id: RequestId,
        after: Duration,
    },

    /// The router referenced a registration this client never made.
    #[error("unknown registration {0}")]
    UnknownRegistration(RegistrationId),

    /// The router referenced a subscription this client never made.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// No live registration or subscription has this name.
    #[error("no live binding named {0:?}")]
    NoSuchBinding(String),

    /// The session was closed while the request was outstanding, or the
    /// request was attempted after close.
    #[error("session closed")]
    SessionClosed,

    /// The operation needs an established session.
    #[error("session not established (state: {0})")]
    NotEstablished(SessionState),

    /// `begin()` was called on a session that is not `Disconnected`.
    #[error("session already started (state: {0})")]
    AlreadyStarted(SessionState),

    /// The router answered with a message kind that does not fit the
    /// request.
    #[error("unexpected {0} in response")]
    UnexpectedMessage(MessageKind),

    /// Encoding or decoding a message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport could not connect.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// An ERROR message returned by the router or by a remote callee.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("remote error {error}")]
pub struct RemoteError {
    /// The error URI, e.g. `wamp.error.no_such_procedure`.
    pub error: String,
    /// The ERROR message's details dictionary.
    pub details: Dict,
    /// Optional error arguments.
    pub payload: Payload,
}

/// The error a procedure handler returns. It is sent back to the caller
/// as an ERROR message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct HandlerError {
    /// The error URI sent to the caller.
    pub error: String,
    /// Optional error arguments.
    pub payload: Payload,
}

impl HandlerError {
    /// An error with the given URI and no arguments.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            payload: Payload::default(),
        }
    }

    /// An error with the given URI and a single message argument.
    pub fn with_message(
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            payload: Payload::from_args(vec![message.into().into()]),
        }
    }
}

/// A remote error raised by a nested call passes through unchanged.
impl From<RemoteError> for HandlerError {
    fn from(e: RemoteError) -> Self {
        Self {
            error: e.error,
            payload: e.payload,
        }
    }
}

impl From<SessionError> for HandlerError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Remote(remote) => remote.into(),
            other => Self::with_message(
                wampkit_protocol::uri::RUNTIME_ERROR,
                other.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registration_error_names_binding() {
        let err = SessionError::Registration {
            binding: "add".into(),
            source: Box::new(SessionError::SessionClosed),
        };
        let text = err.to_string();
        assert!(text.contains("\"add\""));
        assert!(text.contains("session closed"));
    }

    #[test]
    fn test_handler_error_from_nested_remote_error_keeps_uri() {
        let remote = RemoteError {
            error: "app.error.denied".into(),
            details: Dict::new(),
            payload: Payload::from_args(vec![json!("no")]),
        };
        let handler: HandlerError = SessionError::Remote(remote).into();
        assert_eq!(handler.error, "app.error.denied");
        assert_eq!(handler.payload.args, vec![json!("no")]);
    }

    #[test]
    fn test_handler_error_from_local_error_is_runtime_error() {
        let handler: HandlerError = SessionError::SessionClosed.into();
        assert_eq!(handler.error, "wamp.error.runtime_error");
        assert_eq!(handler.payload.args, vec![json!("session closed")]);
    }
}
