//! The receiver loop and the writer task.
//!
//! Each established connection gets two tasks:
//!
//! ```text
//!                 ┌──────────── writer ◄── mpsc ◄── Session::send (any task)
//!  Connection ────┤
//!                 └──► receiver ──► PendingRequests::resolve   (responses)
//!                                ├► spawn(procedure handler)  (INVOCATION)
//!                                ├► spawn(topic handler)      (EVENT)
//!                                └► Session lifecycle         (WELCOME/ABORT/GOODBYE)
//! ```
//!
//! The receiver never awaits a handler, so a handler that calls back into
//! the same session cannot deadlock it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use wampkit_protocol::{
    uri, Codec, Dict, Message, MessageKind, Payload, RequestId,
};
use wampkit_transport::Connection;

use crate::binding::{Event, Invocation};
use crate::Session;

/// A unit of work for the writer task.
pub(crate) enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Writes queued frames in order until told to close or every sender is
/// gone, then closes the connection.
pub(crate) async fn write_loop<C: Connection>(
    conn: Arc<C>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let conn_id = conn.id();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(bytes) => {
                if let Err(e) = conn.send(&bytes).await {
                    tracing::warn!(%conn_id, error = %e, "send failed, writer stopping");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
    tracing::debug!(%conn_id, "writer stopped");
}

/// Reads and dispatches inbound messages until the transport closes or
/// the session signals shutdown.
pub(crate) async fn run<C: Connection>(
    conn: Arc<C>,
    session: Session,
    mut shutdown: watch::Receiver<bool>,
) {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "receiver started");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(%conn_id, "receiver shutting down");
                return;
            }
            frame = conn.recv() => frame,
        };

        match frame {
            Ok(Some(bytes)) => {
                if dispatch(&session, &bytes) == Flow::Stop {
                    tracing::debug!(%conn_id, "receiver stopped by router close");
                    return;
                }
            }
            Ok(None) => {
                tracing::info!(%conn_id, "transport closed");
                break;
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "receive failed");
                break;
            }
        }
    }

    session.on_transport_closed();
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

fn dispatch(session: &Session, bytes: &[u8]) -> Flow {
    let message = match session.codec().decode(bytes) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, len = bytes.len(), "dropping malformed message");
            return Flow::Continue;
        }
    };
    let kind = message.kind();
    tracing::trace!(%kind, "received");

    match message {
        Message::Welcome { .. } | Message::Abort { .. } | Message::Goodbye { .. } => {
            match session.take_lifecycle_waiter() {
                Some(waiter) => {
                    let _ = waiter.send(message);
                    Flow::Continue
                }
                None if kind == MessageKind::Welcome => {
                    tracing::warn!("unsolicited WELCOME, dropping");
                    Flow::Continue
                }
                None => {
                    session.close_by_router(&message);
                    Flow::Stop
                }
            }
        }

        Message::Invocation {
            request,
            registration,
            details,
            payload,
        } => {
            let handler = match session.resolve_registration_id(registration) {
                Ok(handler) => handler,
                Err(e) => {
                    tracing::warn!(request_id = %request, error = %e, "dropping invocation");
                    return Flow::Continue;
                }
            };
            let invocation = Invocation {
                request,
                registration,
                details,
                payload,
                session: session.clone(),
            };
            let session = session.clone();
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(handler(invocation))
                    .catch_unwind()
                    .await;
                let reply = match outcome {
                    Ok(Ok(payload)) => Message::Yield {
                        request,
                        options: Dict::new(),
                        payload,
                    },
                    Ok(Err(e)) => {
                        tracing::debug!(request_id = %request, error = %e.error, "invocation failed");
                        invocation_error(request, e.error, e.payload)
                    }
                    Err(_) => {
                        tracing::error!(request_id = %request, "procedure handler panicked");
                        invocation_error(
                            request,
                            uri::RUNTIME_ERROR.to_string(),
                            Payload::from_args(vec!["handler panicked".into()]),
                        )
                    }
                };
                if let Err(e) = session.send(&reply) {
                    tracing::debug!(request_id = %request, error = %e, "could not send invocation reply");
                }
            });
            Flow::Continue
        }

        Message::Event {
            subscription,
            publication,
            details,
            payload,
        } => {
            let handlers = match session.resolve_subscription_id(subscription) {
                Ok(handlers) => handlers,
                Err(e) => {
                    tracing::warn!(publication = %publication, error = %e, "dropping event");
                    return Flow::Continue;
                }
            };
            for handler in handlers {
                let event = Event {
                    subscription,
                    publication,
                    details: details.clone(),
                    payload: payload.clone(),
                    session: session.clone(),
                };
                tokio::spawn(async move {
                    if AssertUnwindSafe(handler(event)).catch_unwind().await.is_err() {
                        tracing::error!(%subscription, %publication, "topic handler panicked");
                    }
                });
            }
            Flow::Continue
        }

        other if kind.is_correlated_response() => {
            // Every correlated kind carries a request id.
            if let Some(id) = other.request_id() {
                // The registry must know a new binding before the next
                // frame, which may already be an INVOCATION or EVENT for it.
                session.commit_binding(id, &other);
                session.pending().resolve(id, other);
            }
            Flow::Continue
        }

        _ => {
            tracing::warn!(%kind, "unexpected message from router, dropping");
            Flow::Continue
        }
    }
}

fn invocation_error(request: RequestId, error: String, payload: Payload) -> Message {
    Message::Error {
        request_type: MessageKind::Invocation.code(),
        request,
        details: Dict::new(),
        error,
        payload,
    }
}
