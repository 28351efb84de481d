//! Call and publish builders.
//!
//! ```rust,no_run
//! # async fn demo(session: wampkit_session::Session) -> Result<(), wampkit_session::SessionError> {
//! let sum = session.call("com.example.add").arg(2).arg(3).send_value().await?;
//! assert_eq!(sum, 5);
//!
//! session.publish("com.example.news").arg("hello").send().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde_json::Value;
use wampkit_protocol::{Dict, Message, Payload, PublicationId};

use crate::{Session, SessionError};

/// A CALL under construction. Nothing is sent until [`send`](Self::send).
#[must_use = "a call does nothing until `send` is awaited"]
#[derive(Debug)]
pub struct CallProxy {
    session: Session,
    procedure: String,
    options: Dict,
    payload: Payload,
    timeout: Option<Duration>,
}

impl CallProxy {
    pub(crate) fn new(session: Session, procedure: String) -> Self {
        Self {
            session,
            procedure,
            options: Dict::new(),
            payload: Payload::default(),
            timeout: None,
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.payload.args.push(value.into());
        self
    }

    /// Appends several positional arguments.
    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.payload.args.extend(values);
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.kwargs.insert(key.into(), value.into());
        self
    }

    /// Sets an entry of the CALL options dictionary.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Overrides the session's default call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends the CALL and waits for RESULT, returning its whole payload.
    /// See [`send_value`](Self::send_value) for the unwrapped result.
    ///
    /// Dropping the returned future before it completes forgets the
    /// request; a late RESULT is ignored.
    ///
    /// # Errors
    /// - `Remote` if the router or callee answered with ERROR
    /// - `Timeout` if no answer arrived in time
    /// - `SessionClosed` / `NotEstablished` if the session is not up
    pub async fn send(self) -> Result<Payload, SessionError> {
        let Self {
            session,
            procedure,
            options,
            payload,
            timeout,
        } = self;
        session.ensure_established()?;
        let timeout = timeout.unwrap_or(session.config().call_timeout);

        tracing::debug!(%procedure, "calling");
        let reply = session
            .request(
                |request| Message::Call {
                    request,
                    options,
                    procedure,
                    payload,
                },
                timeout,
            )
            .await?;
        match reply {
            Message::Result { payload, .. } => Ok(payload),
            other => Err(SessionError::UnexpectedMessage(other.kind())),
        }
    }

    /// Like [`send`](Self::send), with the result unwrapped by
    /// [`Payload::into_value`]: a single positional result comes back as
    /// that value.
    pub async fn send_value(self) -> Result<Value, SessionError> {
        self.send().await.map(Payload::into_value)
    }
}

/// A PUBLISH under construction.
#[must_use = "a publish does nothing until `send` is awaited"]
#[derive(Debug)]
pub struct PublishProxy {
    session: Session,
    topic: String,
    options: Dict,
    payload: Payload,
    acknowledge: bool,
}

impl PublishProxy {
    pub(crate) fn new(session: Session, topic: String) -> Self {
        Self {
            session,
            topic,
            options: Dict::new(),
            payload: Payload::default(),
            acknowledge: false,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.payload.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.payload.args.extend(values);
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Asks the router for a PUBLISHED acknowledgement.
    pub fn acknowledge(mut self, acknowledge: bool) -> Self {
        self.acknowledge = acknowledge;
        self
    }

    /// Sends the PUBLISH.
    ///
    /// Without acknowledgement this returns `Ok(None)` as soon as the
    /// message is queued. With it, waits for PUBLISHED and returns the
    /// publication id.
    pub async fn send(self) -> Result<Option<PublicationId>, SessionError> {
        let Self {
            session,
            topic,
            mut options,
            payload,
            acknowledge,
        } = self;
        session.ensure_established()?;

        if !acknowledge {
            tracing::trace!(%topic, "publishing");
            session.send(&Message::Publish {
                request: session.pending().fresh_id(),
                options,
                topic,
                payload,
            })?;
            return Ok(None);
        }

        options.insert("acknowledge".into(), Value::Bool(true));
        tracing::debug!(%topic, "publishing with acknowledgement");
        let reply = session
            .request(
                |request| Message::Publish {
                    request,
                    options,
                    topic,
                    payload,
                },
                session.config().call_timeout,
            )
            .await?;
        match reply {
            Message::Published { publication, .. } => Ok(Some(publication)),
            other => Err(SessionError::UnexpectedMessage(other.kind())),
        }
    }
}
