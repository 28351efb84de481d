//! Capability manifest: the procedures and topic handlers a session
//! brings with it.
//!
//! A [`CapabilityManifest`] is built once, before `begin()`, and consumed
//! by the session: every [`Binding`] in it is registered (procedures) or
//! subscribed (topics) as part of establishing the session.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use wampkit_protocol::{
    Dict, InvocationPolicy, Payload, PublicationId, RegistrationId, RequestId,
    SubscriptionId,
};

use crate::{HandlerError, Session};

/// Type-erased procedure handler.
pub type ProcedureHandler = Arc<
    dyn Fn(Invocation) -> BoxFuture<'static, Result<Payload, HandlerError>>
        + Send
        + Sync,
>;

/// Type-erased topic handler.
pub type TopicHandler =
    Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// An incoming call to one of this client's procedures.
///
/// Carries a handle to the owning session so a handler can issue nested
/// calls or publishes.
#[derive(Clone)]
pub struct Invocation {
    pub request: RequestId,
    pub registration: RegistrationId,
    pub details: Dict,
    pub payload: Payload,
    pub session: Session,
}

impl Invocation {
    /// Deserializes the positional argument at `index`.
    ///
    /// # Errors
    /// `wamp.error.invalid_argument` if the argument is missing or has the
    /// wrong shape.
    pub fn arg<T: DeserializeOwned>(
        &self,
        index: usize,
    ) -> Result<T, HandlerError> {
        let value = self.payload.args.get(index).ok_or_else(|| {
            HandlerError::with_message(
                INVALID_ARGUMENT,
                format!("missing argument {index}"),
            )
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            HandlerError::with_message(
                INVALID_ARGUMENT,
                format!("argument {index}: {e}"),
            )
        })
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("request", &self.request)
            .field("registration", &self.registration)
            .field("details", &self.details)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

const INVALID_ARGUMENT: &str = "wamp.error.invalid_argument";

/// A publication delivered to one of this client's subscriptions.
#[derive(Clone)]
pub struct Event {
    pub subscription: SubscriptionId,
    pub publication: PublicationId,
    pub details: Dict,
    pub payload: Payload,
    pub session: Session,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("subscription", &self.subscription)
            .field("publication", &self.publication)
            .field("details", &self.details)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// A procedure to register. `name` doubles as the procedure URI.
#[derive(Clone)]
pub struct ProcedureBinding {
    pub name: String,
    pub policy: InvocationPolicy,
    pub handler: ProcedureHandler,
}

/// A topic to subscribe. `name` identifies the handler; several handlers
/// may subscribe to the same `topic` under different names.
#[derive(Clone)]
pub struct TopicBinding {
    pub name: String,
    pub topic: String,
    pub handler: TopicHandler,
}

/// One entry of a [`CapabilityManifest`].
#[derive(Clone)]
pub enum Binding {
    Procedure(ProcedureBinding),
    Topic(TopicBinding),
}

impl Binding {
    /// The unique name of this binding within its manifest.
    pub fn name(&self) -> &str {
        match self {
            Self::Procedure(p) => &p.name,
            Self::Topic(t) => &t.name,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Procedure(p) => f
                .debug_struct("Procedure")
                .field("name", &p.name)
                .field("policy", &p.policy)
                .finish_non_exhaustive(),
            Self::Topic(t) => f
                .debug_struct("Topic")
                .field("name", &t.name)
                .field("topic", &t.topic)
                .finish_non_exhaustive(),
        }
    }
}

/// The ordered set of bindings a session registers during `begin()`.
///
/// ```rust
/// use wampkit_protocol::{InvocationPolicy, Payload};
/// use wampkit_session::CapabilityManifest;
///
/// let manifest = CapabilityManifest::new()
///     .procedure("com.example.ping", InvocationPolicy::Single, |_inv| async {
///         Ok(Payload::from_args(vec!["pong".into()]))
///     })
///     .topic("on_tick", "com.example.tick", |_event| async {});
///
/// assert_eq!(manifest.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapabilityManifest {
    bindings: Vec<Binding>,
}

impl CapabilityManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a procedure registered under `name`.
    pub fn procedure<F, Fut>(
        mut self,
        name: impl Into<String>,
        policy: InvocationPolicy,
        handler: F,
    ) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, HandlerError>> + Send + 'static,
    {
        let handler: ProcedureHandler =
            Arc::new(move |inv: Invocation| handler(inv).boxed());
        self.bindings.push(Binding::Procedure(ProcedureBinding {
            name: name.into(),
            policy,
            handler,
        }));
        self
    }

    /// Adds a handler named `name` subscribed to `topic`.
    pub fn topic<F, Fut>(
        mut self,
        name: impl Into<String>,
        topic: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: TopicHandler =
            Arc::new(move |event: Event| handler(event).boxed());
        self.bindings.push(Binding::Topic(TopicBinding {
            name: name.into(),
            topic: topic.into(),
            handler,
        }));
        self
    }

    /// Appends an already-built binding.
    pub fn push(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Bindings in insertion order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The first name used by more than one binding, if any.
    pub(crate) fn duplicate_name(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.bindings
            .iter()
            .map(Binding::name)
            .find(|name| !seen.insert(*name))
    }
}
