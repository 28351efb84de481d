//! `Client` builder and lifecycle.
//!
//! This is the entry point for applications. It ties the layers together:
//! transport → protocol → session, with a WebSocket connection to one
//! router URL.

use std::collections::BTreeMap;

use rand::Rng;
use serde_json::json;
use wampkit_protocol::{
    InvocationPolicy, Payload, RegistrationId, SessionId, SubscriptionId,
};
use wampkit_session::{
    CallProxy, CapabilityManifest, Event, HandlerError, Invocation,
    PublishProxy, Session, SessionConfig, SessionState,
};
use wampkit_transport::{Transport, WebSocketTransport};

use crate::WampError;

/// Router URL used when none is configured.
pub const DEFAULT_ROUTER_URL: &str = "ws://localhost:8080/ws";

/// Name of the procedure a service client registers.
pub const GET_META_PROCEDURE: &str = "get_meta";

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use wampkit::prelude::*;
///
/// # async fn run() -> Result<(), WampError> {
/// let client = Client::builder()
///     .url("ws://localhost:8080/ws")
///     .realm("realm1")
///     .procedure("com.example.add", InvocationPolicy::Single, |inv| async move {
///         let a: i64 = inv.arg(0)?;
///         let b: i64 = inv.arg(1)?;
///         Ok(Payload::from_args(vec![(a + b).into()]))
///     })
///     .build();
///
/// client.start().await?;
/// let sum = client.call("com.example.add").arg(1).arg(2).send().await?;
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    id: Option<String>,
    url: String,
    config: SessionConfig,
    manifest: CapabilityManifest,
    service: bool,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            id: None,
            url: DEFAULT_ROUTER_URL.to_string(),
            config: SessionConfig::default(),
            manifest: CapabilityManifest::new(),
            service: false,
        }
    }

    /// Sets the client id. A random one is generated otherwise.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the router's WebSocket URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the realm to join.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = realm.into();
        self
    }

    /// Replaces the whole session configuration, realm included.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a procedure to register on start.
    pub fn procedure<F, Fut>(
        mut self,
        name: impl Into<String>,
        policy: InvocationPolicy,
        handler: F,
    ) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Payload, HandlerError>>
            + Send
            + 'static,
    {
        self.manifest = self.manifest.procedure(name, policy, handler);
        self
    }

    /// Adds a topic handler to subscribe on start.
    pub fn topic<F, Fut>(
        mut self,
        name: impl Into<String>,
        topic: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.manifest = self.manifest.topic(name, topic, handler);
        self
    }

    /// Appends every binding of a prebuilt manifest.
    pub fn manifest(mut self, manifest: CapabilityManifest) -> Self {
        for binding in manifest.bindings() {
            self.manifest.push(binding.clone());
        }
        self
    }

    /// Makes this a service client: it also registers `get_meta` with the
    /// round-robin policy, so one of several identical services answers
    /// each call.
    pub fn service(mut self) -> Self {
        self.service = true;
        self
    }

    pub fn build(self) -> Client {
        let id = self.id.unwrap_or_else(generate_id);
        let mut manifest = self.manifest;
        if self.service {
            for binding in service_manifest(id.clone()).bindings() {
                manifest.push(binding.clone());
            }
        }
        tracing::debug!(%id, url = %self.url, bindings = manifest.len(), "client built");
        Client {
            id,
            url: self.url,
            session: Session::new(self.config, manifest),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A WAMP client: one session to one realm on one router.
///
/// Cloning the underlying [`Session`] (via [`session`](Self::session)) is
/// cheap; the client itself is usually kept in one place and shared by
/// reference.
pub struct Client {
    id: String,
    url: String,
    session: Session,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn realm(&self) -> &str {
        &self.session.config().realm
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.session_id()
    }

    /// Connects to the router over WebSocket, joins the realm and
    /// registers every binding.
    pub async fn start(&self) -> Result<(), WampError> {
        tracing::info!(id = %self.id, url = %self.url, "starting client");
        self.start_with(WebSocketTransport::new(self.url.clone()))
            .await
    }

    /// Like [`start`](Self::start), over any transport.
    pub async fn start_with<T: Transport>(
        &self,
        transport: T,
    ) -> Result<(), WampError> {
        self.session.begin(transport).await?;
        Ok(())
    }

    /// Leaves the realm and closes the connection. Idempotent.
    pub async fn stop(&self) {
        tracing::info!(id = %self.id, "stopping client");
        self.session.end().await;
    }

    pub fn call(&self, procedure: impl Into<String>) -> CallProxy {
        self.session.call(procedure)
    }

    pub fn publish(&self, topic: impl Into<String>) -> PublishProxy {
        self.session.publish(topic)
    }

    pub fn registration_map(&self) -> BTreeMap<String, RegistrationId> {
        self.session.registration_map()
    }

    pub fn subscription_map(
        &self,
    ) -> BTreeMap<String, (SubscriptionId, String)> {
        self.session.subscription_map()
    }
}

/// A manifest holding the service `get_meta` procedure for the client
/// `id`.
///
/// `get_meta` returns `{"id": .., "subscriptions": [..], "registrations":
/// [..]}` with the binding names live at the time of the call.
pub fn service_manifest(id: impl Into<String>) -> CapabilityManifest {
    let id = id.into();
    CapabilityManifest::new().procedure(
        GET_META_PROCEDURE,
        InvocationPolicy::RoundRobin,
        move |inv: Invocation| {
            let id = id.clone();
            async move {
                let subscriptions: Vec<String> =
                    inv.session.subscription_map().into_keys().collect();
                let registrations: Vec<String> =
                    inv.session.registration_map().into_keys().collect();
                Ok(Payload::from_args(vec![json!({
                    "id": id,
                    "subscriptions": subscriptions,
                    "registrations": registrations,
                })]))
            }
        },
    )
}

/// Generates a random 32-character hex id (128 bits).
fn generate_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
