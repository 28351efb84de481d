//! The session state machine.
//!
//! A [`Session`] is a cheap, cloneable handle. Clones share one
//! connection, one correlation table and one registry, so handlers,
//! proxies and the application can all hold one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use wampkit_protocol::{
    uri, Codec, Dict, JsonCodec, Message, RegistrationId, RequestId,
    SessionId, SubscriptionId,
};
use wampkit_transport::{Connection, Transport};

use crate::binding::{Binding, ProcedureHandler, TopicHandler};
use crate::pending::PendingRequests;
use crate::proxy::{CallProxy, PublishProxy};
use crate::receiver::{self, Outbound};
use crate::registry::{Registry, Removed};
use crate::{CapabilityManifest, SessionConfig, SessionError, SessionState};

struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    config: SessionConfig,
    manifest: CapabilityManifest,
    codec: JsonCodec,
    state: watch::Sender<SessionState>,
    session_id: Mutex<Option<SessionId>>,
    pending: PendingRequests,
    registry: RwLock<Registry>,
    /// Bindings whose REGISTER or SUBSCRIBE is in flight, keyed by request
    /// id. The receiver moves one into the registry as soon as its
    /// REGISTERED or SUBSCRIBED arrives, before reading the next frame.
    staged: Mutex<HashMap<RequestId, Binding>>,
    /// Armed while `begin()` waits for WELCOME or `end()` waits for the
    /// router's GOODBYE.
    lifecycle: Mutex<Option<oneshot::Sender<Message>>>,
    link: Mutex<Option<Link>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A WAMP client session bound to one realm.
///
/// ## Lifecycle
///
/// ```text
/// let session = Session::new(config, manifest);
/// session.begin(transport).await?;   // HELLO/WELCOME, REGISTER/SUBSCRIBE all bindings
/// session.call("com.example.add").arg(2).arg(3).send().await?;
/// session.end().await;               // UNREGISTER/UNSUBSCRIBE, GOODBYE
/// ```
///
/// `Closed` is terminal; build a new session to reconnect.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("realm", &self.inner.config.realm)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(config: SessionConfig, manifest: CapabilityManifest) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                manifest,
                codec: JsonCodec,
                state,
                session_id: Mutex::new(None),
                pending: PendingRequests::new(),
                registry: RwLock::new(Registry::new()),
                staged: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(None),
                link: Mutex::new(None),
            }),
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The id from WELCOME, while the session is up.
    pub fn session_id(&self) -> Option<SessionId> {
        *lock(&self.inner.session_id)
    }

    /// `procedure → registration id` for every live registration.
    pub fn registration_map(&self) -> BTreeMap<String, RegistrationId> {
        self.registry().registration_map()
    }

    /// `handler name → (subscription id, topic)` for every live
    /// subscription.
    pub fn subscription_map(
        &self,
    ) -> BTreeMap<String, (SubscriptionId, String)> {
        self.registry().subscription_map()
    }

    /// Starts building a CALL to `procedure`.
    pub fn call(&self, procedure: impl Into<String>) -> CallProxy {
        CallProxy::new(self.clone(), procedure.into())
    }

    /// Starts building a PUBLISH to `topic`.
    pub fn publish(&self, topic: impl Into<String>) -> PublishProxy {
        PublishProxy::new(self.clone(), topic.into())
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Connects, joins the realm and registers every manifest binding.
    ///
    /// # Errors
    /// - `AlreadyStarted` unless the session is `Disconnected`
    /// - `DuplicateBinding` if two manifest entries share a name
    /// - `Transport` if the connection cannot be opened
    /// - `Handshake` on ABORT, timeout or transport loss before WELCOME;
    ///   the session is `Disconnected` again
    /// - `Registration` naming the first binding that failed; earlier
    ///   registrations are rolled back and the session is `Disconnected`
    pub async fn begin<T: Transport>(
        &self,
        transport: T,
    ) -> Result<(), SessionError> {
        if !self.compare_and_set(
            SessionState::Disconnected,
            SessionState::Establishing,
        ) {
            return Err(SessionError::AlreadyStarted(self.state()));
        }
        if let Some(name) = self.inner.manifest.duplicate_name() {
            let name = name.to_string();
            self.compare_and_set(
                SessionState::Establishing,
                SessionState::Disconnected,
            );
            return Err(SessionError::DuplicateBinding(name));
        }

        let realm = &self.inner.config.realm;
        tracing::info!(%realm, "establishing session");

        let conn = match transport.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(%realm, error = %e, "connect failed");
                self.compare_and_set(
                    SessionState::Establishing,
                    SessionState::Disconnected,
                );
                return Err(SessionError::Transport(Box::new(e)));
            }
        };

        self.inner.pending.reopen();
        let welcome = self.arm_lifecycle();
        self.start_link(conn);

        let session_id = match self.handshake(welcome).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(%realm, error = %e, "handshake failed");
                self.inner.pending.close();
                lock(&self.inner.lifecycle).take();
                self.stop_link();
                self.compare_and_set(
                    SessionState::Establishing,
                    SessionState::Disconnected,
                );
                return Err(e);
            }
        };

        *lock(&self.inner.session_id) = Some(session_id);
        if !self.compare_and_set(
            SessionState::Establishing,
            SessionState::Established,
        ) {
            // end() ran while we were waiting for WELCOME.
            return Err(SessionError::SessionClosed);
        }
        tracing::info!(%realm, %session_id, "session established");

        for binding in self.inner.manifest.bindings() {
            if let Err(source) = self.bind(binding).await {
                let name = binding.name().to_string();
                tracing::warn!(binding = %name, error = %source, "binding failed, rolling back");
                self.abort_startup().await;
                return Err(SessionError::Registration {
                    binding: name,
                    source: Box::new(source),
                });
            }
        }

        tracing::info!(
            %session_id,
            bindings = self.inner.manifest.len(),
            "session ready"
        );
        Ok(())
    }

    async fn handshake(
        &self,
        welcome: oneshot::Receiver<Message>,
    ) -> Result<SessionId, SessionError> {
        let config = &self.inner.config;
        self.send(&Message::Hello {
            realm: config.realm.clone(),
            details: config.roles.to_details(),
        })?;

        let timeout = config.handshake_timeout;
        match tokio::time::timeout(timeout, welcome).await {
            Ok(Ok(Message::Welcome { session, .. })) => Ok(session),
            Ok(Ok(Message::Abort { reason, .. })) => {
                Err(SessionError::Handshake(format!("router aborted: {reason}")))
            }
            Ok(Ok(other)) => Err(SessionError::Handshake(format!(
                "unexpected {} during handshake",
                other.kind()
            ))),
            Ok(Err(_)) => Err(SessionError::Handshake(
                "transport closed during handshake".into(),
            )),
            Err(_) => Err(SessionError::Handshake(format!(
                "no WELCOME within {timeout:?}"
            ))),
        }
    }

    async fn bind(&self, binding: &Binding) -> Result<(), SessionError> {
        let request = self.inner.pending.allocate()?;
        let message = match binding {
            Binding::Procedure(p) => {
                let mut options = Dict::new();
                options.insert("invoke".into(), p.policy.as_str().into());
                Message::Register {
                    request,
                    options,
                    procedure: p.name.clone(),
                }
            }
            Binding::Topic(t) => Message::Subscribe {
                request,
                options: Dict::new(),
                topic: t.topic.clone(),
            },
        };
        lock(&self.inner.staged).insert(request, binding.clone());
        let reply = self
            .exchange(request, message, self.inner.config.call_timeout)
            .await;
        lock(&self.inner.staged).remove(&request);

        let reply = reply?;
        match (binding, &reply) {
            (Binding::Procedure(_), Message::Registered { .. })
            | (Binding::Topic(_), Message::Subscribed { .. }) => Ok(()),
            _ => Err(SessionError::UnexpectedMessage(reply.kind())),
        }
    }

    /// Undoes a partially registered manifest and leaves the realm.
    async fn abort_startup(&self) {
        self.release_all().await;
        if !self.compare_and_set(
            SessionState::Established,
            SessionState::Closing,
        ) {
            // Already torn down by the router or by end().
            return;
        }
        self.say_goodbye().await;
        self.teardown();
        self.compare_and_set(SessionState::Closing, SessionState::Disconnected);
    }

    /// Leaves the realm.
    ///
    /// Unregisters and unsubscribes every live binding (failures are
    /// logged), sends GOODBYE and waits for the router's GOODBYE, then
    /// closes the connection. Every outstanding request fails with
    /// `SessionClosed`.
    ///
    /// Idempotent: calling it on a `Closing` or `Closed` session does
    /// nothing. Calling it before `begin()` finished closes the session
    /// without a goodbye exchange.
    pub async fn end(&self) {
        let mut previous = None;
        self.inner.state.send_if_modified(|state| match *state {
            SessionState::Established => {
                previous = Some(*state);
                *state = SessionState::Closing;
                true
            }
            SessionState::Disconnected | SessionState::Establishing => {
                previous = Some(*state);
                *state = SessionState::Closed;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        });

        match previous {
            None => {
                tracing::debug!("end() on a closing session, ignoring");
            }
            Some(SessionState::Established) => {
                tracing::info!(session_id = ?self.session_id(), "closing session");
                self.release_all().await;
                self.say_goodbye().await;
                self.teardown();
                self.set_state(SessionState::Closed);
            }
            Some(state) => {
                tracing::info!(from = %state, "closing session before it was established");
                self.teardown();
            }
        }
    }

    /// Unregisters the procedure registered under `name`.
    ///
    /// # Errors
    /// - `NoSuchBinding` if no live registration has that name
    /// - any error from the UNREGISTER round trip; the local record is
    ///   gone either way
    pub async fn unregister(&self, name: &str) -> Result<(), SessionError> {
        self.ensure_established()?;
        if !self.registry().registrations().any(|r| r.procedure == name) {
            return Err(SessionError::NoSuchBinding(name.to_string()));
        }
        self.release(name).await
    }

    /// Unsubscribes the topic handler registered under `name`.
    ///
    /// The UNSUBSCRIBE is only sent once no other handler name shares the
    /// subscription.
    ///
    /// # Errors
    /// - `NoSuchBinding` if no live subscription has that name
    /// - any error from the UNSUBSCRIBE round trip
    pub async fn unsubscribe(&self, name: &str) -> Result<(), SessionError> {
        self.ensure_established()?;
        if !self.registry().subscriptions().any(|s| s.handler_name == name) {
            return Err(SessionError::NoSuchBinding(name.to_string()));
        }
        self.release(name).await
    }

    async fn release(&self, name: &str) -> Result<(), SessionError> {
        let removed = self.registry_mut().remove(name);
        let timeout = self.inner.config.call_timeout;
        match removed {
            Some(Removed::Registration(record)) => {
                let reply = self
                    .request(
                        |request| Message::Unregister {
                            request,
                            registration: record.registration_id,
                        },
                        timeout,
                    )
                    .await?;
                expect_kind(&reply, |m| matches!(m, Message::Unregistered { .. }))?;
                tracing::debug!(procedure = %record.procedure, "unregistered");
            }
            Some(Removed::Subscription { record, last: true }) => {
                let reply = self
                    .request(
                        |request| Message::Unsubscribe {
                            request,
                            subscription: record.subscription_id,
                        },
                        timeout,
                    )
                    .await?;
                expect_kind(&reply, |m| matches!(m, Message::Unsubscribed { .. }))?;
                tracing::debug!(handler = %record.handler_name, topic = %record.topic, "unsubscribed");
            }
            Some(Removed::Subscription { record, last: false }) => {
                tracing::debug!(handler = %record.handler_name, "subscription still shared, keeping it");
            }
            None => return Err(SessionError::NoSuchBinding(name.to_string())),
        }
        Ok(())
    }

    /// Best-effort release of every live record.
    async fn release_all(&self) {
        let names = self.registry().names();
        for name in names {
            if let Err(e) = self.release(&name).await {
                tracing::warn!(binding = %name, error = %e, "release failed");
            }
        }
    }

    async fn say_goodbye(&self) {
        let reply = self.arm_lifecycle();
        if let Err(e) = self.send(&Message::goodbye(uri::CLOSE_NORMAL)) {
            tracing::debug!(error = %e, "could not send GOODBYE");
            return;
        }
        let timeout = self.inner.config.goodbye_timeout;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(Message::Goodbye { reason, .. })) => {
                tracing::debug!(%reason, "router acknowledged GOODBYE");
            }
            Ok(Ok(other)) => {
                tracing::debug!(kind = %other.kind(), "router answered GOODBYE unexpectedly");
            }
            Ok(Err(_)) => {
                tracing::debug!("transport closed before GOODBYE reply");
            }
            Err(_) => {
                tracing::warn!(?timeout, "router did not answer GOODBYE");
            }
        }
    }

    // -- Receiver callbacks -------------------------------------------------

    /// Router-initiated GOODBYE or ABORT.
    pub(crate) fn close_by_router(&self, message: &Message) {
        match message {
            Message::Goodbye { reason, .. } => {
                tracing::info!(%reason, "router closed session");
                if let Err(e) = self.send(&Message::goodbye(uri::GOODBYE_AND_OUT)) {
                    tracing::debug!(error = %e, "could not answer GOODBYE");
                }
            }
            Message::Abort { reason, .. } => {
                tracing::warn!(%reason, "router aborted session");
            }
            _ => {}
        }
        if matches!(
            self.state(),
            SessionState::Disconnected | SessionState::Closed
        ) {
            return;
        }
        self.set_state(SessionState::Closing);
        self.teardown();
        self.set_state(SessionState::Closed);
    }

    /// The receiver loop saw the transport end.
    pub(crate) fn on_transport_closed(&self) {
        // Wakes a handshake or goodbye waiter.
        lock(&self.inner.lifecycle).take();

        match self.state() {
            SessionState::Established => {
                self.set_state(SessionState::Closing);
                self.teardown();
                self.set_state(SessionState::Closed);
            }
            SessionState::Closing => self.inner.pending.close(),
            _ => {}
        }
    }

    /// Records the binding staged under `request` once the router has
    /// acknowledged it. Anything other than the matching acknowledgement
    /// just discards the staged entry.
    pub(crate) fn commit_binding(&self, request: RequestId, reply: &Message) {
        let Some(binding) = lock(&self.inner.staged).remove(&request) else {
            return;
        };
        match (binding, reply) {
            (Binding::Procedure(p), Message::Registered { registration, .. }) => {
                tracing::debug!(procedure = %p.name, %registration, policy = %p.policy, "registered");
                self.registry_mut().add_procedure(
                    p.name,
                    p.policy,
                    *registration,
                    p.handler,
                );
            }
            (Binding::Topic(t), Message::Subscribed { subscription, .. }) => {
                tracing::debug!(handler = %t.name, topic = %t.topic, %subscription, "subscribed");
                self.registry_mut().add_topic(
                    t.name,
                    t.topic,
                    *subscription,
                    t.handler,
                );
            }
            (binding, reply) => {
                tracing::debug!(binding = %binding.name(), kind = %reply.kind(), "binding not acknowledged");
            }
        }
    }

    pub(crate) fn take_lifecycle_waiter(
        &self,
    ) -> Option<oneshot::Sender<Message>> {
        lock(&self.inner.lifecycle).take()
    }

    pub(crate) fn resolve_registration_id(
        &self,
        id: RegistrationId,
    ) -> Result<ProcedureHandler, SessionError> {
        self.registry().resolve_registration_id(id)
    }

    pub(crate) fn resolve_subscription_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Vec<TopicHandler>, SessionError> {
        self.registry().resolve_subscription_id(id)
    }

    pub(crate) fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }

    pub(crate) fn codec(&self) -> &JsonCodec {
        &self.inner.codec
    }

    // -- Outbound -----------------------------------------------------------

    /// Queues a message on the single ordered write path.
    pub(crate) fn send(&self, message: &Message) -> Result<(), SessionError> {
        let bytes = self.inner.codec.encode(message)?;
        let link = lock(&self.inner.link);
        let link = link.as_ref().ok_or(SessionError::SessionClosed)?;
        link.outbound
            .send(Outbound::Frame(bytes))
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Sends a correlated request and waits for its response.
    pub(crate) async fn request<F>(
        &self,
        build: F,
        timeout: Duration,
    ) -> Result<Message, SessionError>
    where
        F: FnOnce(RequestId) -> Message,
    {
        let id = self.inner.pending.allocate()?;
        self.exchange(id, build(id), timeout).await
    }

    /// Sends `message` under the already allocated `id` and waits for its
    /// response.
    async fn exchange(
        &self,
        id: RequestId,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, SessionError> {
        tracing::trace!(request_id = %id, kind = %message.kind(), "sending request");
        if let Err(e) = self.send(&message) {
            self.inner.pending.cancel(id);
            return Err(e);
        }
        self.inner.pending.await_response(id, timeout).await
    }

    pub(crate) fn ensure_established(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Established => Ok(()),
            SessionState::Closing | SessionState::Closed => {
                Err(SessionError::SessionClosed)
            }
            state => Err(SessionError::NotEstablished(state)),
        }
    }

    // -- Internals ----------------------------------------------------------

    fn start_link<C: Connection>(&self, conn: C) {
        let conn = Arc::new(conn);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(receiver::write_loop(conn.clone(), outbound_rx));
        tokio::spawn(receiver::run(conn, self.clone(), shutdown_rx));

        *lock(&self.inner.link) = Some(Link { outbound, shutdown });
    }

    fn stop_link(&self) {
        if let Some(link) = lock(&self.inner.link).take() {
            let _ = link.outbound.send(Outbound::Close);
            let _ = link.shutdown.send(true);
        }
    }

    /// Fails every pending request, forgets every binding and closes the
    /// connection. The caller sets the final state.
    fn teardown(&self) {
        self.inner.pending.close();
        self.registry_mut().clear();
        lock(&self.inner.staged).clear();
        lock(&self.inner.lifecycle).take();
        lock(&self.inner.session_id).take();
        self.stop_link();
    }

    fn arm_lifecycle(&self) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.inner.lifecycle) = Some(tx);
        rx
    }

    fn compare_and_set(
        &self,
        expected: SessionState,
        next: SessionState,
    ) -> bool {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == expected {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(from = %expected, to = %next, "session state changed");
        }
        changed
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "session state changed");
        }
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn expect_kind(
    reply: &Message,
    ok: impl FnOnce(&Message) -> bool,
) -> Result<(), SessionError> {
    if ok(reply) {
        Ok(())
    } else {
        Err(SessionError::UnexpectedMessage(reply.kind()))
    }
}
