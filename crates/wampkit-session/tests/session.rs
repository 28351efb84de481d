use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wampkit_protocol::{
    Codec, Dict, InvocationPolicy, JsonCodec, Message, Payload, PublicationId,
    RegistrationId, RequestId, SessionId, SubscriptionId,
};
use wampkit_session::{
    CapabilityManifest, HandlerError, Session, SessionConfig, SessionError,
    SessionState,
};
use wampkit_transport::{memory, Connection, MemoryConnection, MemoryTransport};

// ---------------------------------------------------------------------------
// Scripted router
// ---------------------------------------------------------------------------

/// The router end of an in-memory connection, driven step by step by the
/// test.
struct Router {
    conn: MemoryConnection,
}

impl Router {
    async fn recv(&self) -> Message {
        let bytes = tokio::time::timeout(Duration::from_secs(2), self.conn.recv())
            .await
            .expect("router timed out waiting for the client")
            .unwrap()
            .expect("client hung up");
        JsonCodec.decode(&bytes).unwrap()
    }

    async fn send(&self, message: Message) {
        self.conn
            .send(&JsonCodec.encode(&message).unwrap())
            .await
            .unwrap();
    }

    async fn send_raw(&self, bytes: &[u8]) {
        self.conn.send(bytes).await.unwrap();
    }

    async fn welcome(&self, session: u64) {
        let hello = self.recv().await;
        assert!(matches!(hello, Message::Hello { .. }), "got {hello:?}");
        self.send(Message::Welcome {
            session: SessionId(session),
            details: Dict::new(),
        })
        .await;
    }

    /// Answers the next REGISTER with REGISTERED carrying `id`.
    async fn registered(&self, id: u64) -> String {
        match self.recv().await {
            Message::Register {
                request, procedure, ..
            } => {
                self.send(Message::Registered {
                    request,
                    registration: RegistrationId(id),
                })
                .await;
                procedure
            }
            other => panic!("expected REGISTER, got {other:?}"),
        }
    }

    /// Answers the next SUBSCRIBE with SUBSCRIBED carrying `id`.
    async fn subscribed(&self, id: u64) -> String {
        match self.recv().await {
            Message::Subscribe { request, topic, .. } => {
                self.send(Message::Subscribed {
                    request,
                    subscription: SubscriptionId(id),
                })
                .await;
                topic
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        }
    }
}

fn setup(
    config: SessionConfig,
    manifest: CapabilityManifest,
) -> (Session, MemoryTransport, Router) {
    let (client, router) = memory::pair();
    (
        Session::new(config, manifest),
        MemoryTransport::new(client),
        Router { conn: router },
    )
}

fn spawn_begin(
    session: &Session,
    transport: MemoryTransport,
) -> tokio::task::JoinHandle<Result<(), SessionError>> {
    let session = session.clone();
    tokio::spawn(async move { session.begin(transport).await })
}

fn add_manifest() -> CapabilityManifest {
    CapabilityManifest::new().procedure(
        "add",
        InvocationPolicy::Single,
        |inv| async move {
            let a: i64 = inv.arg(0)?;
            let b: i64 = inv.arg(1)?;
            Ok(Payload::from_args(vec![json!(a + b)]))
        },
    )
}

/// Establishes a session with `add` registered as registration 7.
async fn established_with_add() -> (Session, Router) {
    let (session, transport, router) =
        setup(SessionConfig::default(), add_manifest());
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;
    router.registered(7).await;
    begin.await.unwrap().unwrap();
    (session, router)
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handshake_establishes_session() {
    let (session, transport, router) =
        setup(SessionConfig::with_realm("test"), CapabilityManifest::new());
    let begin = spawn_begin(&session, transport);

    match router.recv().await {
        Message::Hello { realm, details } => {
            assert_eq!(realm, "test");
            assert!(details["roles"]["callee"]["features"]["shared_registration"]
                .as_bool()
                .unwrap());
        }
        other => panic!("expected HELLO, got {other:?}"),
    }
    router
        .send(Message::Welcome {
            session: SessionId(42),
            details: Dict::new(),
        })
        .await;

    begin.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Established);
    assert_eq!(session.session_id(), Some(SessionId(42)));
}

#[tokio::test]
async fn test_abort_fails_handshake_and_stays_disconnected() {
    let (session, transport, router) =
        setup(SessionConfig::default(), CapabilityManifest::new());
    let begin = spawn_begin(&session, transport);

    let _hello = router.recv().await;
    router
        .send(Message::Abort {
            details: Dict::new(),
            reason: "wamp.error.no_such_realm".into(),
        })
        .await;

    let err = begin.await.unwrap().unwrap_err();
    match err {
        SessionError::Handshake(reason) => {
            assert!(reason.contains("wamp.error.no_such_realm"))
        }
        other => panic!("expected handshake error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let mut config = SessionConfig::default();
    config.handshake_timeout = Duration::from_secs(1);
    let (session, transport, _router) =
        setup(config, CapabilityManifest::new());

    let err = session.begin(transport).await.unwrap_err();
    assert!(matches!(err, SessionError::Handshake(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_begin_twice_is_rejected() {
    let (session, _router) = established_with_add().await;
    let (other_client, _other_router) = memory::pair();

    let err = session
        .begin(MemoryTransport::new(other_client))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::AlreadyStarted(SessionState::Established)
    ));
}

#[tokio::test]
async fn test_duplicate_binding_names_rejected_before_connecting() {
    let manifest = CapabilityManifest::new()
        .topic("dup", "a", |_| async {})
        .topic("dup", "b", |_| async {});
    let (session, transport, _router) =
        setup(SessionConfig::default(), manifest);

    let err = session.begin(transport).await.unwrap_err();
    assert!(matches!(err, SessionError::DuplicateBinding(name) if name == "dup"));
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_manifest_registration_populates_maps() {
    let manifest = CapabilityManifest::new()
        .procedure("com.example.add", InvocationPolicy::Single, |_| async {
            Ok(Payload::default())
        })
        .procedure("com.example.meta", InvocationPolicy::RoundRobin, |_| async {
            Ok(Payload::default())
        })
        .topic("on_news", "com.example.news", |_| async {});
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);

    router.welcome(1).await;
    assert_eq!(router.registered(100).await, "com.example.add");
    match router.recv().await {
        Message::Register {
            request,
            options,
            procedure,
        } => {
            assert_eq!(procedure, "com.example.meta");
            assert_eq!(options["invoke"], "roundrobin");
            router
                .send(Message::Registered {
                    request,
                    registration: RegistrationId(101),
                })
                .await;
        }
        other => panic!("expected REGISTER, got {other:?}"),
    }
    assert_eq!(router.subscribed(200).await, "com.example.news");
    begin.await.unwrap().unwrap();

    let registrations = session.registration_map();
    assert_eq!(registrations.len(), 2);
    assert_eq!(registrations["com.example.add"], RegistrationId(100));
    assert_eq!(registrations["com.example.meta"], RegistrationId(101));

    let subscriptions = session.subscription_map();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(
        subscriptions["on_news"],
        (SubscriptionId(200), "com.example.news".to_string())
    );
}

#[tokio::test]
async fn test_failed_register_rolls_back() {
    let manifest = CapabilityManifest::new()
        .procedure("first", InvocationPolicy::Single, |_| async {
            Ok(Payload::default())
        })
        .procedure("second", InvocationPolicy::Single, |_| async {
            Ok(Payload::default())
        });
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);

    router.welcome(1).await;
    router.registered(7).await;
    match router.recv().await {
        Message::Register { request, .. } => {
            router
                .send(Message::Error {
                    request_type: 64,
                    request,
                    details: Dict::new(),
                    error: "wamp.error.procedure_already_exists".into(),
                    payload: Payload::default(),
                })
                .await;
        }
        other => panic!("expected REGISTER, got {other:?}"),
    }

    // Rollback of the first registration, then goodbye.
    match router.recv().await {
        Message::Unregister {
            request,
            registration,
        } => {
            assert_eq!(registration, RegistrationId(7));
            router.send(Message::Unregistered { request }).await;
        }
        other => panic!("expected UNREGISTER, got {other:?}"),
    }
    assert!(matches!(router.recv().await, Message::Goodbye { .. }));
    router.send(Message::goodbye("wamp.close.goodbye_and_out")).await;

    let err = begin.await.unwrap().unwrap_err();
    match err {
        SessionError::Registration { binding, source } => {
            assert_eq!(binding, "second");
            assert!(matches!(*source, SessionError::Remote(ref r)
                if r.error == "wamp.error.procedure_already_exists"));
        }
        other => panic!("expected registration error, got {other:?}"),
    }
    assert!(session.registration_map().is_empty());
    assert_eq!(session.state(), SessionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_call_add_returns_sum() {
    let (session, router) = established_with_add().await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("add").arg(2).arg(3).send_value().await })
    };

    match router.recv().await {
        Message::Call {
            request,
            procedure,
            payload,
            ..
        } => {
            assert_eq!(procedure, "add");
            assert_eq!(payload.args, vec![json!(2), json!(3)]);
            router
                .send(Message::Result {
                    request,
                    details: Dict::new(),
                    payload: Payload::from_args(vec![json!(5)]),
                })
                .await;
        }
        other => panic!("expected CALL, got {other:?}"),
    }

    assert_eq!(call.await.unwrap().unwrap(), json!(5));
}

#[tokio::test]
async fn test_concurrent_calls_resolve_to_their_own_results() {
    let (session, router) = established_with_add().await;

    let mut calls = Vec::new();
    for n in 0..3 {
        let session = session.clone();
        calls.push(tokio::spawn(async move {
            session.call("echo").arg(n).send().await
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..3 {
        match router.recv().await {
            Message::Call {
                request, payload, ..
            } => requests.push((request, payload)),
            other => panic!("expected CALL, got {other:?}"),
        }
    }
    // Answer in reverse order.
    for (request, payload) in requests.into_iter().rev() {
        router
            .send(Message::Result {
                request,
                details: Dict::new(),
                payload,
            })
            .await;
    }

    for (n, call) in calls.into_iter().enumerate() {
        let result = call.await.unwrap().unwrap();
        assert_eq!(result.into_value(), json!(n));
    }
}

#[tokio::test]
async fn test_call_error_surfaces_remote_error() {
    let (session, router) = established_with_add().await;
    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("missing").send().await })
    };

    let Message::Call { request, .. } = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Error {
            request_type: 48,
            request,
            details: Dict::new(),
            error: "wamp.error.no_such_procedure".into(),
            payload: Payload::default(),
        })
        .await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Remote(ref r)
        if r.error == "wamp.error.no_such_procedure"));
    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_call_timeout_leaves_session_established() {
    let (session, router) = established_with_add().await;

    let err = session
        .call("slow")
        .timeout(Duration::from_millis(50))
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout { .. }));
    assert_eq!(session.state(), SessionState::Established);

    // The late result is dropped without disturbing the session.
    let Message::Call { request, .. } = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Result {
            request,
            details: Dict::new(),
            payload: Payload::default(),
        })
        .await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("add").arg(1).arg(1).send().await })
    };
    let Message::Call { request, .. } = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Result {
            request,
            details: Dict::new(),
            payload: Payload::from_args(vec![json!(2)]),
        })
        .await;
    assert_eq!(call.await.unwrap().unwrap().into_value(), json!(2));
}

#[tokio::test]
async fn test_call_before_begin_is_not_established() {
    let session = Session::new(SessionConfig::default(), CapabilityManifest::new());
    let err = session.call("add").send().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotEstablished(SessionState::Disconnected)
    ));
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_publish_without_acknowledge_returns_immediately() {
    let (session, router) = established_with_add().await;

    let publication = session
        .publish("com.example.news")
        .arg("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(publication, None);

    match router.recv().await {
        Message::Publish {
            topic,
            options,
            payload,
            ..
        } => {
            assert_eq!(topic, "com.example.news");
            assert!(options.get("acknowledge").is_none());
            assert_eq!(payload.args, vec![json!("hello")]);
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }
}

#[tokio::test]
async fn test_publish_with_acknowledge_waits_for_published() {
    let (session, router) = established_with_add().await;
    let publish = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .publish("com.example.news")
                .kwarg("n", 1)
                .acknowledge(true)
                .send()
                .await
        })
    };

    match router.recv().await {
        Message::Publish {
            request, options, ..
        } => {
            assert_eq!(options["acknowledge"], true);
            router
                .send(Message::Published {
                    request,
                    publication: PublicationId(9),
                })
                .await;
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }

    assert_eq!(publish.await.unwrap().unwrap(), Some(PublicationId(9)));
}

// ---------------------------------------------------------------------------
// Inbound dispatch
// ---------------------------------------------------------------------------

fn invocation(request: u64, registration: u64, args: Vec<serde_json::Value>) -> Message {
    Message::Invocation {
        request: RequestId(request),
        registration: RegistrationId(registration),
        details: Dict::new(),
        payload: Payload::from_args(args),
    }
}

#[tokio::test]
async fn test_unknown_invocation_dropped_and_known_dispatched() {
    let (_session, router) = established_with_add().await;

    router.send(invocation(1, 999, vec![json!(1)])).await;
    router.send(invocation(2, 7, vec![json!(2), json!(3)])).await;

    match router.recv().await {
        Message::Yield {
            request, payload, ..
        } => {
            assert_eq!(request, RequestId(2));
            assert_eq!(payload.args, vec![json!(5)]);
        }
        other => panic!("expected YIELD, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_error_becomes_error_message() {
    let (_session, router) = established_with_add().await;

    router.send(invocation(3, 7, vec![json!("two")])).await;

    match router.recv().await {
        Message::Error {
            request_type,
            request,
            error,
            ..
        } => {
            assert_eq!(request_type, 68);
            assert_eq!(request, RequestId(3));
            assert_eq!(error, "wamp.error.invalid_argument");
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
}

#[tokio::test]
async fn test_panicking_handler_reports_runtime_error() {
    let manifest = CapabilityManifest::new().procedure(
        "boom",
        InvocationPolicy::Single,
        |inv| async move {
            if inv.payload.is_empty() {
                panic!("handler blew up");
            }
            Ok(Payload::default())
        },
    );
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;
    router.registered(5).await;
    begin.await.unwrap().unwrap();

    router.send(invocation(1, 5, vec![])).await;
    match router.recv().await {
        Message::Error { error, .. } => {
            assert_eq!(error, "wamp.error.runtime_error")
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn test_handler_can_call_through_its_own_session() {
    let manifest = CapabilityManifest::new().procedure(
        "outer",
        InvocationPolicy::Single,
        |inv| async move {
            let inner = inv.session.call("inner").send().await?;
            Ok(Payload::from_args(vec![json!({ "inner": inner.into_value() })]))
        },
    );
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;
    router.registered(11).await;
    begin.await.unwrap().unwrap();

    router.send(invocation(50, 11, vec![])).await;

    let Message::Call {
        request, procedure, ..
    } = router.recv().await
    else {
        panic!("expected nested CALL");
    };
    assert_eq!(procedure, "inner");
    router
        .send(Message::Result {
            request,
            details: Dict::new(),
            payload: Payload::from_args(vec![json!("ok")]),
        })
        .await;

    match router.recv().await {
        Message::Yield {
            request, payload, ..
        } => {
            assert_eq!(request, RequestId(50));
            assert_eq!(payload.args, vec![json!({ "inner": "ok" })]);
        }
        other => panic!("expected YIELD, got {other:?}"),
    }
}

#[tokio::test]
async fn test_event_delivered_to_topic_handler() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let manifest = CapabilityManifest::new().topic(
        "on_news",
        "com.example.news",
        move |event| {
            let events_tx = events_tx.clone();
            async move {
                let _ = events_tx.send(event.payload.args);
            }
        },
    );
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;
    router.subscribed(200).await;
    begin.await.unwrap().unwrap();

    // Unknown subscription first; it must not stop the loop.
    for subscription in [201, 200] {
        router
            .send(Message::Event {
                subscription: SubscriptionId(subscription),
                publication: PublicationId(1),
                details: Dict::new(),
                payload: Payload::from_args(vec![json!(subscription)]),
            })
            .await;
    }

    let args = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(args, vec![json!(200)]);
}

// The router may route a call or an event to a fresh binding in the same
// burst as its acknowledgement.

/// Answers the REGISTER with REGISTERED(`registration`) and sends an
/// `add(2, 3)` INVOCATION right behind it, then expects the YIELD.
async fn register_then_invoke(router: &Router, registration: u64, request: u64) {
    let Message::Register { request: reg, .. } = router.recv().await else {
        panic!("expected REGISTER");
    };
    router
        .send(Message::Registered {
            request: reg,
            registration: RegistrationId(registration),
        })
        .await;
    router
        .send(invocation(request, registration, vec![json!(2), json!(3)]))
        .await;

    match router.recv().await {
        Message::Yield {
            request: answered,
            payload,
            ..
        } => {
            assert_eq!(answered, RequestId(request));
            assert_eq!(payload.args, vec![json!(5)]);
        }
        other => panic!("expected YIELD, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invocation_right_behind_registered_is_dispatched() {
    let (session, transport, router) =
        setup(SessionConfig::default(), add_manifest());
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;

    register_then_invoke(&router, 7, 500).await;

    begin.await.unwrap().unwrap();
    assert_eq!(
        session.registration_map().get("add"),
        Some(&RegistrationId(7))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invocation_right_behind_registered_on_multi_thread_runtime() {
    for round in 0..50 {
        let (session, transport, router) =
            setup(SessionConfig::default(), add_manifest());
        let begin = spawn_begin(&session, transport);
        router.welcome(1).await;

        register_then_invoke(&router, 7, 1000 + round).await;

        begin.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_event_right_behind_subscribed_is_delivered() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let manifest = CapabilityManifest::new().topic(
        "on_news",
        "com.example.news",
        move |event| {
            let events_tx = events_tx.clone();
            async move {
                let _ = events_tx.send(event.payload.args);
            }
        },
    );
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;

    let Message::Subscribe { request, .. } = router.recv().await else {
        panic!("expected SUBSCRIBE");
    };
    router
        .send(Message::Subscribed {
            request,
            subscription: SubscriptionId(200),
        })
        .await;
    router
        .send(Message::Event {
            subscription: SubscriptionId(200),
            publication: PublicationId(9),
            details: Dict::new(),
            payload: Payload::from_args(vec![json!("first")]),
        })
        .await;

    let args = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
        .await
        .expect("event should reach the handler")
        .unwrap();
    assert_eq!(args, vec![json!("first")]);
    begin.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let (session, router) = established_with_add().await;

    router.send_raw(b"this is not json").await;
    router.send_raw(b"[999, 1]").await;
    router.send_raw(b"[50, \"not an id\", {}]").await;

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("add").arg(2).arg(2).send().await })
    };
    let Message::Call { request, .. } = router.recv().await else {
        panic!("expected CALL");
    };
    router
        .send(Message::Result {
            request,
            details: Dict::new(),
            payload: Payload::from_args(vec![json!(4)]),
        })
        .await;

    assert_eq!(call.await.unwrap().unwrap().into_value(), json!(4));
    assert_eq!(session.state(), SessionState::Established);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_unsubscribes_then_says_goodbye() {
    let manifest = CapabilityManifest::new().topic(
        "on_news",
        "com.example.news",
        |_| async {},
    );
    let (session, transport, router) =
        setup(SessionConfig::default(), manifest);
    let begin = spawn_begin(&session, transport);
    router.welcome(1).await;
    router.subscribed(200).await;
    begin.await.unwrap().unwrap();

    let end = {
        let session = session.clone();
        tokio::spawn(async move { session.end().await })
    };

    match router.recv().await {
        Message::Unsubscribe {
            request,
            subscription,
        } => {
            assert_eq!(subscription, SubscriptionId(200));
            router.send(Message::Unsubscribed { request }).await;
        }
        other => panic!("expected UNSUBSCRIBE, got {other:?}"),
    }
    match router.recv().await {
        Message::Goodbye { reason, .. } => {
            assert_eq!(reason, "wamp.close.normal");
            router.send(Message::goodbye("wamp.close.goodbye_and_out")).await;
        }
        other => panic!("expected GOODBYE, got {other:?}"),
    }

    end.await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.subscription_map().is_empty());

    let err = session.call("add").send().await.unwrap_err();
    assert!(matches!(err, SessionError::SessionClosed));

    // Second end() is a no-op.
    session.end().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_router_goodbye_fails_pending_calls() {
    let (session, router) = established_with_add().await;
    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("slow").send().await })
    };
    let _call = router.recv().await;

    router
        .send(Message::goodbye("wamp.close.system_shutdown"))
        .await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::SessionClosed));

    match router.recv().await {
        Message::Goodbye { reason, .. } => {
            assert_eq!(reason, "wamp.close.goodbye_and_out")
        }
        other => panic!("expected GOODBYE reply, got {other:?}"),
    }
    session
        .watch_state()
        .wait_for(|state| *state == SessionState::Closed)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_transport_loss_closes_session() {
    let (session, router) = established_with_add().await;
    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.call("slow").send().await })
    };
    let _call = router.recv().await;

    router.conn.close().await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::SessionClosed));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_explicit_unregister() {
    let (session, router) = established_with_add().await;
    let unregister = {
        let session = session.clone();
        tokio::spawn(async move { session.unregister("add").await })
    };

    match router.recv().await {
        Message::Unregister {
            request,
            registration,
        } => {
            assert_eq!(registration, RegistrationId(7));
            router.send(Message::Unregistered { request }).await;
        }
        other => panic!("expected UNREGISTER, got {other:?}"),
    }
    unregister.await.unwrap().unwrap();
    assert!(session.registration_map().is_empty());

    let err = session.unregister("add").await.unwrap_err();
    assert!(matches!(err, SessionError::NoSuchBinding(name) if name == "add"));
}

#[test]
fn test_handler_error_helpers() {
    let err = HandlerError::with_message("app.error.denied", "nope");
    assert_eq!(err.error, "app.error.denied");
    assert_eq!(err.payload.args, vec![json!("nope")]);
}
