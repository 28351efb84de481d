//! The WAMP message model.
//!
//! Every WAMP message travels as a JSON array whose first element is the
//! message code:
//!
//! ```text
//! [48, 7, {}, "com.example.add", [2, 3]]
//!  │   │  │   │                  └─ positional args (optional)
//!  │   │  │   └─ procedure URI
//!  │   │  └─ options
//!  │   └─ request id
//!  └─ CALL
//! ```
//!
//! [`Message`] is the in-memory form. [`Message::to_value`] and
//! [`Message::from_value`] convert to and from the array form; the
//! [`Codec`](crate::Codec) turns that into bytes.

use std::fmt;

use serde_json::Value;

use crate::types::{
    Dict, PublicationId, RegistrationId, RequestId, SessionId,
    SubscriptionId, MAX_ID,
};
use crate::{Payload, ProtocolError};

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The kind of a WAMP message, with its numeric wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Welcome,
    Abort,
    Goodbye,
    Error,
    Publish,
    Published,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Event,
    Call,
    Result,
    Register,
    Registered,
    Unregister,
    Unregistered,
    Invocation,
    Yield,
}

impl MessageKind {
    /// The numeric code that opens the message array.
    pub fn code(self) -> u64 {
        match self {
            Self::Hello => 1,
            Self::Welcome => 2,
            Self::Abort => 3,
            Self::Goodbye => 6,
            Self::Error => 8,
            Self::Publish => 16,
            Self::Published => 17,
            Self::Subscribe => 32,
            Self::Subscribed => 33,
            Self::Unsubscribe => 34,
            Self::Unsubscribed => 35,
            Self::Event => 36,
            Self::Call => 48,
            Self::Result => 50,
            Self::Register => 64,
            Self::Registered => 65,
            Self::Unregister => 66,
            Self::Unregistered => 67,
            Self::Invocation => 68,
            Self::Yield => 70,
        }
    }

    /// Looks up a kind by wire code.
    pub fn from_code(code: u64) -> Option<Self> {
        let kind = match code {
            1 => Self::Hello,
            2 => Self::Welcome,
            3 => Self::Abort,
            6 => Self::Goodbye,
            8 => Self::Error,
            16 => Self::Publish,
            17 => Self::Published,
            32 => Self::Subscribe,
            33 => Self::Subscribed,
            34 => Self::Unsubscribe,
            35 => Self::Unsubscribed,
            36 => Self::Event,
            48 => Self::Call,
            50 => Self::Result,
            64 => Self::Register,
            65 => Self::Registered,
            66 => Self::Unregister,
            67 => Self::Unregistered,
            68 => Self::Invocation,
            70 => Self::Yield,
            _ => return None,
        };
        Some(kind)
    }

    /// Upper-case protocol name, e.g. `"SUBSCRIBED"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Welcome => "WELCOME",
            Self::Abort => "ABORT",
            Self::Goodbye => "GOODBYE",
            Self::Error => "ERROR",
            Self::Publish => "PUBLISH",
            Self::Published => "PUBLISHED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Subscribed => "SUBSCRIBED",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Unsubscribed => "UNSUBSCRIBED",
            Self::Event => "EVENT",
            Self::Call => "CALL",
            Self::Result => "RESULT",
            Self::Register => "REGISTER",
            Self::Registered => "REGISTERED",
            Self::Unregister => "UNREGISTER",
            Self::Unregistered => "UNREGISTERED",
            Self::Invocation => "INVOCATION",
            Self::Yield => "YIELD",
        }
    }

    /// Kinds that answer an outstanding client request and are resolved
    /// through the correlation table by request id.
    pub fn is_correlated_response(self) -> bool {
        matches!(
            self,
            Self::Registered
                | Self::Unregistered
                | Self::Result
                | Self::Error
                | Self::Subscribed
                | Self::Unsubscribed
                | Self::Published
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One WAMP message.
///
/// Field names follow the WAMP basic profile. `request` is always the
/// client-chosen correlation id; `payload` holds the optional trailing
/// `args`/`kwargs`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `[HELLO, Realm|uri, Details|dict]`
    Hello { realm: String, details: Dict },
    /// `[WELCOME, Session|id, Details|dict]`
    Welcome { session: SessionId, details: Dict },
    /// `[ABORT, Details|dict, Reason|uri]`
    Abort { details: Dict, reason: String },
    /// `[GOODBYE, Details|dict, Reason|uri]`
    Goodbye { details: Dict, reason: String },
    /// `[ERROR, REQUEST.Type|int, REQUEST.Request|id, Details|dict, Error|uri, args?, kwargs?]`
    Error {
        request_type: u64,
        request: RequestId,
        details: Dict,
        error: String,
        payload: Payload,
    },
    /// `[PUBLISH, Request|id, Options|dict, Topic|uri, args?, kwargs?]`
    Publish {
        request: RequestId,
        options: Dict,
        topic: String,
        payload: Payload,
    },
    /// `[PUBLISHED, PUBLISH.Request|id, Publication|id]`
    Published {
        request: RequestId,
        publication: PublicationId,
    },
    /// `[SUBSCRIBE, Request|id, Options|dict, Topic|uri]`
    Subscribe {
        request: RequestId,
        options: Dict,
        topic: String,
    },
    /// `[SUBSCRIBED, SUBSCRIBE.Request|id, Subscription|id]`
    Subscribed {
        request: RequestId,
        subscription: SubscriptionId,
    },
    /// `[UNSUBSCRIBE, Request|id, SUBSCRIBED.Subscription|id]`
    Unsubscribe {
        request: RequestId,
        subscription: SubscriptionId,
    },
    /// `[UNSUBSCRIBED, UNSUBSCRIBE.Request|id]`
    Unsubscribed { request: RequestId },
    /// `[EVENT, SUBSCRIBED.Subscription|id, PUBLISHED.Publication|id, Details|dict, args?, kwargs?]`
    Event {
        subscription: SubscriptionId,
        publication: PublicationId,
        details: Dict,
        payload: Payload,
    },
    /// `[CALL, Request|id, Options|dict, Procedure|uri, args?, kwargs?]`
    Call {
        request: RequestId,
        options: Dict,
        procedure: String,
        payload: Payload,
    },
    /// `[RESULT, CALL.Request|id, Details|dict, args?, kwargs?]`
    Result {
        request: RequestId,
        details: Dict,
        payload: Payload,
    },
    /// `[REGISTER, Request|id, Options|dict, Procedure|uri]`
    Register {
        request: RequestId,
        options: Dict,
        procedure: String,
    },
    /// `[REGISTERED, REGISTER.Request|id, Registration|id]`
    Registered {
        request: RequestId,
        registration: RegistrationId,
    },
    /// `[UNREGISTER, Request|id, REGISTERED.Registration|id]`
    Unregister {
        request: RequestId,
        registration: RegistrationId,
    },
    /// `[UNREGISTERED, UNREGISTER.Request|id]`
    Unregistered { request: RequestId },
    /// `[INVOCATION, Request|id, REGISTERED.Registration|id, Details|dict, args?, kwargs?]`
    Invocation {
        request: RequestId,
        registration: RegistrationId,
        details: Dict,
        payload: Payload,
    },
    /// `[YIELD, INVOCATION.Request|id, Options|dict, args?, kwargs?]`
    Yield {
        request: RequestId,
        options: Dict,
        payload: Payload,
    },
}

impl Message {
    /// A GOODBYE with empty details.
    pub fn goodbye(reason: impl Into<String>) -> Self {
        Self::Goodbye {
            details: Dict::new(),
            reason: reason.into(),
        }
    }

    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello { .. } => MessageKind::Hello,
            Self::Welcome { .. } => MessageKind::Welcome,
            Self::Abort { .. } => MessageKind::Abort,
            Self::Goodbye { .. } => MessageKind::Goodbye,
            Self::Error { .. } => MessageKind::Error,
            Self::Publish { .. } => MessageKind::Publish,
            Self::Published { .. } => MessageKind::Published,
            Self::Subscribe { .. } => MessageKind::Subscribe,
            Self::Subscribed { .. } => MessageKind::Subscribed,
            Self::Unsubscribe { .. } => MessageKind::Unsubscribe,
            Self::Unsubscribed { .. } => MessageKind::Unsubscribed,
            Self::Event { .. } => MessageKind::Event,
            Self::Call { .. } => MessageKind::Call,
            Self::Result { .. } => MessageKind::Result,
            Self::Register { .. } => MessageKind::Register,
            Self::Registered { .. } => MessageKind::Registered,
            Self::Unregister { .. } => MessageKind::Unregister,
            Self::Unregistered { .. } => MessageKind::Unregistered,
            Self::Invocation { .. } => MessageKind::Invocation,
            Self::Yield { .. } => MessageKind::Yield,
        }
    }

    /// The request id this message carries, if its kind has one.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Error { request, .. }
            | Self::Publish { request, .. }
            | Self::Published { request, .. }
            | Self::Subscribe { request, .. }
            | Self::Subscribed { request, .. }
            | Self::Unsubscribe { request, .. }
            | Self::Unsubscribed { request }
            | Self::Call { request, .. }
            | Self::Result { request, .. }
            | Self::Register { request, .. }
            | Self::Registered { request, .. }
            | Self::Unregister { request, .. }
            | Self::Unregistered { request }
            | Self::Invocation { request, .. }
            | Self::Yield { request, .. } => Some(*request),
            Self::Hello { .. }
            | Self::Welcome { .. }
            | Self::Abort { .. }
            | Self::Goodbye { .. }
            | Self::Event { .. } => None,
        }
    }

    /// Converts the message to its JSON array form.
    pub fn to_value(&self) -> Value {
        let mut out = vec![Value::from(self.kind().code())];
        match self {
            Self::Hello { realm, details } => {
                out.push(Value::from(realm.as_str()));
                out.push(Value::Object(details.clone()));
            }
            Self::Welcome { session, details } => {
                out.push(Value::from(session.0));
                out.push(Value::Object(details.clone()));
            }
            Self::Abort { details, reason }
            | Self::Goodbye { details, reason } => {
                out.push(Value::Object(details.clone()));
                out.push(Value::from(reason.as_str()));
            }
            Self::Error {
                request_type,
                request,
                details,
                error,
                payload,
            } => {
                out.push(Value::from(*request_type));
                out.push(Value::from(request.0));
                out.push(Value::Object(details.clone()));
                out.push(Value::from(error.as_str()));
                push_payload(&mut out, payload);
            }
            Self::Publish {
                request,
                options,
                topic,
                payload,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(options.clone()));
                out.push(Value::from(topic.as_str()));
                push_payload(&mut out, payload);
            }
            Self::Published {
                request,
                publication,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::from(publication.0));
            }
            Self::Subscribe {
                request,
                options,
                topic,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(options.clone()));
                out.push(Value::from(topic.as_str()));
            }
            Self::Subscribed {
                request,
                subscription,
            }
            | Self::Unsubscribe {
                request,
                subscription,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::from(subscription.0));
            }
            Self::Unsubscribed { request } | Self::Unregistered { request } => {
                out.push(Value::from(request.0));
            }
            Self::Event {
                subscription,
                publication,
                details,
                payload,
            } => {
                out.push(Value::from(subscription.0));
                out.push(Value::from(publication.0));
                out.push(Value::Object(details.clone()));
                push_payload(&mut out, payload);
            }
            Self::Call {
                request,
                options,
                procedure,
                payload,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(options.clone()));
                out.push(Value::from(procedure.as_str()));
                push_payload(&mut out, payload);
            }
            Self::Result {
                request,
                details,
                payload,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(details.clone()));
                push_payload(&mut out, payload);
            }
            Self::Register {
                request,
                options,
                procedure,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(options.clone()));
                out.push(Value::from(procedure.as_str()));
            }
            Self::Registered {
                request,
                registration,
            }
            | Self::Unregister {
                request,
                registration,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::from(registration.0));
            }
            Self::Invocation {
                request,
                registration,
                details,
                payload,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::from(registration.0));
                out.push(Value::Object(details.clone()));
                push_payload(&mut out, payload);
            }
            Self::Yield {
                request,
                options,
                payload,
            } => {
                out.push(Value::from(request.0));
                out.push(Value::Object(options.clone()));
                push_payload(&mut out, payload);
            }
        }
        Value::Array(out)
    }

    /// Parses a message from its JSON array form.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if the value is not an array,
    /// the code is unknown, a required field is missing or mistyped, an id
    /// is outside `[0, 2^53)`, or there are trailing elements.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(items) = value else {
            return Err(ProtocolError::malformed("message is not an array"));
        };
        let mut items = items.into_iter();
        let code = items
            .next()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ProtocolError::malformed("missing message code"))?;
        let kind = MessageKind::from_code(code).ok_or_else(|| {
            ProtocolError::malformed(format!("unknown message code {code}"))
        })?;

        let mut f = Fields { kind, items };
        let msg = match kind {
            MessageKind::Hello => Self::Hello {
                realm: f.string("realm")?,
                details: f.dict("details")?,
            },
            MessageKind::Welcome => Self::Welcome {
                session: f.id("session")?,
                details: f.dict("details")?,
            },
            MessageKind::Abort => Self::Abort {
                details: f.dict("details")?,
                reason: f.string("reason")?,
            },
            MessageKind::Goodbye => Self::Goodbye {
                details: f.dict("details")?,
                reason: f.string("reason")?,
            },
            MessageKind::Error => Self::Error {
                request_type: f.integer("request_type")?,
                request: f.id("request")?,
                details: f.dict("details")?,
                error: f.string("error")?,
                payload: f.payload()?,
            },
            MessageKind::Publish => Self::Publish {
                request: f.id("request")?,
                options: f.dict("options")?,
                topic: f.string("topic")?,
                payload: f.payload()?,
            },
            MessageKind::Published => Self::Published {
                request: f.id("request")?,
                publication: f.id("publication")?,
            },
            MessageKind::Subscribe => Self::Subscribe {
                request: f.id("request")?,
                options: f.dict("options")?,
                topic: f.string("topic")?,
            },
            MessageKind::Subscribed => Self::Subscribed {
                request: f.id("request")?,
                subscription: f.id("subscription")?,
            },
            MessageKind::Unsubscribe => Self::Unsubscribe {
                request: f.id("request")?,
                subscription: f.id("subscription")?,
            },
            MessageKind::Unsubscribed => Self::Unsubscribed {
                request: f.id("request")?,
            },
            MessageKind::Event => Self::Event {
                subscription: f.id("subscription")?,
                publication: f.id("publication")?,
                details: f.dict("details")?,
                payload: f.payload()?,
            },
            MessageKind::Call => Self::Call {
                request: f.id("request")?,
                options: f.dict("options")?,
                procedure: f.string("procedure")?,
                payload: f.payload()?,
            },
            MessageKind::Result => Self::Result {
                request: f.id("request")?,
                details: f.dict("details")?,
                payload: f.payload()?,
            },
            MessageKind::Register => Self::Register {
                request: f.id("request")?,
                options: f.dict("options")?,
                procedure: f.string("procedure")?,
            },
            MessageKind::Registered => Self::Registered {
                request: f.id("request")?,
                registration: f.id("registration")?,
            },
            MessageKind::Unregister => Self::Unregister {
                request: f.id("request")?,
                registration: f.id("registration")?,
            },
            MessageKind::Unregistered => Self::Unregistered {
                request: f.id("request")?,
            },
            MessageKind::Invocation => Self::Invocation {
                request: f.id("request")?,
                registration: f.id("registration")?,
                details: f.dict("details")?,
                payload: f.payload()?,
            },
            MessageKind::Yield => Self::Yield {
                request: f.id("request")?,
                options: f.dict("options")?,
                payload: f.payload()?,
            },
        };
        f.finish()?;
        Ok(msg)
    }
}

/// Appends `args`/`kwargs` the way WAMP expects: omitted when both are
/// empty, `args` present (possibly `[]`) whenever `kwargs` is.
fn push_payload(out: &mut Vec<Value>, payload: &Payload) {
    if payload.is_empty() {
        return;
    }
    out.push(Value::Array(payload.args.clone()));
    if !payload.kwargs.is_empty() {
        out.push(Value::Object(payload.kwargs.clone()));
    }
}

/// Positional field reader used by [`Message::from_value`].
struct Fields {
    kind: MessageKind,
    items: std::vec::IntoIter<Value>,
}

impl Fields {
    fn next(&mut self, name: &str) -> Result<Value, ProtocolError> {
        self.items.next().ok_or_else(|| {
            ProtocolError::malformed(format!("{}: missing {name}", self.kind))
        })
    }

    fn mistyped(&self, name: &str, expected: &str) -> ProtocolError {
        ProtocolError::malformed(format!(
            "{}: {name} must be {expected}",
            self.kind
        ))
    }

    fn integer(&mut self, name: &str) -> Result<u64, ProtocolError> {
        self.next(name)?
            .as_u64()
            .ok_or_else(|| self.mistyped(name, "a non-negative integer"))
    }

    fn id<T: From<u64>>(&mut self, name: &str) -> Result<T, ProtocolError> {
        let raw = self.integer(name)?;
        if raw >= MAX_ID {
            return Err(self.mistyped(name, "below 2^53"));
        }
        Ok(T::from(raw))
    }

    fn string(&mut self, name: &str) -> Result<String, ProtocolError> {
        match self.next(name)? {
            Value::String(s) => Ok(s),
            _ => Err(self.mistyped(name, "a string")),
        }
    }

    fn dict(&mut self, name: &str) -> Result<Dict, ProtocolError> {
        match self.next(name)? {
            Value::Object(d) => Ok(d),
            _ => Err(self.mistyped(name, "a dict")),
        }
    }

    fn payload(&mut self) -> Result<Payload, ProtocolError> {
        let mut payload = Payload::default();
        match self.items.next() {
            None => return Ok(payload),
            Some(Value::Array(args)) => payload.args = args,
            Some(_) => return Err(self.mistyped("args", "a list")),
        }
        match self.items.next() {
            None => {}
            Some(Value::Object(kwargs)) => payload.kwargs = kwargs,
            Some(_) => return Err(self.mistyped("kwargs", "a dict")),
        }
        Ok(payload)
    }

    fn finish(mut self) -> Result<(), ProtocolError> {
        match self.items.next() {
            None => Ok(()),
            Some(_) => Err(ProtocolError::malformed(format!(
                "{}: unexpected trailing elements",
                self.kind
            ))),
        }
    }
}
