//! Value types shared by every WAMP message.
//!
//! Identifiers are newtype wrappers so a `RegistrationId` can never be
//! passed where a `SubscriptionId` is expected, even though both are
//! integers on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A WAMP dictionary (`options`, `details`, `kwargs`).
pub type Dict = serde_json::Map<String, Value>;

/// A WAMP positional argument list.
pub type List = Vec<Value>;

/// Exclusive upper bound for every WAMP id: ids live in `[0, 2^53)` so they
/// survive a round trip through an IEEE-754 double.
pub const MAX_ID: u64 = 1 << 53;

macro_rules! wamp_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns `true` if the id is inside `[0, 2^53)`.
            pub fn is_valid(self) -> bool {
                self.0 < MAX_ID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

wamp_id!(
    /// Correlates a request with its response. Chosen by the client,
    /// unique among the client's outstanding requests.
    RequestId
);
wamp_id!(
    /// Assigned by the router in WELCOME.
    SessionId
);
wamp_id!(
    /// Assigned by the router in REGISTERED; referenced by INVOCATION.
    RegistrationId
);
wamp_id!(
    /// Assigned by the router in SUBSCRIBED; referenced by EVENT.
    SubscriptionId
);
wamp_id!(
    /// Assigned by the router to a publication.
    PublicationId
);

// ---------------------------------------------------------------------------
// InvocationPolicy
// ---------------------------------------------------------------------------

/// How the router chooses among several registrants of one procedure.
///
/// Sent as `options.invoke` on REGISTER. The client keeps no further
/// state for it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InvocationPolicy {
    /// Only one registrant is allowed.
    #[default]
    Single,
    /// Invocations rotate across all registrants.
    RoundRobin,
}

impl InvocationPolicy {
    /// The wire name of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::RoundRobin => "roundrobin",
        }
    }
}

impl fmt::Display for InvocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The client roles announced in HELLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roles {
    pub caller: bool,
    pub callee: bool,
    pub publisher: bool,
    pub subscriber: bool,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            caller: true,
            callee: true,
            publisher: true,
            subscriber: true,
        }
    }
}

impl Roles {
    /// Builds the `details` dictionary of a HELLO message:
    /// `{"roles": {"caller": {}, "callee": {"features": {...}}, ...}}`.
    pub fn to_details(&self) -> Dict {
        let mut roles = Dict::new();
        if self.caller {
            roles.insert("caller".into(), Value::Object(Dict::new()));
        }
        if self.callee {
            let mut features = Dict::new();
            features.insert("shared_registration".into(), Value::Bool(true));
            let mut callee = Dict::new();
            callee.insert("features".into(), Value::Object(features));
            roles.insert("callee".into(), Value::Object(callee));
        }
        if self.publisher {
            roles.insert("publisher".into(), Value::Object(Dict::new()));
        }
        if self.subscriber {
            roles.insert("subscriber".into(), Value::Object(Dict::new()));
        }

        let mut details = Dict::new();
        details.insert("roles".into(), Value::Object(roles));
        details
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Application data carried by CALL, RESULT, PUBLISH, EVENT and friends.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    /// Positional arguments.
    pub args: List,
    /// Keyword arguments.
    pub kwargs: Dict,
}

impl Payload {
    /// Creates a payload from positional arguments only.
    pub fn from_args(args: List) -> Self {
        Self {
            args,
            kwargs: Dict::new(),
        }
    }

    /// Returns `true` if there are neither positional nor keyword arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Collapses the payload into one value, the way a single-result RPC
    /// is usually consumed:
    ///
    /// - nothing → `null`
    /// - exactly one positional argument and no kwargs → that argument
    /// - only positional arguments → an array
    /// - only kwargs → an object
    /// - both → `{"args": [...], "kwargs": {...}}`
    pub fn into_value(self) -> Value {
        match (self.args.len(), self.kwargs.is_empty()) {
            (0, true) => Value::Null,
            (1, true) => self.args.into_iter().next().unwrap_or(Value::Null),
            (_, true) => Value::Array(self.args),
            (0, false) => Value::Object(self.kwargs),
            (_, false) => {
                let mut both = Dict::new();
                both.insert("args".into(), Value::Array(self.args));
                both.insert("kwargs".into(), Value::Object(self.kwargs));
                Value::Object(both)
            }
        }
    }
}
