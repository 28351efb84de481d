//! WAMP client session engine for wampkit.
//!
//! This crate turns a byte-level [`Connection`](wampkit_transport::Connection)
//! into a WAMP session:
//!
//! 1. **Handshake**: HELLO/WELCOME on [`Session::begin`]
//! 2. **Registration**: every binding of a [`CapabilityManifest`] is
//!    registered or subscribed before `begin()` returns
//! 3. **Correlation**: responses are matched to their requests by id
//!    ([`PendingRequests`])
//! 4. **Dispatch**: INVOCATION and EVENT messages run their handlers on
//!    fresh tasks ([`Registry`])
//! 5. **Teardown**: [`Session::end`] unregisters, says GOODBYE and closes
//!
//! # How it fits in the stack
//!
//! ```text
//! Client facade (above)  ← owns the router URL and the manifest
//!     ↕
//! Session layer (this crate)  ← state machine, correlation, dispatch
//!     ↕
//! Protocol layer (below)  ← Message, JsonCodec
//!     ↕
//! Transport layer (below) ← WebSocket or in-memory connection
//! ```

mod binding;
mod config;
mod error;
mod pending;
mod proxy;
mod receiver;
mod registry;
mod session;
mod state;

pub use binding::{
    Binding, CapabilityManifest, Event, Invocation, ProcedureBinding,
    ProcedureHandler, TopicBinding, TopicHandler,
};
pub use config::{SessionConfig, DEFAULT_REALM};
pub use error::{HandlerError, RemoteError, SessionError};
pub use pending::PendingRequests;
pub use proxy::{CallProxy, PublishProxy};
pub use registry::{RegistrationRecord, Registry, Removed, SubscriptionRecord};
pub use session::Session;
pub use state::SessionState;
