//! # wampkit
//!
//! A WAMP client for Rust: remote procedure calls and publish/subscribe
//! against a WAMP router, over WebSocket.
//!
//! An application declares the procedures it offers and the topics it
//! listens to up front, then starts a [`Client`]. The session registers
//! everything, dispatches incoming invocations and events on their own
//! tasks, and matches every reply to the request that caused it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wampkit::prelude::*;
//!
//! # async fn run() -> Result<(), WampError> {
//! let client = Client::builder()
//!     .topic("on_news", "com.example.news", |event| async move {
//!         println!("news: {:?}", event.payload.args);
//!     })
//!     .build();
//!
//! client.start().await?;
//! client.publish("com.example.news").arg("hello").send().await?;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod meta;

pub use client::{
    service_manifest, Client, ClientBuilder, DEFAULT_ROUTER_URL,
    GET_META_PROCEDURE,
};
pub use error::WampError;

pub use wampkit_protocol as protocol;
pub use wampkit_session as session;
pub use wampkit_transport as transport;

/// Common imports for applications.
pub mod prelude {
    pub use crate::meta::{BindingInfo, Listing, MatchListing};
    pub use crate::{service_manifest, Client, ClientBuilder, WampError};
    pub use wampkit_protocol::{
        InvocationPolicy, Payload, PublicationId, RegistrationId, SessionId,
        SubscriptionId,
    };
    pub use wampkit_session::{
        CapabilityManifest, Event, HandlerError, Invocation, Session,
        SessionConfig, SessionError, SessionState,
    };
}
