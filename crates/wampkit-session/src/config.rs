//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wampkit_protocol::Roles;

/// The realm used when none is configured.
pub const DEFAULT_REALM: &str = "realm1";

/// Configuration for a [`Session`](crate::Session).
///
/// Every field has a sensible default, so the usual pattern is to start
/// from `SessionConfig::default()` (or [`with_realm`](Self::with_realm))
/// and override what you need. `#[serde(default)]` lets a partial JSON or
/// TOML document fill in only some fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The realm to join in HELLO.
    pub realm: String,

    /// The roles announced in HELLO.
    pub roles: Roles,

    /// How long `begin()` waits for WELCOME.
    pub handshake_timeout: Duration,

    /// Default timeout for calls, acknowledged publishes and the
    /// REGISTER/SUBSCRIBE round trips made during `begin()`.
    pub call_timeout: Duration,

    /// How long `end()` waits for the router's GOODBYE.
    pub goodbye_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            roles: Roles::default(),
            handshake_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
            goodbye_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given realm.
    pub fn with_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            ..Self::default()
        }
    }
}
