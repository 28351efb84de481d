//! The session lifecycle state machine.

use std::fmt;

/// The lifecycle state of a [`Session`](crate::Session).
///
/// ```text
///                 begin()            WELCOME
///  Disconnected ──────────→ Establishing ──────→ Established
///     ↑    ↑                     │                    │
///     │    └── ABORT / timeout ──┘                    │ end(), router GOODBYE/ABORT,
///     │                                               │ transport loss, failed binding
///     │                                               ▼
///     └──────── failed binding, rolled back ───── Closing ──────→ Closed
/// ```
///
/// A failed registration during `begin()` unbinds what succeeded, says
/// GOODBYE and returns to `Disconnected`, so `begin()` may be retried.
///
/// `Closed` is terminal: construct a new session to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Establishing,
    Established,
    Closing,
    Closed,
}

impl SessionState {
    /// Calls and publishes are only accepted in this state.
    pub fn is_established(self) -> bool {
        matches!(self, Self::Established)
    }

    /// `Closing` or `Closed`: the session is on its way out and will not
    /// accept new work.
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Establishing => "establishing",
            Self::Established => "established",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
